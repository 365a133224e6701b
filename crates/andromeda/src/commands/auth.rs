//! Session command handlers: login, register, logout, whoami.

use dialoguer::Input;
use secrecy::SecretString;

use andromeda_core::{Credentials, RegisterRequest, User};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::{prompt_err, require_login};

// ── Prompts ─────────────────────────────────────────────────────────

fn prompt_text(prompt: &str) -> Result<String, CliError> {
    Input::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(prompt_err)
}

fn prompt_new_password() -> Result<SecretString, CliError> {
    let password = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    let confirm = rpassword::prompt_password("Confirm password: ").map_err(prompt_err)?;

    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    if password != confirm {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "passwords do not match".into(),
        });
    }
    Ok(SecretString::from(password))
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn login(ctx: &Context, args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let username = match args
        .username
        .or_else(|| andromeda_config::resolve_username(&ctx.profile))
    {
        Some(username) => username,
        None => prompt_text("Username")?,
    };
    if username.is_empty() {
        return Err(CliError::NoCredentials {
            profile: ctx.profile_name.clone(),
        });
    }

    let password = match andromeda_config::resolve_password(&ctx.profile, &ctx.profile_name) {
        Some(password) => password,
        None => SecretString::from(rpassword::prompt_password("Password: ").map_err(prompt_err)?),
    };

    let session = ctx
        .client
        .session()
        .login(&Credentials::new(username.clone(), password))
        .await?;

    if !global.quiet {
        let name = session.user.as_ref().map_or(username, |u| u.username.clone());
        eprintln!("✓ Logged in as {name} (profile '{}')", ctx.profile_name);
    }
    Ok(())
}

pub async fn register(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let request = RegisterRequest {
        username: prompt_text("Username")?,
        email: prompt_text("Email")?,
        first_name: prompt_text("First name")?,
        last_name: prompt_text("Last name")?,
        password: prompt_new_password()?,
    };

    let session = ctx.client.session().register(&request).await?;

    if !global.quiet {
        let name = session
            .user
            .as_ref()
            .map_or(request.username.as_str(), |u| u.username.as_str());
        eprintln!("✓ Account created, logged in as {name}");
    }
    Ok(())
}

pub async fn logout(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let was_authenticated = ctx.client.session().is_authenticated();

    // Let the refresh-token blacklist finish before the process exits
    if let Some(blacklist) = ctx.client.logout() {
        let _ = blacklist.await;
    }

    if !global.quiet {
        if was_authenticated {
            eprintln!("✓ Logged out of profile '{}'", ctx.profile_name);
        } else {
            eprintln!("Not logged in");
        }
    }
    Ok(())
}

pub async fn whoami(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    require_login(ctx)?;
    let user = ctx.client.current_user().await?;

    let out = output::render_single(&global.output, &user, user_detail, |u| u.username.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Detail view ─────────────────────────────────────────────────────

fn display_name(user: &User) -> String {
    if !user.full_name.is_empty() {
        return user.full_name.clone();
    }
    format!("{} {}", user.first_name, user.last_name)
        .trim()
        .to_owned()
}

fn user_detail(user: &User) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("ID", user.id.to_string()),
        ("Username", user.username.clone()),
        ("Name", display_name(user)),
        ("Email", user.email.clone()),
    ];
    if !user.bio.is_empty() {
        fields.push(("Bio", user.bio.clone()));
    }
    fields.extend([
        ("Verified", if user.is_verified { "yes" } else { "no" }.to_owned()),
        ("Followers", user.followers_count.to_string()),
        ("Following", user.following_count.to_string()),
        ("Friends", user.friends_count.to_string()),
        ("Posts", user.posts_count.to_string()),
    ]);
    if let Some(created_at) = user.created_at {
        fields.push(("Joined", created_at.format("%Y-%m-%d").to_string()));
    }
    fields
}
