//! Notification command handlers.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use andromeda_core::{ChannelState, Notification};

use crate::cli::{GlobalOpts, NotificationsArgs, NotificationsCommand};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::require_login;

#[derive(Serialize)]
struct UnreadSummary {
    unread_count: u64,
}

pub async fn handle(
    ctx: &Context,
    args: NotificationsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    require_login(ctx)?;

    match args.command {
        NotificationsCommand::Unread => {
            let unread_count = ctx.client.sync_unread_count().await?;
            let out = output::render_single(
                &global.output,
                &UnreadSummary { unread_count },
                |s| vec![("Unread", s.unread_count.to_string())],
                |s| s.unread_count.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        NotificationsCommand::ReadAll => {
            ctx.client.mark_all_notifications_read().await?;
            if !global.quiet {
                eprintln!("✓ All notifications marked read");
            }
            Ok(())
        }

        NotificationsCommand::Watch => watch(ctx, global).await,
    }
}

// ── Watch ───────────────────────────────────────────────────────────

async fn watch(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let client = &ctx.client;
    let realtime = client.realtime();
    let color = output::should_color(&global.color);

    // Subscribe before connecting so nothing is missed
    let mut notifications = realtime.notifications();
    let mut unread = realtime.subscribe_unread();
    let mut state = realtime.watch_notification_state();
    let mut session = client.session().observe_session();

    client.start().await;
    if !global.quiet {
        eprintln!(
            "Watching notifications for profile '{}' ({} unread). Ctrl-C to stop.",
            ctx.profile_name,
            realtime.unread_count()
        );
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;

            _ = &mut ctrl_c => break,

            Ok(()) = session.changed() => {
                if session.borrow_and_update().is_none() {
                    return Err(CliError::LoginRequired);
                }
            }

            Some(notification) = notifications.recv() => {
                let line = output::render_event(&global.output, notification.as_ref(), |n| {
                    format!(
                        "{} {}",
                        output::muted(&chrono::Local::now().format("%H:%M:%S").to_string(), color),
                        describe(n, color)
                    )
                })?;
                output::print_output(&line, global.quiet);
            }

            Ok(()) = unread.changed() => {
                let count = *unread.borrow_and_update();
                if !global.quiet {
                    eprintln!("{count} unread");
                }
            }

            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                info!(state = %current, "notifications channel");
                if current == ChannelState::Closed && !global.quiet {
                    eprintln!("Connection lost, reconnecting...");
                }
            }
        }
    }

    Ok(())
}

// ── Formatting ──────────────────────────────────────────────────────

/// Username of the sender: a plain string on the socket, a user object
/// over REST.
fn sender_name(notification: &Notification) -> Option<&str> {
    match notification.sender.as_ref()? {
        Value::String(name) => Some(name),
        Value::Object(user) => user.get("username").and_then(Value::as_str),
        _ => None,
    }
}

fn describe(notification: &Notification, color: bool) -> String {
    let title = notification
        .title
        .as_deref()
        .or(notification.notification_type.as_deref())
        .unwrap_or("notification");

    let mut line = output::accent(title, color);
    if let Some(sender) = sender_name(notification) {
        line.push_str(&format!(" from {sender}"));
    }
    if let Some(body) = notification.body.as_deref().filter(|b| !b.is_empty()) {
        line.push_str(": ");
        line.push_str(body);
    }
    line
}
