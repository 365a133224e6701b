//! Command dispatch: bridges CLI args -> core client calls -> output formatting.

pub mod auth;
pub mod chat;
pub mod config_cmd;
pub mod notifications;

use crate::cli::{Command, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => auth::login(ctx, args, global).await,
        Command::Register => auth::register(ctx, global).await,
        Command::Logout => auth::logout(ctx, global).await,
        Command::Whoami => auth::whoami(ctx, global).await,
        Command::Notifications(args) => notifications::handle(ctx, args, global).await,
        Command::Chat(args) => chat::handle(ctx, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Fail fast when the profile has no stored session.
pub(crate) fn require_login(ctx: &Context) -> Result<(), CliError> {
    if ctx.client.session().is_authenticated() {
        Ok(())
    } else {
        Err(CliError::LoginRequired)
    }
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub(crate) fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}
