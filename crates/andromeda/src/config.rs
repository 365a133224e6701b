//! CLI configuration: thin wrapper around `andromeda_config` shared types.
//!
//! Adds profile resolution that respects `GlobalOpts` flag overrides
//! (--server, --insecure, --timeout) and builds the core `Client`.

use andromeda_core::Client;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use andromeda_config::{
    Config, Defaults, Profile, TokenStore, config_path, load_config_or_default, save_config,
};

/// Everything a server-bound command needs.
pub struct Context {
    pub client: Client,
    pub profile_name: String,
    pub profile: Profile,
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Apply CLI flag overrides on top of a profile.
///
/// Flags take priority over profile values.
pub fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    profile
}

/// Load the config, pick the profile, and build a `Client` over the
/// profile's persisted session.
pub fn build_context(global: &GlobalOpts) -> Result<Context, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // No profile: --server alone is enough
        None if global.server.is_some() => Profile::default(),
        None if global.profile.is_some() && !cfg.profiles.is_empty() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available.join(", "),
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };
    let profile = apply_overrides(profile, global);

    let client_config = andromeda_config::profile_to_client_config(&profile, &cfg.defaults)?;
    let storage = andromeda_config::open_storage(cfg.defaults.token_store, &profile_name);
    tracing::debug!(
        api = %client_config.api_url,
        ws = %client_config.ws_url,
        token_store = %cfg.defaults.token_store,
        "client configured"
    );

    let client = Client::new(client_config, storage)?;
    Ok(Context {
        client,
        profile_name,
        profile,
    })
}
