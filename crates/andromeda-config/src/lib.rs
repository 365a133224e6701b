//! Shared configuration for the Andromeda client.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! persisted session storage backends, and translation to
//! `andromeda_core::ClientConfig`.

mod storage;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use url::Url;

use andromeda_core::{ClientConfig, TlsVerification};

pub use storage::{FileStorage, KeyringStorage, open_storage};

/// Keyring service name for every stored secret.
pub const KEYRING_SERVICE: &str = "andromeda";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not configured")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Where the session tokens are persisted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenStore {
    /// JSON file in the platform data directory.
    #[default]
    File,
    /// System keyring.
    Keyring,
    /// Not persisted; the session ends with the process.
    Memory,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds before the notifications channel reconnects.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,

    #[serde(default)]
    pub token_store: TokenStore,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            reconnect_delay: default_reconnect_delay(),
            token_store: TokenStore::default(),
            insecure: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_reconnect_delay() -> u64 {
    5
}

/// A named server profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Server origin (e.g., "https://social.example.com"). The API and
    /// WebSocket roots are derived from it unless overridden.
    pub server: String,

    /// Override for the REST API root.
    pub api_url: Option<String>,

    /// Override for the WebSocket root.
    pub ws_url: Option<String>,

    pub username: Option<String>,

    /// Plaintext password. Prefer the keyring or `ANDROMEDA_PASSWORD`.
    pub password: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("social", "andromeda", "andromeda")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || fallback_dir(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory holding persisted session files.
pub fn sessions_dir() -> PathBuf {
    project_dirs().map_or_else(
        || fallback_dir(".local/share").join("sessions"),
        |dirs| dirs.data_dir().join("sessions"),
    )
}

fn fallback_dir(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("andromeda");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path`, layered as defaults → file → `ANDROMEDA_*`
/// environment (nested keys separated by `__`, e.g.
/// `ANDROMEDA_DEFAULTS__TIMEOUT=10`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ANDROMEDA_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Username from the profile, then `ANDROMEDA_USERNAME`.
pub fn resolve_username(profile: &Profile) -> Option<String> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var("ANDROMEDA_USERNAME").ok())
}

/// Password from `ANDROMEDA_PASSWORD`, then the keyring, then the
/// profile's plaintext field. `None` means the caller should prompt.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Env var
    if let Ok(pw) = std::env::var("ANDROMEDA_PASSWORD") {
        return Some(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &password_key(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return Some(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    profile
        .password
        .as_ref()
        .map(|pw| SecretString::from(pw.clone()))
}

/// Remember a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &password_key(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn password_key(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Translation to ClientConfig ─────────────────────────────────────

/// Build a `ClientConfig` from a profile and the global defaults.
pub fn profile_to_client_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let server = parse_url("server", &profile.server)?;
    let mut config = ClientConfig::from_server(&server).map_err(|e| ConfigError::Validation {
        field: "server".into(),
        reason: e.to_string(),
    })?;

    if let Some(ref api_url) = profile.api_url {
        config.api_url = parse_url("api_url", api_url)?;
    }
    if let Some(ref ws_url) = profile.ws_url {
        config.ws_url = parse_url("ws_url", ws_url)?;
    }

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.reconnect_delay = Duration::from_secs(defaults.reconnect_delay);
    Ok(config)
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    value.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn loads_profiles_and_defaults_from_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "home"

[defaults]
reconnect_delay = 2
token_store = "memory"

[profiles.home]
server = "http://localhost:8000"
username = "ada"
"#,
        )
        .expect("write config");

        let config = load_config_from(&path).expect("loads");
        assert_eq!(config.default_profile.as_deref(), Some("home"));
        assert_eq!(config.defaults.timeout, 30);
        assert_eq!(config.defaults.reconnect_delay, 2);
        assert_eq!(config.defaults.token_store, TokenStore::Memory);
        assert_eq!(config.profiles["home"].username.as_deref(), Some("ada"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from(&dir.path().join("absent.toml")).expect("loads");
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.token_store, TokenStore::File);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                server: "https://social.example.com".into(),
                username: Some("grace".into()),
                ..Profile::default()
            },
        );
        save_config_to(&config, &path).expect("saves");

        let loaded = load_config_from(&path).expect("loads");
        assert_eq!(loaded.profiles["default"].server, "https://social.example.com");
    }

    #[test]
    fn client_config_derives_roots() {
        let profile = Profile {
            server: "https://social.example.com".into(),
            ..Profile::default()
        };
        let defaults = Defaults {
            reconnect_delay: 9,
            ..Defaults::default()
        };

        let config = profile_to_client_config(&profile, &defaults).expect("builds");
        assert_eq!(config.api_url.as_str(), "https://social.example.com/api/");
        assert_eq!(config.ws_url.as_str(), "wss://social.example.com/ws/");
        assert_eq!(config.reconnect_delay, Duration::from_secs(9));
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn client_config_honours_overrides() {
        let profile = Profile {
            server: "http://localhost".into(),
            api_url: Some("http://localhost:8000/api/".into()),
            ws_url: Some("ws://localhost:8001/ws/".into()),
            insecure: Some(true),
            timeout: Some(5),
            ..Profile::default()
        };

        let config = profile_to_client_config(&profile, &Defaults::default()).expect("builds");
        assert_eq!(config.api_url.as_str(), "http://localhost:8000/api/");
        assert_eq!(config.ws_url.as_str(), "ws://localhost:8001/ws/");
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_server_url_is_a_validation_error() {
        let profile = Profile {
            server: "not a url".into(),
            ..Profile::default()
        };
        let err = profile_to_client_config(&profile, &Defaults::default()).expect_err("invalid");
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "server"));
    }

    #[test]
    fn token_store_parses() {
        assert_eq!("keyring".parse::<TokenStore>().expect("parses"), TokenStore::Keyring);
        assert_eq!(TokenStore::File.to_string(), "file");
    }
}
