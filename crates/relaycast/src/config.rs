//! Server configuration: defaults, per-profile JSON files, environment
//! overrides.
//!
//! Resolution order, later wins:
//!
//! 1. [`ServerConfig::default()`]
//! 2. `<dir>/Config<Profile>.json`, where the profile comes from
//!    `RELAYCAST_ENV` (`Dev` when unset or unrecognized)
//! 3. `RELAYCAST_PORT` and `RELAYCAST_RELAY_URL`
//!
//! A missing or broken file is not fatal: the server logs a warning and
//! runs on defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relaycast_protocol::DEFAULT_MAX_FRAME_LEN;
use relaycast_relay::DEFAULT_CHANNEL;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Environment variable selecting the [`Profile`].
pub const ENV_PROFILE: &str = "RELAYCAST_ENV";
/// Environment variable overriding the config directory.
pub const ENV_CONFIG_DIR: &str = "RELAYCAST_CONFIG_DIR";
/// Environment variable overriding [`ServerConfig::port`].
pub const ENV_PORT: &str = "RELAYCAST_PORT";
/// Environment variable overriding [`ServerConfig::relay_url`].
pub const ENV_RELAY_URL: &str = "RELAYCAST_RELAY_URL";

/// Deployment profile; picks which config file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Dev,
    Staging,
    Production,
}

impl Profile {
    /// Parses a profile name, ignoring case. Anything unrecognized is `Dev`.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("production") {
            Self::Production
        } else if name.eq_ignore_ascii_case("staging") {
            Self::Staging
        } else {
            Self::Dev
        }
    }

    /// Reads the profile from `RELAYCAST_ENV`.
    pub fn from_env() -> Self {
        std::env::var(ENV_PROFILE)
            .map(|name| Self::from_name(&name))
            .unwrap_or_default()
    }

    /// The config file name for this profile, e.g. `ConfigStaging.json`.
    pub fn file_name(self) -> String {
        format!("Config{self}.json")
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => f.write_str("Dev"),
            Self::Staging => f.write_str("Staging"),
            Self::Production => f.write_str("Production"),
        }
    }
}

/// Everything a server process needs to start.
///
/// Fields missing from a config file take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port clients connect to. Default: 3000.
    pub port: u16,

    /// Relay address: `host:port`, `redis://host:port`, or `memory` for the
    /// in-process relay. Default: `127.0.0.1:6379`.
    pub relay_url: String,

    /// Relay channel shared by all instances. Default: `GlobalChat`.
    pub channel: String,

    /// Largest accepted frame body in bytes. Default: 64 KiB.
    pub max_frame_len: usize,

    /// Seconds without a complete frame before a connection is closed.
    /// `0` disables the timeout. Default: 300.
    pub idle_timeout_secs: u64,

    /// Seconds a single frame write may take. `0` disables the timeout.
    /// Default: 5.
    pub write_timeout_secs: u64,

    /// Optional notice sent to every new connection.
    pub greeting: Option<String>,

    /// Broadcast locally when publishing to the relay fails. Default: true.
    pub local_fallback: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            relay_url: "127.0.0.1:6379".to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            idle_timeout_secs: 300,
            write_timeout_secs: 5,
            greeting: None,
            local_fallback: true,
        }
    }
}

impl ServerConfig {
    /// Parses a config file.
    ///
    /// # Errors
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `<dir>/Config<Profile>.json`, falling back to defaults.
    pub fn load(dir: impl AsRef<Path>, profile: Profile) -> Self {
        let path = dir.as_ref().join(profile.file_name());
        match Self::from_file(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), %profile, "loaded config");
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, %profile, "using default config");
                Self::default()
            }
        }
    }

    /// Resolves the configuration from the process environment.
    ///
    /// The directory is `RELAYCAST_CONFIG_DIR`, or `config` when unset.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(ENV_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config"));
        Self::load(dir, Profile::from_env()).with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `RELAYCAST_PORT` / `RELAYCAST_RELAY_URL` as returned by
    /// `lookup`. An unparsable port is logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_PORT) {
            match raw.trim().parse() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(value = %raw, error = %e, "ignoring invalid {ENV_PORT}"),
            }
        }
        if let Some(url) = lookup(ENV_RELAY_URL) {
            self.relay_url = url;
        }
        self
    }

    /// Address the listener binds to (all interfaces).
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.idle_timeout_secs)
    }

    /// Per-frame write timeout, `None` when disabled.
    pub fn write_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.write_timeout_secs)
    }

    /// Whether `relay_url` selects the in-process relay.
    pub fn uses_memory_relay(&self) -> bool {
        self.relay_url.eq_ignore_ascii_case("memory")
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
