// Configuration schema for btmse.
// Numan Thabit 2026

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// Error returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when reading a configuration file from disk.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Error when parsing the configuration contents.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration did not pass validation checks.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// High-level configuration loaded at startup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Handshake negotiation policy and timeouts.
    pub handshake: HandshakeConfig,
}

impl Config {
    /// Loads configuration from `BTMSE_CONFIG` if set, otherwise returns defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var("BTMSE_CONFIG") {
            Ok(path) => Self::from_path(path),
            Err(_missing) => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    /// Loads a configuration file from the provided path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from a TOML string slice.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        <Self as FromStr>::from_str(input)
    }

    /// Validates the configuration, returning an error when constraints are violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.handshake.validate().map_err(ConfigError::Validation)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Tunables for the encrypted-handshake stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Refuse to fall back to the legacy plaintext handshake.
    pub require_crypto: bool,
    /// Deadline for the pre-key-exchange connection setup, in seconds.
    pub connect_timeout_secs: u64,
    /// Deadline for the protocol exchange once the key is on the wire, in seconds.
    pub protocol_timeout_secs: u64,
    /// Connection count below which replacement peers are still recruited.
    pub min_peers: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            require_crypto: false,
            connect_timeout_secs: 20,
            protocol_timeout_secs: 180,
            min_peers: 40,
        }
    }
}

impl HandshakeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn protocol_timeout(&self) -> Duration {
        Duration::from_secs(self.protocol_timeout_secs)
    }

    /// Ensures invariants for the handshake section hold.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be > 0".into());
        }
        if self.protocol_timeout_secs == 0 {
            return Err("protocol_timeout_secs must be > 0".into());
        }
        if self.protocol_timeout_secs < self.connect_timeout_secs {
            return Err("protocol_timeout_secs must be >= connect_timeout_secs".into());
        }
        if self.min_peers == 0 {
            return Err("min_peers must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.handshake.connect_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.handshake.protocol_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn parses_handshake_section() {
        let input = r#"
            [handshake]
            require_crypto = true
            connect_timeout_secs = 10
            protocol_timeout_secs = 60
            min_peers = 8
        "#;

        let cfg = Config::from_toml_str(input).expect("config");
        assert!(cfg.handshake.require_crypto);
        assert_eq!(cfg.handshake.connect_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.handshake.min_peers, 8);
    }

    #[test]
    fn zero_timeout_rejected() {
        let input = r#"
            [handshake]
            connect_timeout_secs = 0
        "#;

        let err = Config::from_toml_str(input).unwrap_err();
        match err {
            ConfigError::Validation(msg) => {
                assert!(msg.contains("connect_timeout_secs"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn protocol_timeout_must_cover_connect_timeout() {
        let input = r#"
            [handshake]
            connect_timeout_secs = 30
            protocol_timeout_secs = 10
        "#;

        let err = Config::from_toml_str(input).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
