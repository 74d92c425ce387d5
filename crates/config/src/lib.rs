//! Configuration for the fingerprint store.
//!
//! Values are layered, later sources winning:
//! 1. built-in defaults,
//! 2. an optional file (TOML, YAML or JSON, chosen by extension),
//! 3. environment variables prefixed `FINGERPRINT_`, with `__` separating
//!    nested keys (`FINGERPRINT_DATABASE__HOST=db.internal`).

pub mod error;

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

const ENV_PREFIX: &str = "FINGERPRINT_";

/// Which storage engine holds fingerprints.
#[derive(Debug, Display, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A relational database (this workspace).
    #[default]
    #[display("relational")]
    Relational,
    /// The host's built-in file store.
    #[display("file")]
    File,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub database: DatabaseConfig,
}

/// Connection parameters for the relational backend.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database_name: String,
    /// Resolved through the host's credential store at connect time.
    pub credentials_id: Option<String>,
    /// Used instead of `credentials_id` when set.
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    /// Seconds allowed for establishing a connection.
    pub connect_timeout: u64,
    /// Seconds allowed for any single statement.
    pub socket_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database_name: "fingerprints".to_string(),
            credentials_id: None,
            username: None,
            password: None,
            ssl: false,
            connect_timeout: 3,
            socket_timeout: 3,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("credentials_id", &self.credentials_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl", &self.ssl)
            .field("connect_timeout", &self.connect_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("database.host"));
        }
        if self.port == 0 {
            exn::bail!(ErrorKind::Invalid("database.port"));
        }
        if self.database_name.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("database.database_name"));
        }
        if self.connect_timeout == 0 {
            exn::bail!(ErrorKind::Invalid("database.connect_timeout"));
        }
        if self.socket_timeout == 0 {
            exn::bail!(ErrorKind::Invalid("database.socket_timeout"));
        }
        Ok(())
    }
}

impl Config {
    /// Load defaults, then `path` (if any), then the environment.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = Self::figment(path)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Load defaults and `path` only, ignoring the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::extract(Self::figment(Some(path))?)
    }

    fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let Some(path) = path else {
            return Ok(figment);
        };
        if !path.is_file() {
            exn::bail!(ErrorKind::Missing(path.to_path_buf()));
        }
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default().to_ascii_lowercase();
        Ok(match extension.as_str() {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(extension)),
        })
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.database.validate()?;
        tracing::debug!(backend = %config.backend, host = %config.database.host, "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::Relational);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.database_name, "fingerprints");
        assert!(!config.database.ssl);
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.database.socket_timeout(), Duration::from_secs(3));
        config.database.validate().unwrap();
    }

    #[rstest]
    #[case(".toml", "backend = \"file\"\n[database]\nhost = \"db.internal\"\nport = 6543\nssl = true\n")]
    #[case(".yaml", "backend: file\ndatabase:\n  host: db.internal\n  port: 6543\n  ssl: true\n")]
    #[case(".json", r#"{"backend": "file", "database": {"host": "db.internal", "port": 6543, "ssl": true}}"#)]
    fn test_file_overrides_defaults(#[case] suffix: &str, #[case] contents: &str) {
        let file = write_config(suffix, contents);
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert!(config.database.ssl);
        // Untouched keys keep their defaults.
        assert_eq!(config.database.database_name, "fingerprints");
        assert_eq!(config.database.connect_timeout, 3);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config(".ini", "host = x");
        let err = Config::from_file(file.path()).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat("ini".to_string()));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(*err, ErrorKind::Missing(_)));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_config(".toml", "[database]\nport = \"not a number\"\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
    }

    #[rstest]
    #[case("[database]\nhost = \"\"\n", "database.host")]
    #[case("[database]\nport = 0\n", "database.port")]
    #[case("[database]\ndatabase_name = \" \"\n", "database.database_name")]
    #[case("[database]\nconnect_timeout = 0\n", "database.connect_timeout")]
    #[case("[database]\nsocket_timeout = 0\n", "database.socket_timeout")]
    fn test_validation(#[case] contents: &str, #[case] key: &'static str) {
        let file = write_config(".toml", contents);
        let err = Config::from_file(file.path()).unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid(key));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DatabaseConfig { password: Some("hunter2".to_string()), ..DatabaseConfig::default() };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
