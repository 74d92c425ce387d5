//! Turning configuration into live database connections.
//!
//! Every store operation asks its provider for a fresh connection and closes
//! it when done; providers never hold connections between calls.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use fingerprint_config::DatabaseConfig;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{PgConnection, SqliteConnection};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Opens connections to one database.
#[async_trait]
pub trait ConnectionProvider<DB: sqlx::Database>: Send + Sync + fmt::Debug {
    /// Open a new connection.
    ///
    /// Returns [`ErrorKind::Connection`] on any network, authentication or
    /// timeout failure.
    async fn connect(&self) -> Result<DB::Connection>;
}

/// A username and password pair.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

/// The host's credential store.
pub trait CredentialLookup: Send + Sync {
    /// Look up the credentials stored under an opaque identifier.
    fn resolve(&self, id: &str) -> Option<Credentials>;
}

/// A fixed set of credentials, keyed by identifier.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials(Vec<(String, Credentials)>);

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, credentials: Credentials) -> Self {
        self.0.push((id.into(), credentials));
        self
    }
}

impl CredentialLookup for StaticCredentials {
    fn resolve(&self, id: &str) -> Option<Credentials> {
        self.0.iter().find(|(key, _)| key == id).map(|(_, credentials)| credentials.clone())
    }
}

// =========================================================================
// PostgreSQL
// =========================================================================

/// Connects to PostgreSQL using a [`DatabaseConfig`].
pub struct PostgresConnectionProvider {
    config: DatabaseConfig,
    credentials: Arc<dyn CredentialLookup>,
}

impl fmt::Debug for PostgresConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnectionProvider").field("config", &self.config).finish_non_exhaustive()
    }
}

impl PostgresConnectionProvider {
    pub fn new(config: DatabaseConfig, credentials: Arc<dyn CredentialLookup>) -> Self {
        Self { config, credentials }
    }

    /// Explicit username/password win over the credential id. An id that
    /// is missing or unknown yields empty credentials, and the server gets
    /// to reject the login.
    fn credentials(&self) -> Credentials {
        if let Some(username) = &self.config.username {
            return Credentials::new(username.clone(), self.config.password.clone().unwrap_or_default());
        }
        let Some(id) = self.config.credentials_id.as_deref() else {
            return Credentials::default();
        };
        self.credentials.resolve(id).unwrap_or_else(|| {
            tracing::warn!(credentials_id = %id, "Credentials not found; connecting with empty username and password");
            Credentials::default()
        })
    }

    fn options(&self) -> PgConnectOptions {
        let credentials = self.credentials();
        let statement_timeout = self.config.socket_timeout().as_millis().to_string();
        PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .database(&self.config.database_name)
            .username(&credentials.username)
            .password(&credentials.password)
            .ssl_mode(if self.config.ssl { PgSslMode::Require } else { PgSslMode::Prefer })
            .options([("statement_timeout", statement_timeout)])
    }
}

#[async_trait]
impl ConnectionProvider<sqlx::Postgres> for PostgresConnectionProvider {
    #[instrument(skip(self), fields(host = %self.config.host, port = self.config.port))]
    async fn connect(&self) -> Result<PgConnection> {
        let options = self.options();
        with_timeout(self.config.connect_timeout(), options.connect()).await
    }
}

// =========================================================================
// SQLite
// =========================================================================

/// Connects to an SQLite database file, creating it if needed.
#[derive(Debug, Clone)]
pub struct SqliteConnectionProvider {
    path: PathBuf,
    connect_timeout: Duration,
    busy_timeout: Duration,
}

impl SqliteConnectionProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            connect_timeout: Duration::from_secs(3),
            busy_timeout: Duration::from_secs(3),
        }
    }

    /// Take both timeouts from the database configuration.
    pub fn with_timeouts(mut self, config: &DatabaseConfig) -> Self {
        self.connect_timeout = config.connect_timeout();
        self.busy_timeout = config.socket_timeout();
        self
    }

    fn options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

#[async_trait]
impl ConnectionProvider<sqlx::Sqlite> for SqliteConnectionProvider {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn connect(&self) -> Result<SqliteConnection> {
        let options = self.options();
        with_timeout(self.connect_timeout, options.connect()).await
    }
}

async fn with_timeout<C>(limit: Duration, connect: impl Future<Output = sqlx::Result<C>>) -> Result<C> {
    match tokio::time::timeout(limit, connect).await {
        Ok(connected) => connected.or_raise(|| ErrorKind::Connection),
        Err(elapsed) => Err(elapsed).or_raise(|| ErrorKind::Connection),
    }
}
