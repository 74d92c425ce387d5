//! Per-database schema migrations.
//!
//! Statements in `queries/` are written once, with `$N` placeholders, and run
//! unchanged on every supported database. Only the DDL differs, so each
//! database carries its own embedded migration set.

use async_trait::async_trait;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{Postgres, Sqlite};

static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");
static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

/// A database the fingerprint store can live in.
#[async_trait]
pub trait Dialect: sqlx::Database {
    /// Apply any pending migrations over an open connection.
    ///
    /// Applied migrations are recorded in the database, so running this
    /// again is a no-op.
    async fn migrate(conn: &mut Self::Connection) -> Result<(), MigrateError>;
}

#[async_trait]
impl Dialect for Postgres {
    async fn migrate(conn: &mut Self::Connection) -> Result<(), MigrateError> {
        POSTGRES_MIGRATOR.run_direct(conn).await
    }
}

#[async_trait]
impl Dialect for Sqlite {
    async fn migrate(conn: &mut Self::Connection) -> Result<(), MigrateError> {
        SQLITE_MIGRATOR.run_direct(conn).await
    }
}
