//! Relational storage backend for build fingerprints.
//!
//! Fingerprints are normalized into three tables that every instance sharing
//! the database writes to, each row scoped by [`InstanceId`]:
//! - `fingerprint`: one header row per `(hash, instance_id)`.
//! - `fingerprint_job_build_relation`: one row per `(job, build)` usage.
//! - `fingerprint_facet_relation`: one row per facet entry, in insertion order.
//!
//! PostgreSQL is the production target. SQLite runs the very same statements
//! and serves embedded setups and tests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use fingerprint_config::Config;
//! use fingerprint_core::InstanceId;
//! use fingerprint_store::{FingerprintStore, PostgresConnectionProvider, StaticCredentials};
//!
//! # async fn example() -> fingerprint_store::error::Result<()> {
//! let config = Config::default();
//! let provider = PostgresConnectionProvider::new(config.database, Arc::new(StaticCredentials::new()));
//! let store = FingerprintStore::new(provider, InstanceId::from_identity(b"instance public key"));
//! store.schema().migrate_on_startup(config.backend).await?;
//! let ready = store.is_ready().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`InstanceId`]: fingerprint_core::InstanceId

mod connection;
mod dialect;
pub mod error;
mod models;
mod schema;
mod store;

pub use crate::connection::{
    ConnectionProvider, CredentialLookup, Credentials, PostgresConnectionProvider, SqliteConnectionProvider,
    StaticCredentials,
};
pub use crate::dialect::Dialect;
pub use crate::models::{FacetRow, HeaderRow, UsageRow};
pub use crate::schema::SchemaManager;
pub use crate::store::{CleanupReport, FingerprintStore, StoreStats};
