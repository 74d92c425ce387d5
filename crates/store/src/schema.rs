use crate::connection::ConnectionProvider;
use crate::dialect::Dialect;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fingerprint_config::BackendKind;
use sqlx::Connection;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

/// Creates and upgrades the fingerprint tables.
///
/// Migrations only ever add: running [`initialize`](Self::initialize) any
/// number of times, against an empty or a populated database, leaves existing
/// rows alone.
pub struct SchemaManager<DB: Dialect> {
    provider: Arc<dyn ConnectionProvider<DB>>,
    migrated: AtomicBool,
}

impl<DB: Dialect> fmt::Debug for SchemaManager<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaManager")
            .field("provider", &self.provider)
            .field("migrated", &self.is_migrated())
            .finish()
    }
}

impl<DB: Dialect> SchemaManager<DB> {
    pub fn new(provider: Arc<dyn ConnectionProvider<DB>>) -> Self {
        Self { provider, migrated: AtomicBool::new(false) }
    }

    /// Bring the schema up to date.
    ///
    /// Returns [`ErrorKind::Schema`] if a migration fails, in which case the
    /// backend should be treated as not ready.
    #[instrument("initializing fingerprint schema", skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let mut conn = self.provider.connect().await?;
        let outcome = DB::migrate(&mut conn).await;
        _ = conn.close().await;
        if let Err(err) = outcome {
            tracing::error!(error = %err, "Fingerprint schema migration failed");
            return Err(err).or_raise(|| ErrorKind::Schema);
        }
        self.migrated.store(true, Ordering::Release);
        tracing::info!("Fingerprint schema is up to date");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded in this process.
    pub fn is_migrated(&self) -> bool {
        self.migrated.load(Ordering::Acquire)
    }

    /// Startup hook: migrate only when the relational backend is active.
    ///
    /// Returns whether a migration ran.
    pub async fn migrate_on_startup(&self, backend: BackendKind) -> Result<bool> {
        if backend != BackendKind::Relational {
            tracing::debug!(%backend, "Relational backend inactive; skipping schema migration");
            return Ok(false);
        }
        self.initialize().await?;
        Ok(true)
    }
}
