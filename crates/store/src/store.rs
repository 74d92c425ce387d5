//! The fingerprint store.
//!
//! Every operation follows the same lifecycle: acquire a connection, open a
//! transaction, run its statements, then commit (or roll back on the first
//! failure) and close the connection. Nothing is held between operations.
//!
//! `save` replaces a fingerprint by deleting its rows and inserting fresh
//! ones inside one transaction. Under read-committed isolation (or stronger)
//! other sessions never observe the gap between the two.

use crate::connection::ConnectionProvider;
use crate::dialect::Dialect;
use crate::error::{ErrorKind, Result};
use crate::models::{self, FacetRow, HeaderRow, UsageRow};
use crate::schema::SchemaManager;
use exn::ResultExt;
use fingerprint_core::{Fingerprint, FingerprintHash, InstanceId};
use sqlx::{Connection, Encode, Executor, FromRow, IntoArguments, Type};
use std::fmt;
use std::sync::Arc;
use time::PrimitiveDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

/// Row counts owned by one instance.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct StoreStats {
    pub fingerprints: u64,
    pub usages: u64,
    pub facets: u64,
}

/// Outcome of [`FingerprintStore::cleanup`].
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct CleanupReport {
    /// Fingerprints examined.
    pub scanned: usize,
    /// Fingerprints that lost some usages but were kept.
    pub trimmed: usize,
    pub deleted: usize,
    /// Fingerprints that could not be loaded or written; left untouched.
    pub failed: usize,
}

/// Persists fingerprints for one instance in a relational database.
pub struct FingerprintStore<DB: Dialect> {
    provider: Arc<dyn ConnectionProvider<DB>>,
    schema: SchemaManager<DB>,
    instance_id: InstanceId,
    save_lock: Mutex<()>,
}

impl<DB: Dialect> fmt::Debug for FingerprintStore<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintStore")
            .field("provider", &self.provider)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl<DB> FingerprintStore<DB>
where
    DB: Dialect,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'q> String: Encode<'q, DB> + Type<DB>,
    for<'q> i64: Encode<'q, DB> + Type<DB>,
    for<'q> Option<String>: Encode<'q, DB> + Type<DB>,
    for<'q> Option<i64>: Encode<'q, DB> + Type<DB>,
    for<'q> bool: Encode<'q, DB> + Type<DB>,
    for<'q> PrimitiveDateTime: Encode<'q, DB> + Type<DB>,
    for<'r> HeaderRow: FromRow<'r, DB::Row>,
    for<'r> UsageRow: FromRow<'r, DB::Row>,
    for<'r> FacetRow: FromRow<'r, DB::Row>,
    for<'r> (i64,): FromRow<'r, DB::Row>,
    for<'r> (String,): FromRow<'r, DB::Row>,
{
    /// Create a store without touching the database.
    pub fn new(provider: impl ConnectionProvider<DB> + 'static, instance_id: InstanceId) -> Self {
        let provider: Arc<dyn ConnectionProvider<DB>> = Arc::new(provider);
        Self { schema: SchemaManager::new(Arc::clone(&provider)), provider, instance_id, save_lock: Mutex::new(()) }
    }

    /// Create a store and bring its schema up to date.
    pub async fn open(provider: impl ConnectionProvider<DB> + 'static, instance_id: InstanceId) -> Result<Self> {
        let store = Self::new(provider, instance_id);
        store.schema.initialize().await?;
        Ok(store)
    }

    pub fn schema(&self) -> &SchemaManager<DB> {
        &self.schema
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    async fn release(conn: DB::Connection) {
        if let Err(err) = conn.close().await {
            tracing::debug!(error = %err, "Failed to close fingerprint database connection cleanly");
        }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert or fully replace a fingerprint.
    ///
    /// Either every row of the new version is committed or, on any failure,
    /// the previously stored version is left exactly as it was.
    #[instrument(skip_all, fields(hash = %fingerprint.hash))]
    pub async fn save(&self, fingerprint: &Fingerprint) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let outcome = self.try_save(fingerprint).await;
        if let Err(err) = &outcome {
            tracing::warn!(hash = %fingerprint.hash, error = ?err, "Failed to save fingerprint");
        }
        outcome
    }

    async fn try_save(&self, fingerprint: &Fingerprint) -> Result<()> {
        let header = models::to_header_row(fingerprint)?;
        let usages = models::to_usage_rows(fingerprint);
        let facets = models::to_facet_rows(fingerprint)?;
        let hash = header.hash.clone();

        let mut conn = self.provider.connect().await?;
        let outcome = async {
            let mut tx = conn.begin().await.or_raise(|| ErrorKind::Sql)?;
            let written = async {
                self.delete_rows(&mut tx, &hash).await?;
                self.insert_rows(&mut tx, header, usages, facets).await
            }
            .await;
            Self::finish(tx, written).await
        }
        .await;
        Self::release(conn).await;
        outcome
    }

    async fn insert_rows(
        &self,
        conn: &mut DB::Connection,
        header: HeaderRow,
        usages: Vec<UsageRow>,
        facets: Vec<FacetRow>,
    ) -> Result<()> {
        let instance = self.instance_id.to_string();
        let hash = header.hash.clone();
        sqlx::query::<DB>(include_str!("../queries/insert_fingerprint.sql"))
            .bind(header.hash)
            .bind(instance.clone())
            .bind(header.timestamp)
            .bind(header.filename)
            .bind(header.original_job_name)
            .bind(header.original_job_build)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Sql)?;
        for usage in usages {
            sqlx::query::<DB>(include_str!("../queries/insert_usage.sql"))
                .bind(hash.clone())
                .bind(instance.clone())
                .bind(usage.job_name)
                .bind(usage.build_number)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Sql)?;
        }
        for facet in facets {
            sqlx::query::<DB>(include_str!("../queries/insert_facet.sql"))
                .bind(hash.clone())
                .bind(instance.clone())
                .bind(facet.facet_name)
                .bind(facet.facet_entry)
                .bind(facet.deletion_blocked)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Sql)?;
        }
        Ok(())
    }

    /// Remove every row of one fingerprint. Relations go first so the
    /// header's foreign keys are never violated.
    async fn delete_rows(&self, conn: &mut DB::Connection, hash: &str) -> Result<()> {
        let statements = [
            include_str!("../queries/delete_usages.sql"),
            include_str!("../queries/delete_facets.sql"),
            include_str!("../queries/delete_fingerprint.sql"),
        ];
        for statement in statements {
            sqlx::query::<DB>(statement)
                .bind(hash.to_string())
                .bind(self.instance_id.to_string())
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Sql)?;
        }
        Ok(())
    }

    /// Commit on success, roll back on failure.
    async fn finish<T>(tx: sqlx::Transaction<'_, DB>, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                tx.commit().await.or_raise(|| ErrorKind::Sql)?;
                Ok(value)
            },
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Failed to roll back fingerprint transaction");
                }
                Err(err)
            },
        }
    }

    /// Delete a fingerprint. Deleting one that does not exist succeeds.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn delete(&self, hash: &FingerprintHash) -> Result<()> {
        let outcome = self.try_delete(hash).await;
        if let Err(err) = &outcome {
            tracing::warn!(%hash, error = ?err, "Failed to delete fingerprint");
        }
        outcome
    }

    async fn try_delete(&self, hash: &FingerprintHash) -> Result<()> {
        let hash = hash.to_hex();
        let mut conn = self.provider.connect().await?;
        let outcome = async {
            let mut tx = conn.begin().await.or_raise(|| ErrorKind::Sql)?;
            let deleted = self.delete_rows(&mut tx, &hash).await;
            Self::finish(tx, deleted).await
        }
        .await;
        Self::release(conn).await;
        outcome
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Load a fingerprint, or `None` if this instance has never stored it.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn load(&self, hash: &FingerprintHash) -> Result<Option<Fingerprint>> {
        let outcome = self.try_load(hash).await;
        if let Err(err) = &outcome {
            tracing::warn!(%hash, error = ?err, "Failed to load fingerprint");
        }
        outcome
    }

    async fn try_load(&self, hash: &FingerprintHash) -> Result<Option<Fingerprint>> {
        let hash = hash.to_hex();
        let instance = self.instance_id.to_string();
        let mut conn = self.provider.connect().await?;
        let outcome = async {
            let mut tx = conn.begin().await.or_raise(|| ErrorKind::Sql)?;
            let rows = async {
                let header = sqlx::query_as::<DB, HeaderRow>(include_str!("../queries/select_fingerprint.sql"))
                    .bind(hash.clone())
                    .bind(instance.clone())
                    .fetch_optional(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Sql)?;
                let Some(header) = header else {
                    return Ok(None);
                };
                let usages = sqlx::query_as::<DB, UsageRow>(include_str!("../queries/select_usages.sql"))
                    .bind(hash.clone())
                    .bind(instance.clone())
                    .fetch_all(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Sql)?;
                let facets = sqlx::query_as::<DB, FacetRow>(include_str!("../queries/select_facets.sql"))
                    .bind(hash.clone())
                    .bind(instance.clone())
                    .fetch_all(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Sql)?;
                Ok::<_, crate::error::Error>(Some((header, usages, facets)))
            }
            .await;
            Self::finish(tx, rows).await
        }
        .await;
        Self::release(conn).await;
        match outcome? {
            Some((header, usages, facets)) => models::from_rows(header, usages, facets).map(Some),
            None => Ok(None),
        }
    }

    /// Whether this instance has stored at least one fingerprint.
    pub async fn is_ready(&self) -> Result<bool> {
        Ok(self.count(include_str!("../queries/select_fingerprint_count.sql")).await? > 0)
    }

    /// Row counts for this instance.
    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            fingerprints: self.count(include_str!("../queries/select_fingerprint_count.sql")).await?,
            usages: self.count(include_str!("../queries/select_usage_count.sql")).await?,
            facets: self.count(include_str!("../queries/select_facet_count.sql")).await?,
        })
    }

    async fn count(&self, statement: &'static str) -> Result<u64> {
        let mut conn = self.provider.connect().await?;
        let row = sqlx::query_as::<DB, (i64,)>(statement)
            .bind(self.instance_id.to_string())
            .fetch_one(&mut conn)
            .await
            .or_raise(|| ErrorKind::Sql);
        Self::release(conn).await;
        u64::try_from(row?.0).or_raise(|| ErrorKind::DataFormat("row count"))
    }

    /// Hashes of every fingerprint stored by this instance, ascending.
    ///
    /// Fails with [`ErrorKind::DataFormat`] if any stored hash is malformed.
    pub async fn list_hashes(&self) -> Result<Vec<FingerprintHash>> {
        self.list_raw_hashes().await?.iter().map(|hash| models::parse_hash(hash)).collect()
    }

    async fn list_raw_hashes(&self) -> Result<Vec<String>> {
        let mut conn = self.provider.connect().await?;
        let rows = sqlx::query_as::<DB, (String,)>(include_str!("../queries/select_hashes.sql"))
            .bind(self.instance_id.to_string())
            .fetch_all(&mut conn)
            .await
            .or_raise(|| ErrorKind::Sql);
        Self::release(conn).await;
        Ok(rows?.into_iter().map(|(hash,)| hash).collect())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Garbage-collect fingerprints whose builds are gone.
    ///
    /// `is_build_alive(job, number)` reports whether a build still exists.
    /// Dead usages are trimmed. A fingerprint with no live usages and no live
    /// original build is deleted unless one of its facets blocks deletion.
    /// A fingerprint that fails to load or write, or whose stored hash is
    /// malformed, is counted as failed and skipped.
    #[instrument(skip_all)]
    pub async fn cleanup(&self, mut is_build_alive: impl FnMut(&str, u32) -> bool) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for raw in self.list_raw_hashes().await? {
            report.scanned += 1;
            let hash = match models::parse_hash(&raw) {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::warn!(hash = %raw, error = ?err, "Skipping fingerprint with a malformed hash");
                    report.failed += 1;
                    continue;
                },
            };
            let mut fingerprint = match self.load(&hash).await {
                Ok(Some(fingerprint)) => fingerprint,
                // Deleted concurrently.
                Ok(None) => continue,
                Err(_) => {
                    report.failed += 1;
                    continue;
                },
            };
            let trimmed = fingerprint.trim(&mut is_build_alive);
            let outcome = if !fingerprint.is_alive(&mut is_build_alive) && !fingerprint.is_deletion_blocked() {
                self.delete(&hash).await.map(|()| report.deleted += 1)
            } else if trimmed {
                self.save(&fingerprint).await.map(|()| report.trimmed += 1)
            } else {
                Ok(())
            };
            if outcome.is_err() {
                report.failed += 1;
            }
        }
        tracing::info!(
            scanned = report.scanned,
            trimmed = report.trimmed,
            deleted = report.deleted,
            failed = report.failed,
            "Fingerprint cleanup finished"
        );
        Ok(report)
    }
}
