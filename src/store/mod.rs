//! Storage abstraction for Siteminer.
//!
//! The [`TrainingStore`] trait defines all persistence operations used by
//! the pipeline: design-pattern upserts by natural key, session snapshots,
//! sample artifacts, and the custom-site queue.
//!
//! Two backends exist: a relational primary ([`sqlite::SqliteStore`]) and a
//! file-backed secondary ([`file::FileStore`]). The backend is chosen
//! exactly once at process startup by [`select_backend`]; a failed probe
//! permanently switches the process to the file-backed store. There is no
//! per-call retry or failover.

pub mod file;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{
    CandidateSite, DesignPatternRecord, StorageBackend, TrainingSample, TrainingSession,
};

/// Abstract storage backend for the training pipeline.
///
/// Implementations must be `Send + Sync` so the orchestrator can share one
/// behind an `Arc` across the server and the detached pipeline task.
#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// Insert or update a design pattern record by its natural key
    /// `(business_type, source_url)`.
    ///
    /// An existing key has all analytic fields replaced and `updated_at`
    /// refreshed; `created_at` is preserved. Never creates a duplicate.
    async fn upsert_design_pattern(&self, record: &DesignPatternRecord) -> Result<()>;

    /// Fetch a design pattern record by natural key.
    async fn get_design_pattern(
        &self,
        business_type: &str,
        source_url: &str,
    ) -> Result<Option<DesignPatternRecord>>;

    /// The subset of `urls` that is absent or stale for `business_type`,
    /// per the freshness gate.
    async fn patterns_needing_update(
        &self,
        business_type: &str,
        urls: &[String],
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<String>>;

    /// Persist a session snapshot (insert or update by id).
    async fn save_session(&self, session: &TrainingSession) -> Result<()>;

    /// Load a session snapshot by id.
    async fn load_session(&self, id: &str) -> Result<Option<TrainingSession>>;

    /// The most recently started session, if any.
    async fn latest_session(&self) -> Result<Option<TrainingSession>>;

    /// Persist a raw collection artifact. Samples are append-only.
    async fn save_sample(&self, sample: &TrainingSample) -> Result<()>;

    /// Replace the custom-site queue.
    async fn save_site_queue(&self, sites: &[CandidateSite]) -> Result<()>;

    /// Load the custom-site queue.
    async fn load_site_queue(&self) -> Result<Vec<CandidateSite>>;
}

/// One-time backend selection at process startup.
///
/// Probes the relational store (connectivity plus expected schema); on any
/// failure the process permanently uses the file-backed secondary. This is
/// a deliberate simplification — a mid-run relational outage does not
/// trigger a second failover.
pub async fn select_backend(
    config: &Config,
) -> Result<(StorageBackend, Arc<dyn TrainingStore>)> {
    match probe_relational(config).await {
        Ok(pool) => {
            info!("storage backend: relational ({})", config.storage.db_path.display());
            Ok((
                StorageBackend::Relational,
                Arc::new(sqlite::SqliteStore::new(pool)),
            ))
        }
        Err(e) => {
            warn!(
                "relational probe failed ({e:#}); falling back to file store at {}",
                config.storage.data_dir.display()
            );
            let store = file::FileStore::open(&config.storage.data_dir)?;
            Ok((StorageBackend::Filesystem, Arc::new(store)))
        }
    }
}

async fn probe_relational(config: &Config) -> Result<sqlx::SqlitePool> {
    let pool = sqlite::SqliteStore::connect(config).await?;

    for table in crate::migrate::EXPECTED_TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await?;

        if !exists {
            anyhow::bail!("missing table '{}' — run `siteminer init` first", table);
        }
    }

    Ok(pool)
}
