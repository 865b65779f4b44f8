use anyhow::Result;

use crate::config::Config;
use crate::store::sqlite::SqliteStore;

/// Tables the relational backend is expected to carry. The startup probe
/// checks for all of them before committing to the relational store.
pub const EXPECTED_TABLES: &[&str] = &["design_patterns", "training_sessions", "training_samples"];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = SqliteStore::connect(config).await?;

    // Design pattern records, upserted by natural key.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS design_patterns (
            business_type TEXT NOT NULL,
            source_url TEXT NOT NULL,
            html_content TEXT NOT NULL,
            css_content TEXT NOT NULL,
            color_palette_json TEXT NOT NULL DEFAULT '[]',
            font_families_json TEXT NOT NULL DEFAULT '[]',
            layout_json TEXT NOT NULL DEFAULT '{}',
            semantic_json TEXT NOT NULL DEFAULT '{}',
            performance_json TEXT NOT NULL DEFAULT '{}',
            accessibility_score INTEGER NOT NULL DEFAULT 0,
            design_score INTEGER NOT NULL DEFAULT 0,
            mobile_responsive INTEGER NOT NULL DEFAULT 0,
            confidence_score REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (business_type, source_url)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Session snapshots, one row per run, updated in place.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_sessions (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            progress_percent INTEGER NOT NULL DEFAULT 0,
            current_step TEXT NOT NULL DEFAULT '',
            samples_collected INTEGER NOT NULL DEFAULT 0,
            total_samples INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            accuracy REAL,
            error_message TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Raw per-session collection artifacts, append-only.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_samples (
            sample_id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            business_type TEXT NOT NULL,
            session_id TEXT NOT NULL,
            html_content TEXT NOT NULL,
            html_length INTEGER NOT NULL,
            collection_method TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES training_sessions(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Custom-site queue, replaced wholesale at the start of each custom run.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS site_queue (
            url TEXT NOT NULL,
            business_type TEXT NOT NULL,
            style TEXT,
            queued_at INTEGER NOT NULL,
            PRIMARY KEY (business_type, url)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_patterns_business_type ON design_patterns(business_type)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_samples_session_id ON training_samples(session_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON training_sessions(started_at DESC)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
