//! Relational [`TrainingStore`] implementation.
//!
//! Maps each store operation onto the SQLite schema created by
//! [`crate::migrate`]. Natural-key upserts use
//! `INSERT ... ON CONFLICT DO UPDATE` so a re-collection of the same
//! `(business_type, source_url)` pair never creates a second row.

use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::freshness;
use crate::models::{
    CandidateSite, CollectionMethod, DesignPatternRecord, RecordStatus, SampleStatus, SessionKind,
    SessionStatus, TrainingSample, TrainingSession,
};

use super::TrainingStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the relational pool. WAL with a busy timeout so the server and
    /// a one-shot CLI run can share the file; foreign keys on because
    /// samples reference their session.
    pub async fn connect(config: &Config) -> Result<SqlitePool> {
        let db_path = &config.storage.db_path;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    #[allow(dead_code)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn kind_str(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Global => "global",
        SessionKind::Custom => "custom",
    }
}

fn parse_kind(s: &str) -> SessionKind {
    match s {
        "custom" => SessionKind::Custom,
        _ => SessionKind::Global,
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "pending" => SessionStatus::Pending,
        "completed" => SessionStatus::Completed,
        "failed" => SessionStatus::Failed,
        _ => SessionStatus::Running,
    }
}

fn method_str(method: CollectionMethod) -> &'static str {
    match method {
        CollectionMethod::Browser => "browser",
        CollectionMethod::Http => "http",
        CollectionMethod::Synthetic => "synthetic",
    }
}

fn record_status_str(status: RecordStatus) -> &'static str {
    match status {
        RecordStatus::Active => "active",
        RecordStatus::Error => "error",
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> TrainingSession {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let metadata_json: String = row.get("metadata_json");
    let progress: i64 = row.get("progress_percent");

    TrainingSession {
        id: row.get("id"),
        kind: parse_kind(&kind),
        status: parse_status(&status),
        progress_percent: progress.clamp(0, 100) as u8,
        current_step: row.get("current_step"),
        samples_collected: row.get::<i64, _>("samples_collected") as u64,
        total_samples: row.get::<i64, _>("total_samples") as u64,
        started_at: from_millis(row.get("started_at")),
        completed_at: row.get::<Option<i64>, _>("completed_at").map(from_millis),
        accuracy: row.get("accuracy"),
        error_message: row.get("error_message"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
    }
}

#[async_trait]
impl TrainingStore for SqliteStore {
    async fn upsert_design_pattern(&self, record: &DesignPatternRecord) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO design_patterns (business_type, source_url, html_content, css_content,
                                         color_palette_json, font_families_json, layout_json,
                                         semantic_json, performance_json, accessibility_score,
                                         design_score, mobile_responsive, confidence_score,
                                         status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(business_type, source_url) DO UPDATE SET
                html_content = excluded.html_content,
                css_content = excluded.css_content,
                color_palette_json = excluded.color_palette_json,
                font_families_json = excluded.font_families_json,
                layout_json = excluded.layout_json,
                semantic_json = excluded.semantic_json,
                performance_json = excluded.performance_json,
                accessibility_score = excluded.accessibility_score,
                design_score = excluded.design_score,
                mobile_responsive = excluded.mobile_responsive,
                confidence_score = excluded.confidence_score,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.business_type)
        .bind(&record.source_url)
        .bind(&record.html_content)
        .bind(&record.css_content)
        .bind(serde_json::to_string(&record.color_palette)?)
        .bind(serde_json::to_string(&record.font_families)?)
        .bind(serde_json::to_string(&record.layout)?)
        .bind(serde_json::to_string(&record.semantic)?)
        .bind(serde_json::to_string(&record.performance)?)
        .bind(record.accessibility_score as i64)
        .bind(record.design_score as i64)
        .bind(record.mobile_responsive as i64)
        .bind(record.confidence_score)
        .bind(record_status_str(record.status))
        .bind(ts_millis(record.created_at))
        .bind(ts_millis(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_design_pattern(
        &self,
        business_type: &str,
        source_url: &str,
    ) -> Result<Option<DesignPatternRecord>> {
        let row = sqlx::query(
            "SELECT * FROM design_patterns WHERE business_type = ? AND source_url = ?",
        )
        .bind(business_type)
        .bind(source_url)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let status: String = row.get("status");
        let palette_json: String = row.get("color_palette_json");
        let fonts_json: String = row.get("font_families_json");
        let layout_json: String = row.get("layout_json");
        let semantic_json: String = row.get("semantic_json");
        let performance_json: String = row.get("performance_json");

        Ok(Some(DesignPatternRecord {
            business_type: row.get("business_type"),
            source_url: row.get("source_url"),
            html_content: row.get("html_content"),
            css_content: row.get("css_content"),
            color_palette: serde_json::from_str(&palette_json).unwrap_or_default(),
            font_families: serde_json::from_str(&fonts_json).unwrap_or_default(),
            layout: serde_json::from_str(&layout_json).unwrap_or_default(),
            semantic: serde_json::from_str(&semantic_json).unwrap_or_default(),
            performance: serde_json::from_str(&performance_json).unwrap_or_default(),
            accessibility_score: row.get::<i64, _>("accessibility_score").clamp(0, 100) as u8,
            design_score: row.get::<i64, _>("design_score").clamp(0, 100) as u8,
            mobile_responsive: row.get::<i64, _>("mobile_responsive") != 0,
            confidence_score: row.get("confidence_score"),
            status: if status == "error" {
                RecordStatus::Error
            } else {
                RecordStatus::Active
            },
            created_at: from_millis(row.get("created_at")),
            updated_at: from_millis(row.get("updated_at")),
        }))
    }

    async fn patterns_needing_update(
        &self,
        business_type: &str,
        urls: &[String],
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT source_url, updated_at FROM design_patterns WHERE business_type = ?",
        )
        .bind(business_type)
        .fetch_all(&self.pool)
        .await?;

        let known: std::collections::HashMap<String, i64> = rows
            .iter()
            .map(|row| (row.get("source_url"), row.get("updated_at")))
            .collect();

        Ok(urls
            .iter()
            .filter(|url| {
                let last = known.get(*url).map(|ms| from_millis(*ms));
                freshness::needs_update(last, now, window)
            })
            .cloned()
            .collect())
    }

    async fn save_session(&self, session: &TrainingSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_sessions (id, kind, status, progress_percent, current_step,
                                           samples_collected, total_samples, started_at,
                                           completed_at, accuracy, error_message, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                progress_percent = excluded.progress_percent,
                current_step = excluded.current_step,
                samples_collected = excluded.samples_collected,
                total_samples = excluded.total_samples,
                completed_at = excluded.completed_at,
                accuracy = excluded.accuracy,
                error_message = excluded.error_message,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&session.id)
        .bind(kind_str(session.kind))
        .bind(status_str(session.status))
        .bind(session.progress_percent as i64)
        .bind(&session.current_step)
        .bind(session.samples_collected as i64)
        .bind(session.total_samples as i64)
        .bind(ts_millis(session.started_at))
        .bind(session.completed_at.map(ts_millis))
        .bind(session.accuracy)
        .bind(&session.error_message)
        .bind(serde_json::to_string(&session.metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Option<TrainingSession>> {
        let row = sqlx::query("SELECT * FROM training_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| session_from_row(&row)))
    }

    async fn latest_session(&self) -> Result<Option<TrainingSession>> {
        let row = sqlx::query("SELECT * FROM training_sessions ORDER BY started_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| session_from_row(&row)))
    }

    async fn save_sample(&self, sample: &TrainingSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_samples (sample_id, url, business_type, session_id, html_content,
                                          html_length, collection_method, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.sample_id)
        .bind(&sample.url)
        .bind(&sample.business_type)
        .bind(&sample.session_id)
        .bind(&sample.html_content)
        .bind(sample.html_length as i64)
        .bind(method_str(sample.collection_method))
        .bind(match sample.status {
            SampleStatus::Completed => "completed",
            SampleStatus::Failed => "failed",
        })
        .bind(ts_millis(sample.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_site_queue(&self, sites: &[CandidateSite]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = ts_millis(Utc::now());

        sqlx::query("DELETE FROM site_queue").execute(&mut *tx).await?;

        for site in sites {
            sqlx::query(
                "INSERT INTO site_queue (url, business_type, style, queued_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&site.url)
            .bind(&site.business_type)
            .bind(&site.style)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_site_queue(&self) -> Result<Vec<CandidateSite>> {
        let rows = sqlx::query("SELECT url, business_type, style FROM site_queue ORDER BY url")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| CandidateSite {
                url: row.get("url"),
                business_type: row.get("business_type"),
                style: row.get("style"),
                last_processed_at: None,
            })
            .collect())
    }
}
