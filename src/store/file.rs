//! File-backed [`TrainingStore`] implementation.
//!
//! The permanent fallback when the relational probe fails at startup.
//! Layout under the data directory:
//!
//! ```text
//! data/
//!   sessions/<session-id>.json      one document per session snapshot
//!   patterns/<key-digest>.json      one document per design pattern record
//!   samples/<sample-id>/
//!     metadata.json                 sample fields minus the raw markup
//!     page.html                     raw collected markup
//!   site_queue.json                 the custom-site queue
//! ```
//!
//! Pattern documents are keyed by a digest of the natural key so the same
//! `(business_type, source_url)` pair always maps to the same file —
//! upsert-by-overwrite.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::freshness;
use crate::models::{CandidateSite, DesignPatternRecord, TrainingSample, TrainingSession};

use super::TrainingStore;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: &Path) -> Result<Self> {
        for sub in ["sessions", "patterns", "samples"] {
            fs::create_dir_all(root.join(sub))
                .with_context(|| format!("Failed to create {} directory", sub))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn pattern_path(&self, business_type: &str, source_url: &str) -> PathBuf {
        self.root
            .join("patterns")
            .join(format!("{}.json", key_digest(business_type, source_url)))
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.root.join("sessions").join(format!("{}.json", id))
    }

    fn read_pattern(&self, path: &Path) -> Result<Option<DesignPatternRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Stable digest of the natural key, used as the pattern document name.
fn key_digest(business_type: &str, source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(business_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(source_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl TrainingStore for FileStore {
    async fn upsert_design_pattern(&self, record: &DesignPatternRecord) -> Result<()> {
        let path = self.pattern_path(&record.business_type, &record.source_url);

        // Preserve the original created_at on re-collection.
        let created_at = self
            .read_pattern(&path)?
            .map(|existing| existing.created_at)
            .unwrap_or(record.created_at);

        let mut stored = record.clone();
        stored.created_at = created_at;
        stored.updated_at = Utc::now();

        write_json(&path, &stored)
    }

    async fn get_design_pattern(
        &self,
        business_type: &str,
        source_url: &str,
    ) -> Result<Option<DesignPatternRecord>> {
        self.read_pattern(&self.pattern_path(business_type, source_url))
    }

    async fn patterns_needing_update(
        &self,
        business_type: &str,
        urls: &[String],
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<String>> {
        let mut needing = Vec::new();
        for url in urls {
            let last = self
                .read_pattern(&self.pattern_path(business_type, url))?
                .map(|record| record.updated_at);
            if freshness::needs_update(last, now, window) {
                needing.push(url.clone());
            }
        }
        Ok(needing)
    }

    async fn save_session(&self, session: &TrainingSession) -> Result<()> {
        write_json(&self.session_path(&session.id), session)
    }

    async fn load_session(&self, id: &str) -> Result<Option<TrainingSession>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn latest_session(&self) -> Result<Option<TrainingSession>> {
        let mut latest: Option<TrainingSession> = None;
        for entry in fs::read_dir(self.root.join("sessions"))? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(entry.path())?;
            let session: TrainingSession = match serde_json::from_str(&content) {
                Ok(session) => session,
                Err(_) => continue,
            };
            if latest
                .as_ref()
                .map(|current| session.started_at > current.started_at)
                .unwrap_or(true)
            {
                latest = Some(session);
            }
        }
        Ok(latest)
    }

    async fn save_sample(&self, sample: &TrainingSample) -> Result<()> {
        let dir = self.root.join("samples").join(&sample.sample_id);
        fs::create_dir_all(&dir)?;

        // Raw markup is split out of the metadata document; large payloads
        // stay readable and greppable on disk.
        let mut metadata = serde_json::to_value(sample)?;
        if let Some(map) = metadata.as_object_mut() {
            map.remove("html_content");
        }

        write_json(&dir.join("metadata.json"), &metadata)?;
        fs::write(dir.join("page.html"), &sample.html_content)?;
        Ok(())
    }

    async fn save_site_queue(&self, sites: &[CandidateSite]) -> Result<()> {
        write_json(&self.root.join("site_queue.json"), &sites.to_vec())
    }

    async fn load_site_queue(&self) -> Result<Vec<CandidateSite>> {
        let path = self.root.join("site_queue.json");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionMethod, RecordStatus, SampleStatus, SessionKind};
    use tempfile::TempDir;

    fn make_record(business_type: &str, url: &str) -> DesignPatternRecord {
        let mut record = DesignPatternRecord::error_marker(business_type, url);
        record.status = RecordStatus::Active;
        record.html_content = "<html></html>".to_string();
        record.color_palette = vec!["#112233".to_string()];
        record
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_natural_key() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let record = make_record("florist", "https://a.test");

        store.upsert_design_pattern(&record).await.unwrap();
        let first = store
            .get_design_pattern("florist", "https://a.test")
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.upsert_design_pattern(&record).await.unwrap();
        let second = store
            .get_design_pattern("florist", "https://a.test")
            .await
            .unwrap()
            .unwrap();

        // One document, created_at preserved, updated_at advanced.
        let count = fs::read_dir(dir.path().join("patterns")).unwrap().count();
        assert_eq!(count, 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn needing_update_respects_freshness() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .upsert_design_pattern(&make_record("florist", "https://fresh.test"))
            .await
            .unwrap();

        let urls = vec![
            "https://fresh.test".to_string(),
            "https://unseen.test".to_string(),
        ];
        let needing = store
            .patterns_needing_update("florist", &urls, Utc::now(), Duration::days(30))
            .await
            .unwrap();
        assert_eq!(needing, vec!["https://unseen.test".to_string()]);

        // With time rolled past the window, the fresh one is stale too.
        let future = Utc::now() + Duration::days(31);
        let needing = store
            .patterns_needing_update("florist", &urls, future, Duration::days(30))
            .await
            .unwrap();
        assert_eq!(needing.len(), 2);
    }

    #[tokio::test]
    async fn pattern_keys_are_scoped_by_business_type() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .upsert_design_pattern(&make_record("florist", "https://a.test"))
            .await
            .unwrap();
        store
            .upsert_design_pattern(&make_record("bakery", "https://a.test"))
            .await
            .unwrap();

        let count = fs::read_dir(dir.path().join("patterns")).unwrap().count();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn sample_directory_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let sample = TrainingSample::new(
            "session-1",
            "https://a.test",
            "florist",
            "<html>flowers</html>".to_string(),
            CollectionMethod::Http,
            SampleStatus::Completed,
        );
        store.save_sample(&sample).await.unwrap();

        let sample_dir = dir.path().join("samples").join(&sample.sample_id);
        let metadata = fs::read_to_string(sample_dir.join("metadata.json")).unwrap();
        let html = fs::read_to_string(sample_dir.join("page.html")).unwrap();
        assert!(metadata.contains("\"collection_method\""));
        assert!(!metadata.contains("flowers"), "markup must not leak into metadata");
        assert_eq!(html, "<html>flowers</html>");
    }

    #[tokio::test]
    async fn session_roundtrip_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut older =
            crate::models::TrainingSession::new(SessionKind::Global, 3, serde_json::json!({}));
        older.started_at = Utc::now() - Duration::hours(1);
        let newer =
            crate::models::TrainingSession::new(SessionKind::Custom, 1, serde_json::json!({}));

        store.save_session(&older).await.unwrap();
        store.save_session(&newer).await.unwrap();

        let loaded = store.load_session(&older.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_samples, 3);

        let latest = store.latest_session().await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
    }

    #[tokio::test]
    async fn site_queue_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load_site_queue().await.unwrap().is_empty());

        let sites = vec![CandidateSite {
            url: "https://a.test".to_string(),
            business_type: "florist".to_string(),
            style: Some("minimal".to_string()),
            last_processed_at: None,
        }];
        store.save_site_queue(&sites).await.unwrap();
        let loaded = store.load_site_queue().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url, "https://a.test");
    }
}
