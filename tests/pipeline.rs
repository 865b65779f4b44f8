//! End-to-end pipeline tests over the file-backed store, with stubbed
//! classifier and render collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use siteminer::classifier::{Classification, Classifier};
use siteminer::collector::{CollectError, Collector, RenderEngine, RenderedPage, Strategy};
use siteminer::config::{Config, TrainingConfig};
use siteminer::models::{
    CandidateSite, DesignPatternRecord, RecordStatus, SessionStatus, StorageBackend,
    TrainingSample, TrainingSession,
};
use siteminer::orchestrator::{StartError, TrainingRunner};
use siteminer::planner::Planner;
use siteminer::store::file::FileStore;
use siteminer::store::{select_backend, TrainingStore};

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta name="viewport" content="width=device-width">
  <title>Stubbed Page</title>
</head>
<body>
  <header><nav>menu</nav></header>
  <main><h1>Hello</h1><section><img alt="x"></section></main>
  <footer>end</footer>
</body>
</html>"#;

const STYLES: &str = "body { color: #333; background: #fff; font-family: Inter, serif; } \
                      nav { display: flex; } @media (max-width: 600px) { nav { display: block; } }";

struct StubClassifier(Classification);

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _name: &str, _description: &str) -> anyhow::Result<Classification> {
        Ok(self.0.clone())
    }
}

struct BrokenClassifier;

#[async_trait]
impl Classifier for BrokenClassifier {
    async fn classify(&self, _name: &str, _description: &str) -> anyhow::Result<Classification> {
        anyhow::bail!("upstream returned prose instead of JSON")
    }
}

struct PageRender;

#[async_trait]
impl RenderEngine for PageRender {
    async fn render(&self, _url: &str) -> Result<RenderedPage, CollectError> {
        Ok(RenderedPage {
            html: PAGE.to_string(),
            css: STYLES.to_string(),
        })
    }
}

struct SlowRender;

#[async_trait]
impl RenderEngine for SlowRender {
    async fn render(&self, _url: &str) -> Result<RenderedPage, CollectError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(CollectError::Fetch("unreachable".to_string()))
    }
}

struct FailRender;

#[async_trait]
impl RenderEngine for FailRender {
    async fn render(&self, _url: &str) -> Result<RenderedPage, CollectError> {
        Err(CollectError::Fetch("connection refused".to_string()))
    }
}

fn training_config() -> TrainingConfig {
    TrainingConfig {
        freshness_days: 30,
        workers: 1,
        step_delay_ms: 0,
        default_sample_count: 10,
        business_name: "Bloom & Stem".to_string(),
        business_description: "A neighborhood florist".to_string(),
    }
}

fn runner_with(
    store: Arc<dyn TrainingStore>,
    classifier: Arc<dyn Classifier>,
    render: Arc<dyn RenderEngine>,
    timeout_ms: u64,
) -> Arc<TrainingRunner> {
    let planner = Arc::new(Planner::new(
        classifier,
        Arc::clone(&store),
        chrono::Duration::days(30),
    ));
    let collector = Arc::new(
        Collector::new(
            Strategy::Browser,
            render,
            Duration::from_millis(timeout_ms),
            vec![],
        )
        .unwrap(),
    );
    Arc::new(TrainingRunner::new(
        store,
        planner,
        collector,
        training_config(),
    ))
}

fn file_store(tmp: &TempDir) -> Arc<dyn TrainingStore> {
    Arc::new(FileStore::open(tmp.path()).unwrap())
}

fn stub_classifier(urls: &[&str]) -> Arc<dyn Classifier> {
    Arc::new(StubClassifier(Classification {
        business_type: "florist".to_string(),
        competitor_urls: urls.iter().map(|u| u.to_string()).collect(),
    }))
}

fn site(url: &str) -> CandidateSite {
    CandidateSite {
        url: url.to_string(),
        business_type: "florist".to_string(),
        style: None,
        last_processed_at: None,
    }
}

async fn wait_for_terminal(runner: &Arc<TrainingRunner>, id: &str) -> TrainingSession {
    for _ in 0..500 {
        if let Some(session) = runner.status(Some(id)).await.unwrap() {
            if session.status.is_terminal() {
                return session;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {id} never reached a terminal state");
}

#[tokio::test]
async fn custom_run_collects_analyzes_and_persists() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        stub_classifier(&[]),
        Arc::new(PageRender),
        1_000,
    );

    let receipt = runner
        .start_custom(vec![site("https://a.test")])
        .await
        .unwrap();
    assert_eq!(receipt.sites_queued, 1);
    assert_eq!(receipt.sites_skipped, 0);

    let session = wait_for_terminal(&runner, &receipt.session_id).await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.samples_collected, 1);
    assert_eq!(session.progress_percent, 100);
    assert!((session.accuracy.unwrap() - 0.97).abs() < 1e-9);
    assert!(session.completed_at.is_some());

    let record = store
        .get_design_pattern("florist", "https://a.test")
        .await
        .unwrap()
        .expect("record persisted");
    assert_eq!(record.status, RecordStatus::Active);
    assert!(record.html_content.contains("Stubbed Page"));
    assert!(record.layout.has_header);
    assert!(record.mobile_responsive);
    assert!(!record.color_palette.is_empty());
}

#[tokio::test]
async fn repeat_run_within_window_skips_fresh_sites() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        stub_classifier(&[]),
        Arc::new(PageRender),
        1_000,
    );

    let first = runner
        .start_custom(vec![site("https://a.test")])
        .await
        .unwrap();
    wait_for_terminal(&runner, &first.session_id).await;

    let second = runner
        .start_custom(vec![site("https://a.test")])
        .await
        .unwrap();
    assert_eq!(second.sites_queued, 0);
    assert_eq!(second.sites_skipped, 1);

    let session = wait_for_terminal(&runner, &second.session_id).await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.samples_collected, 0);
    assert_eq!(session.total_samples, 0);

    // No second sample artifact was written for the fresh site.
    let sample_dirs = std::fs::read_dir(tmp.path().join("samples")).unwrap().count();
    assert_eq!(sample_dirs, 1);
}

#[tokio::test]
async fn timeout_degrades_to_synthetic_and_completes() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        stub_classifier(&[]),
        Arc::new(SlowRender),
        50,
    );

    let receipt = runner
        .start_custom(vec![site("https://slow.test")])
        .await
        .unwrap();
    let session = wait_for_terminal(&runner, &receipt.session_id).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.samples_collected, 1);

    let record = store
        .get_design_pattern("florist", "https://slow.test")
        .await
        .unwrap()
        .expect("synthetic record persisted");
    assert_eq!(record.status, RecordStatus::Active);
    assert!(record.html_content.contains("florist"));
}

#[tokio::test]
async fn hard_failure_writes_error_marker_and_session_completes() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        stub_classifier(&[]),
        Arc::new(FailRender),
        1_000,
    );

    let receipt = runner
        .start_custom(vec![site("https://down.test")])
        .await
        .unwrap();
    let session = wait_for_terminal(&runner, &receipt.session_id).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.samples_collected, 0);

    let record = store
        .get_design_pattern("florist", "https://down.test")
        .await
        .unwrap()
        .expect("error marker persisted");
    assert_eq!(record.status, RecordStatus::Error);
    assert!(record.html_content.is_empty());

    // The marker occupies the natural key, so a follow-up run skips it.
    let followup = runner
        .start_custom(vec![site("https://down.test")])
        .await
        .unwrap();
    assert_eq!(followup.sites_queued, 0);
    assert_eq!(followup.sites_skipped, 1);
    wait_for_terminal(&runner, &followup.session_id).await;
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        stub_classifier(&[]),
        Arc::new(SlowRender),
        200,
    );

    let first = runner
        .start_custom(vec![site("https://a.test")])
        .await
        .unwrap();
    let err = runner
        .start_custom(vec![site("https://b.test")])
        .await
        .unwrap_err();
    assert!(matches!(err, StartError::AlreadyRunning));

    // The guard is released once the first run reaches a terminal state.
    wait_for_terminal(&runner, &first.session_id).await;
    let third = runner.start_custom(vec![site("https://c.test")]).await;
    assert!(third.is_ok());
    wait_for_terminal(&runner, &third.unwrap().session_id).await;
}

#[tokio::test]
async fn global_run_resolves_candidates_via_classifier() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        stub_classifier(&["https://a.test", "https://b.test"]),
        Arc::new(PageRender),
        1_000,
    );

    let receipt = runner.start_global(Some(5)).await.unwrap();
    let session = wait_for_terminal(&runner, &receipt.session_id).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.samples_collected, 2);
    assert_eq!(session.total_samples, 2);
    for url in ["https://a.test", "https://b.test"] {
        assert!(store
            .get_design_pattern("florist", url)
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn global_run_with_broken_classifier_completes_empty() {
    let tmp = TempDir::new().unwrap();
    let store = file_store(&tmp);
    let runner = runner_with(
        Arc::clone(&store),
        Arc::new(BrokenClassifier),
        Arc::new(PageRender),
        1_000,
    );

    let receipt = runner.start_global(None).await.unwrap();
    let session = wait_for_terminal(&runner, &receipt.session_id).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.samples_collected, 0);
    assert_eq!(session.total_samples, 0);
    assert!(session.accuracy.is_some());
}

/// Store wrapper that records every persisted progress value.
struct RecordingStore {
    inner: Arc<dyn TrainingStore>,
    progress: Mutex<Vec<u8>>,
}

#[async_trait]
impl TrainingStore for RecordingStore {
    async fn upsert_design_pattern(&self, record: &DesignPatternRecord) -> anyhow::Result<()> {
        self.inner.upsert_design_pattern(record).await
    }

    async fn get_design_pattern(
        &self,
        business_type: &str,
        source_url: &str,
    ) -> anyhow::Result<Option<DesignPatternRecord>> {
        self.inner.get_design_pattern(business_type, source_url).await
    }

    async fn patterns_needing_update(
        &self,
        business_type: &str,
        urls: &[String],
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> anyhow::Result<Vec<String>> {
        self.inner
            .patterns_needing_update(business_type, urls, now, window)
            .await
    }

    async fn save_session(&self, session: &TrainingSession) -> anyhow::Result<()> {
        self.progress.lock().unwrap().push(session.progress_percent);
        self.inner.save_session(session).await
    }

    async fn load_session(&self, id: &str) -> anyhow::Result<Option<TrainingSession>> {
        self.inner.load_session(id).await
    }

    async fn latest_session(&self) -> anyhow::Result<Option<TrainingSession>> {
        self.inner.latest_session().await
    }

    async fn save_sample(&self, sample: &TrainingSample) -> anyhow::Result<()> {
        self.inner.save_sample(sample).await
    }

    async fn save_site_queue(&self, sites: &[CandidateSite]) -> anyhow::Result<()> {
        self.inner.save_site_queue(sites).await
    }

    async fn load_site_queue(&self) -> anyhow::Result<Vec<CandidateSite>> {
        self.inner.load_site_queue().await
    }
}

#[tokio::test]
async fn progress_is_monotone_and_ends_at_100() {
    let tmp = TempDir::new().unwrap();
    let recording = Arc::new(RecordingStore {
        inner: file_store(&tmp),
        progress: Mutex::new(Vec::new()),
    });
    let runner = runner_with(
        Arc::clone(&recording) as Arc<dyn TrainingStore>,
        stub_classifier(&[]),
        Arc::new(PageRender),
        1_000,
    );

    let receipt = runner
        .start_custom(vec![
            site("https://a.test"),
            site("https://b.test"),
            site("https://c.test"),
        ])
        .await
        .unwrap();
    wait_for_terminal(&runner, &receipt.session_id).await;

    let progress = recording.progress.lock().unwrap().clone();
    assert!(!progress.is_empty());
    assert!(
        progress.windows(2).all(|pair| pair[0] <= pair[1]),
        "progress regressed: {progress:?}"
    );
    assert_eq!(*progress.last().unwrap(), 100);
}

/// Store wrapper that accepts the first session write, then loses every
/// subsequent one. Reads and other writes pass through.
struct OutageStore {
    inner: Arc<dyn TrainingStore>,
    session_saves: AtomicUsize,
}

#[async_trait]
impl TrainingStore for OutageStore {
    async fn upsert_design_pattern(&self, record: &DesignPatternRecord) -> anyhow::Result<()> {
        self.inner.upsert_design_pattern(record).await
    }

    async fn get_design_pattern(
        &self,
        business_type: &str,
        source_url: &str,
    ) -> anyhow::Result<Option<DesignPatternRecord>> {
        self.inner.get_design_pattern(business_type, source_url).await
    }

    async fn patterns_needing_update(
        &self,
        business_type: &str,
        urls: &[String],
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> anyhow::Result<Vec<String>> {
        self.inner
            .patterns_needing_update(business_type, urls, now, window)
            .await
    }

    async fn save_session(&self, session: &TrainingSession) -> anyhow::Result<()> {
        if self.session_saves.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.save_session(session).await
        } else {
            anyhow::bail!("storage unreachable")
        }
    }

    async fn load_session(&self, id: &str) -> anyhow::Result<Option<TrainingSession>> {
        self.inner.load_session(id).await
    }

    async fn latest_session(&self) -> anyhow::Result<Option<TrainingSession>> {
        self.inner.latest_session().await
    }

    async fn save_sample(&self, sample: &TrainingSample) -> anyhow::Result<()> {
        self.inner.save_sample(sample).await
    }

    async fn save_site_queue(&self, sites: &[CandidateSite]) -> anyhow::Result<()> {
        self.inner.save_site_queue(sites).await
    }

    async fn load_site_queue(&self) -> anyhow::Result<Vec<CandidateSite>> {
        self.inner.load_site_queue().await
    }
}

#[tokio::test]
async fn storage_outage_mid_run_fails_the_session() {
    let tmp = TempDir::new().unwrap();
    let outage = Arc::new(OutageStore {
        inner: file_store(&tmp),
        session_saves: AtomicUsize::new(0),
    });
    let runner = runner_with(
        Arc::clone(&outage) as Arc<dyn TrainingStore>,
        stub_classifier(&[]),
        Arc::new(PageRender),
        1_000,
    );

    let receipt = runner
        .start_custom(vec![site("https://a.test")])
        .await
        .unwrap();
    let session = wait_for_terminal(&runner, &receipt.session_id).await;

    // The terminal write was lost, so the session is reported failed with
    // the cause captured, not left running forever.
    assert_eq!(session.status, SessionStatus::Failed);
    let message = session.error_message.expect("failure cause recorded");
    assert!(message.contains("storage"), "unexpected message: {message}");

    // The store still holds the stale running snapshot; polling answers
    // from the last known state instead.
    let stored = outage
        .inner
        .load_session(&receipt.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SessionStatus::Running);

    // The id-less lookup answers from the same snapshot.
    let latest = runner.status(None).await.unwrap().unwrap();
    assert_eq!(latest.id, receipt.session_id);
    assert_eq!(latest.status, SessionStatus::Failed);
}

#[tokio::test]
async fn missing_schema_fails_over_to_file_store() {
    let tmp = TempDir::new().unwrap();
    // A database file with no schema: connectivity succeeds, the table
    // probe does not.
    let config = Config::minimal(tmp.path());

    let (backend, store) = select_backend(&config).await.unwrap();
    assert_eq!(backend, StorageBackend::Filesystem);

    let record = DesignPatternRecord::error_marker("florist", "https://a.test");
    store.upsert_design_pattern(&record).await.unwrap();
    assert!(store
        .get_design_pattern("florist", "https://a.test")
        .await
        .unwrap()
        .is_some());
}
