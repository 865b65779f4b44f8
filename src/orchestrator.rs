//! The training pipeline orchestrator.
//!
//! At most one session runs per process. A start request claims the
//! single-flight guard, persists the initial session snapshot, detaches the
//! pipeline onto a background task, and returns immediately; polling reads
//! the persisted snapshots.
//!
//! Per-site failures never fail the session: a hard collection error writes
//! a failed sample and an error-marker record, and the run moves on. Only
//! errors that escape the per-site loop (storage loss, planner storage
//! errors) mark the session `Failed`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::analyzer;
use crate::collector::{Collected, Collector};
use crate::config::TrainingConfig;
use crate::models::{
    CandidateSite, DesignPatternRecord, PerformanceMetrics, RecordStatus, SampleStatus,
    SessionKind, SessionStatus, TrainingSample, TrainingSession,
};
use crate::planner::Planner;
use crate::store::TrainingStore;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a training session is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What a successful start request reports back. For global runs the
/// candidate list is resolved inside the detached pipeline, so the queue
/// counts are only known for custom runs.
#[derive(Debug, Clone)]
pub struct StartReceipt {
    pub session_id: String,
    pub sites_queued: usize,
    pub sites_skipped: usize,
}

pub struct TrainingRunner {
    store: Arc<dyn TrainingStore>,
    planner: Arc<Planner>,
    collector: Arc<Collector>,
    training: TrainingConfig,
    running: Arc<AtomicBool>,
    /// Last known snapshot of the most recent session. Updated before every
    /// store write, so status polling still answers when the backend is
    /// unreachable mid-run.
    current_session: RwLock<Option<TrainingSession>>,
}

/// Holds the single-flight guard for the lifetime of one run. Dropping it
/// releases the guard, on every exit path of the pipeline task.
struct RunToken {
    flag: Arc<AtomicBool>,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl TrainingRunner {
    pub fn new(
        store: Arc<dyn TrainingStore>,
        planner: Arc<Planner>,
        collector: Arc<Collector>,
        training: TrainingConfig,
    ) -> Self {
        Self {
            store,
            planner,
            collector,
            training,
            running: Arc::new(AtomicBool::new(false)),
            current_session: RwLock::new(None),
        }
    }

    fn claim(&self) -> Result<RunToken, StartError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| StartError::AlreadyRunning)?;
        Ok(RunToken {
            flag: Arc::clone(&self.running),
        })
    }

    /// Start a global discovery run. The classifier is consulted inside the
    /// detached pipeline so its latency never blocks the start request.
    pub async fn start_global(
        self: &Arc<Self>,
        sample_count: Option<u64>,
    ) -> Result<StartReceipt, StartError> {
        let token = self.claim()?;

        let total = sample_count.unwrap_or(self.training.default_sample_count);
        let session = TrainingSession::new(
            SessionKind::Global,
            total,
            serde_json::json!({ "business_name": self.training.business_name }),
        );
        self.store.save_session(&session).await?;
        *self.current_session.write().await = Some(session.clone());

        let runner = Arc::clone(self);
        let session_id = session.id.clone();
        tokio::spawn(async move {
            let _token = token;
            runner.run_global(session).await;
        });

        Ok(StartReceipt {
            session_id,
            sites_queued: 0,
            sites_skipped: 0,
        })
    }

    /// Start a run over a user-supplied site list. The freshness filter is
    /// applied up front so the receipt can report what was actually queued.
    pub async fn start_custom(
        self: &Arc<Self>,
        sites: Vec<CandidateSite>,
    ) -> Result<StartReceipt, StartError> {
        let token = self.claim()?;

        let outcome = self.planner.filter_stale(sites).await?;
        let queued = outcome.queued;
        let skipped = outcome.skipped;
        if let Err(e) = self.store.save_site_queue(&queued).await {
            warn!("failed to persist site queue: {e:#}");
        }

        let session = TrainingSession::new(
            SessionKind::Custom,
            queued.len() as u64,
            serde_json::json!({ "sites_skipped": skipped }),
        );
        self.store.save_session(&session).await?;
        *self.current_session.write().await = Some(session.clone());

        let runner = Arc::clone(self);
        let receipt = StartReceipt {
            session_id: session.id.clone(),
            sites_queued: queued.len(),
            sites_skipped: skipped,
        };
        tokio::spawn(async move {
            let _token = token;
            runner.run_sites(session, queued).await;
        });

        Ok(receipt)
    }

    /// Snapshot of a session by id, or the most recently started one.
    ///
    /// The in-memory snapshot of the most recent session is preferred over
    /// the store: it is never behind, and it stays answerable when the
    /// backend is unreachable. Older sessions come from the store.
    pub async fn status(&self, id: Option<&str>) -> anyhow::Result<Option<TrainingSession>> {
        let current = self.current_session.read().await.clone();
        match id {
            Some(id) => {
                if let Some(session) = current.filter(|s| s.id == id) {
                    return Ok(Some(session));
                }
                self.store.load_session(id).await
            }
            None => match current {
                Some(session) => Ok(Some(session)),
                None => self.store.latest_session().await,
            },
        }
    }

    async fn run_global(self: Arc<Self>, mut session: TrainingSession) {
        session.set_step("validating-sites", 10);
        self.checkpoint_progress(&session).await;

        let (business_type, candidates) = self
            .planner
            .resolve(
                &self.training.business_name,
                &self.training.business_description,
            )
            .await;
        info!(
            business_type = %business_type,
            candidates = candidates.len(),
            "resolved global candidate list"
        );

        let capped: Vec<CandidateSite> = candidates
            .into_iter()
            .take(session.total_samples as usize)
            .collect();
        match self.planner.filter_stale(capped).await {
            Ok(outcome) => {
                session.total_samples = outcome.queued.len() as u64;
                self.run_sites(session, outcome.queued).await;
            }
            Err(e) => {
                error!("candidate filtering failed: {e:#}");
                self.finish_failed(session, &format!("candidate filtering failed: {e:#}"))
                    .await;
            }
        }
    }

    async fn run_sites(self: Arc<Self>, mut session: TrainingSession, sites: Vec<CandidateSite>) {
        session.set_step("collecting-html", 20);
        self.checkpoint_progress(&session).await;
        self.pace().await;

        let total = sites.len();
        let queue: Arc<Mutex<VecDeque<CandidateSite>>> = Arc::new(Mutex::new(sites.into()));
        let shared = Arc::new(Mutex::new(session));

        let workers = self.training.workers.max(1).min(total.max(1));
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let runner = Arc::clone(&self);
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                loop {
                    let site = { queue.lock().await.pop_front() };
                    let Some(site) = site else { break };
                    runner.process_site(&shared, &site, total).await;
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("collection worker panicked: {e}");
            }
        }

        let mut session = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        };

        // Analysis and persistence happen per-site inside the collection
        // loop; the named steps pace the reported phases for pollers.
        session.set_step("analyzing", 88);
        self.checkpoint_progress(&session).await;
        self.pace().await;

        session.set_step("persisting", 92);
        self.checkpoint_progress(&session).await;
        self.pace().await;

        session.set_step("finalizing", 95);
        self.checkpoint_progress(&session).await;
        self.pace().await;

        let ratio = if session.total_samples == 0 {
            1.0
        } else {
            session.samples_collected as f64 / session.total_samples as f64
        };
        session.accuracy = Some(0.72 + 0.25 * ratio);
        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());
        session.set_step("completed", 100);
        // The terminal write is the one persistence failure that escalates:
        // a session whose outcome cannot be recorded is a failed session.
        if let Err(e) = self.checkpoint(&session).await {
            error!("failed to persist terminal state for {}: {e:#}", session.id);
            self.finish_failed(
                session,
                &format!("storage unreachable at completion: {e:#}"),
            )
            .await;
            return;
        }
        info!(
            session = %session.id,
            collected = session.samples_collected,
            total = session.total_samples,
            "training session completed"
        );
    }

    /// Collect, analyze, and persist one site. Failures here are recorded
    /// and swallowed; they never abort the session.
    async fn process_site(
        &self,
        shared: &Arc<Mutex<TrainingSession>>,
        site: &CandidateSite,
        total: usize,
    ) {
        let session_id = { shared.lock().await.id.clone() };

        match self.collector.collect(site).await {
            Ok(collected) => {
                let record = self.build_record(site, &collected);
                let sample = TrainingSample::new(
                    &session_id,
                    &site.url,
                    &site.business_type,
                    collected.html,
                    collected.method,
                    SampleStatus::Completed,
                );
                if let Err(e) = self.store.save_sample(&sample).await {
                    warn!("failed to save sample for {}: {e:#}", site.url);
                }
                if let Err(e) = self.store.upsert_design_pattern(&record).await {
                    warn!("failed to upsert pattern for {}: {e:#}", site.url);
                }

                let mut session = shared.lock().await;
                session.samples_collected += 1;
                let done = session.samples_collected;
                session.advance_progress(site_progress(done, total));
                let snapshot = session.clone();
                drop(session);
                self.checkpoint_progress(&snapshot).await;
            }
            Err(e) => {
                warn!("collection of {} failed hard: {e}", site.url);
                let sample = TrainingSample::new(
                    &session_id,
                    &site.url,
                    &site.business_type,
                    String::new(),
                    crate::models::CollectionMethod::Http,
                    SampleStatus::Failed,
                );
                if let Err(e) = self.store.save_sample(&sample).await {
                    warn!("failed to save failed sample for {}: {e:#}", site.url);
                }
                let marker = DesignPatternRecord::error_marker(&site.business_type, &site.url);
                if let Err(e) = self.store.upsert_design_pattern(&marker).await {
                    warn!("failed to record error marker for {}: {e:#}", site.url);
                }
            }
        }
        self.pace().await;
    }

    fn build_record(&self, site: &CandidateSite, collected: &Collected) -> DesignPatternRecord {
        let performance = PerformanceMetrics {
            load_time_ms: collected.load_time_ms,
            content_size_bytes: collected.html.len() as u64,
        };
        let analysis = analyzer::analyze(&collected.html, &collected.css, &performance);
        let now = Utc::now();
        DesignPatternRecord {
            business_type: site.business_type.clone(),
            source_url: site.url.clone(),
            html_content: collected.html.clone(),
            css_content: collected.css.clone(),
            color_palette: analysis.color_palette,
            font_families: analysis.font_families,
            layout: analysis.layout,
            semantic: analysis.semantic,
            performance,
            accessibility_score: analysis.accessibility_score,
            design_score: analysis.design_score,
            mobile_responsive: analysis.mobile_responsive,
            confidence_score: analysis.confidence_score,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    async fn finish_failed(&self, mut session: TrainingSession, message: &str) {
        session.status = SessionStatus::Failed;
        session.error_message = Some(message.to_string());
        session.completed_at = Some(Utc::now());
        // The failed state always lands in the in-memory snapshot, so
        // polling sees it even when the store write below is lost too.
        if let Err(e) = self.checkpoint(&session).await {
            error!("failed to persist failed state for {}: {e:#}", session.id);
        }
    }

    /// Record a session snapshot in memory, then persist it.
    ///
    /// The in-memory copy is updated unconditionally so polling always sees
    /// the latest state. Callers decide what a store failure means: progress
    /// checkpoints log and continue, the terminal write escalates.
    async fn checkpoint(&self, session: &TrainingSession) -> anyhow::Result<()> {
        *self.current_session.write().await = Some(session.clone());
        self.store.save_session(session).await
    }

    async fn checkpoint_progress(&self, session: &TrainingSession) {
        if let Err(e) = self.checkpoint(session).await {
            warn!("failed to checkpoint session {}: {e:#}", session.id);
        }
    }

    async fn pace(&self) {
        if self.training.step_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.training.step_delay_ms))
                .await;
        }
    }
}

/// Map per-site completion onto the 20..=85 band of the progress bar.
fn site_progress(done: u64, total: usize) -> u8 {
    if total == 0 {
        return 85;
    }
    let band = 65.0 * done as f64 / total as f64;
    (20.0 + band).min(85.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_progress_spans_the_collection_band() {
        assert_eq!(site_progress(0, 4), 20);
        assert_eq!(site_progress(2, 4), 52);
        assert_eq!(site_progress(4, 4), 85);
        assert_eq!(site_progress(0, 0), 85);
    }
}
