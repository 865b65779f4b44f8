//! Core data models used throughout Siteminer.
//!
//! These types represent the sessions, candidate sites, samples, and design
//! pattern records that flow through the collection and analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of training run: a global discovery run or a user-supplied site list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Global,
    Custom,
}

/// Lifecycle state of a training session.
///
/// Pending → Running → {Completed, Failed}. Terminal states are never
/// overwritten once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// One collection run. Persisted after every pipeline step so status polling
/// always sees the last known snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub progress_percent: u8,
    pub current_step: String,
    pub samples_collected: u64,
    pub total_samples: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Synthetic quality metric, None until completion.
    pub accuracy: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

impl TrainingSession {
    pub fn new(kind: SessionKind, total_samples: u64, metadata: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            status: SessionStatus::Running,
            progress_percent: 0,
            current_step: "starting".to_string(),
            samples_collected: 0,
            total_samples,
            started_at: Utc::now(),
            completed_at: None,
            accuracy: None,
            error_message: None,
            metadata,
        }
    }

    /// Advance progress. Progress is monotone within a session, so a lower
    /// value than the current one is ignored.
    pub fn advance_progress(&mut self, percent: u8) {
        let clamped = percent.min(100);
        if clamped > self.progress_percent {
            self.progress_percent = clamped;
        }
    }

    pub fn set_step(&mut self, step: &str, percent: u8) {
        self.current_step = step.to_string();
        self.advance_progress(percent);
    }
}

/// One competitor URL under consideration by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSite {
    pub url: String,
    pub business_type: String,
    #[serde(default)]
    pub style: Option<String>,
    /// None means the URL has never been processed.
    #[serde(default)]
    pub last_processed_at: Option<DateTime<Utc>>,
}

/// How a sample's markup was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMethod {
    Browser,
    Http,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Completed,
    Failed,
}

/// Raw collection artifact tied to exactly one session. Immutable once
/// written; the cross-session output lives in [`DesignPatternRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub sample_id: String,
    pub url: String,
    pub business_type: String,
    pub session_id: String,
    pub html_content: String,
    pub html_length: u64,
    pub collection_method: CollectionMethod,
    pub status: SampleStatus,
    pub created_at: DateTime<Utc>,
}

impl TrainingSample {
    pub fn new(
        session_id: &str,
        url: &str,
        business_type: &str,
        html: String,
        method: CollectionMethod,
        status: SampleStatus,
    ) -> Self {
        Self {
            sample_id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            business_type: business_type.to_string(),
            session_id: session_id.to_string(),
            html_length: html.len() as u64,
            html_content: html,
            collection_method: method,
            status,
            created_at: Utc::now(),
        }
    }
}

/// Structural layout flags derived from a page's markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutStructure {
    pub has_header: bool,
    pub has_nav: bool,
    pub has_footer: bool,
    pub uses_grid: bool,
    pub uses_flexbox: bool,
    pub section_count: u32,
}

/// Title, description, keywords, and heading histogram for a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    /// Counts for h1 through h6, in order.
    pub heading_counts: [u32; 6],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub load_time_ms: u64,
    pub content_size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Error,
}

/// The persisted output of analyzing one site.
///
/// Natural key is `(business_type, source_url)`; a second collection of the
/// same pair is an update, never a new row. A record with `status = Error`
/// still occupies the key (it counts as "already seen" for the freshness
/// gate) but carries empty analytic fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignPatternRecord {
    pub business_type: String,
    pub source_url: String,
    pub html_content: String,
    pub css_content: String,
    pub color_palette: Vec<String>,
    pub font_families: Vec<String>,
    pub layout: LayoutStructure,
    pub semantic: SemanticAnalysis,
    pub performance: PerformanceMetrics,
    pub accessibility_score: u8,
    pub design_score: u8,
    pub mobile_responsive: bool,
    pub confidence_score: f64,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DesignPatternRecord {
    /// Placeholder record written when a site's collection failed hard.
    /// Occupies the natural key so the freshness gate treats the site as
    /// seen, but carries no analytic content.
    pub fn error_marker(business_type: &str, source_url: &str) -> Self {
        let now = Utc::now();
        Self {
            business_type: business_type.to_string(),
            source_url: source_url.to_string(),
            html_content: String::new(),
            css_content: String::new(),
            color_palette: Vec::new(),
            font_families: Vec::new(),
            layout: LayoutStructure::default(),
            semantic: SemanticAnalysis::default(),
            performance: PerformanceMetrics::default(),
            accessibility_score: 0,
            design_score: 0,
            mobile_responsive: false,
            confidence_score: 0.0,
            status: RecordStatus::Error,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The storage backend chosen once at process startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Relational,
    Filesystem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotone() {
        let mut session = TrainingSession::new(SessionKind::Global, 5, serde_json::json!({}));
        session.advance_progress(40);
        session.advance_progress(20);
        assert_eq!(session.progress_percent, 40);
        session.advance_progress(120);
        assert_eq!(session.progress_percent, 100);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
    }

    #[test]
    fn error_marker_has_empty_analytics() {
        let record = DesignPatternRecord::error_marker("florist", "https://a.test");
        assert_eq!(record.status, RecordStatus::Error);
        assert!(record.color_palette.is_empty());
        assert!(record.font_families.is_empty());
        assert_eq!(record.design_score, 0);
    }
}
