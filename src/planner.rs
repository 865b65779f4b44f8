//! Candidate planning: resolve a business description into competitor URLs
//! and filter out sites that are still fresh.
//!
//! Classifier failures degrade to an empty candidate list: a run with no
//! candidates completes normally with zero samples, it does not fail.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::warn;

use crate::classifier::Classifier;
use crate::models::CandidateSite;
use crate::store::TrainingStore;

pub struct Planner {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn TrainingStore>,
    window: Duration,
}

/// Outcome of the freshness filter: what will be processed and how many
/// candidates were dropped as already fresh.
#[derive(Debug)]
pub struct FilterOutcome {
    pub queued: Vec<CandidateSite>,
    pub skipped: usize,
}

impl Planner {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn TrainingStore>,
        window: Duration,
    ) -> Self {
        Self {
            classifier,
            store,
            window,
        }
    }

    /// Resolve a business description into a typed candidate list.
    ///
    /// On any classifier failure (network, malformed output) this returns
    /// the trimmed business name as the type and no candidates — callers
    /// treat "no candidates" as a valid early-completion outcome.
    pub async fn resolve(&self, business_name: &str, description: &str) -> (String, Vec<CandidateSite>) {
        match self.classifier.classify(business_name, description).await {
            Ok(classification) => {
                let candidates = classification
                    .competitor_urls
                    .iter()
                    .map(|url| CandidateSite {
                        url: url.clone(),
                        business_type: classification.business_type.clone(),
                        style: None,
                        last_processed_at: None,
                    })
                    .collect();
                (classification.business_type, candidates)
            }
            Err(e) => {
                warn!("classifier degraded to empty candidate list: {e:#}");
                (business_name.trim().to_lowercase(), Vec::new())
            }
        }
    }

    /// Deduplicate candidates by `(business_type, url)` and drop those the
    /// store already holds fresh records for. Known-fresh URLs are skipped
    /// without any network access.
    pub async fn filter_stale(&self, candidates: Vec<CandidateSite>) -> Result<FilterOutcome> {
        let mut seen = std::collections::HashSet::new();
        let mut deduped: Vec<CandidateSite> = Vec::new();
        for site in candidates {
            if seen.insert((site.business_type.clone(), site.url.clone())) {
                deduped.push(site);
            }
        }

        // Group by business type so one store query covers each group.
        let mut by_type: HashMap<String, Vec<String>> = HashMap::new();
        for site in &deduped {
            by_type
                .entry(site.business_type.clone())
                .or_default()
                .push(site.url.clone());
        }

        let now = Utc::now();
        let mut stale: std::collections::HashSet<(String, String)> =
            std::collections::HashSet::new();
        for (business_type, urls) in by_type {
            let needing = self
                .store
                .patterns_needing_update(&business_type, &urls, now, self.window)
                .await?;
            for url in needing {
                stale.insert((business_type.clone(), url));
            }
        }

        let total = deduped.len();
        let queued: Vec<CandidateSite> = deduped
            .into_iter()
            .filter(|site| stale.contains(&(site.business_type.clone(), site.url.clone())))
            .collect();
        let skipped = total - queued.len();

        Ok(FilterOutcome { queued, skipped })
    }
}
