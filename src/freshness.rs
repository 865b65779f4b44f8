//! Freshness policy for previously analyzed sites.
//!
//! A site becomes eligible for reprocessing once its record is older than a
//! rolling window (30 days by default). The same predicate is used by the
//! planner before scraping and by the store when computing which candidate
//! URLs still need work; two concurrent runs racing on the same key resolve
//! as last-writer-wins.

use chrono::{DateTime, Duration, Utc};

/// Default freshness window in days.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Whether a record with the given last-update timestamp needs reprocessing.
///
/// `None` (never processed) is always stale.
pub fn needs_update(
    last_updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    match last_updated_at {
        None => true,
        Some(last) => now - last > window,
    }
}

pub fn default_window() -> Duration {
    Duration::days(DEFAULT_WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_processed_is_always_stale() {
        assert!(needs_update(None, Utc::now(), default_window()));
    }

    #[test]
    fn within_window_is_fresh() {
        let now = Utc::now();
        assert!(!needs_update(Some(now - Duration::days(29)), now, default_window()));
        assert!(!needs_update(Some(now), now, default_window()));
    }

    #[test]
    fn beyond_window_is_stale() {
        let now = Utc::now();
        assert!(needs_update(Some(now - Duration::days(31)), now, default_window()));
        assert!(needs_update(
            Some(now - Duration::days(30) - Duration::seconds(1)),
            now,
            default_window()
        ));
    }

    #[test]
    fn exactly_at_boundary_is_fresh() {
        let now = Utc::now();
        // The window is exclusive: exactly 30 days old is still fresh.
        assert!(!needs_update(Some(now - Duration::days(30)), now, default_window()));
    }

    #[test]
    fn custom_window() {
        let now = Utc::now();
        let window = Duration::days(7);
        assert!(needs_update(Some(now - Duration::days(8)), now, window));
        assert!(!needs_update(Some(now - Duration::days(6)), now, window));
    }
}
