mod types;

pub use types::{AttemptMetrics, SubmissionMetrics};

use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_RECENT_SUBMISSIONS: usize = 20;

/// Per-attempt submission counters; cleared when an attempt is reset.
pub struct MetricsCollector {
    inner: Arc<Mutex<AttemptMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AttemptMetrics::default())),
        }
    }

    pub async fn record_submission(&self, metrics: SubmissionMetrics) {
        let mut state = self.inner.lock().await;

        state.frames_submitted += 1;
        if metrics.failed {
            state.frames_failed += 1;
        }
        if metrics.discarded {
            state.frames_discarded += 1;
        }
        state.last_round_trip_ms = Some(metrics.round_trip_ms);

        state.recent_submissions.push(metrics);
        if state.recent_submissions.len() > MAX_RECENT_SUBMISSIONS {
            state.recent_submissions.remove(0);
        }
    }

    pub async fn record_poll(&self) {
        self.inner.lock().await.polls += 1;
    }

    pub async fn get_snapshot(&self) -> AttemptMetrics {
        self.inner.lock().await.clone()
    }

    pub async fn reset(&self) {
        *self.inner.lock().await = AttemptMetrics::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn submission(failed: bool) -> SubmissionMetrics {
        SubmissionMetrics {
            timestamp: Utc::now(),
            frame_bytes: 1024,
            round_trip_ms: 42,
            failed,
            discarded: false,
        }
    }

    #[tokio::test]
    async fn keeps_a_bounded_window_of_submissions() {
        let metrics = MetricsCollector::new();
        for i in 0..25 {
            metrics.record_submission(submission(i % 5 == 0)).await;
        }
        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.frames_submitted, 25);
        assert_eq!(snapshot.frames_failed, 5);
        assert_eq!(snapshot.recent_submissions.len(), MAX_RECENT_SUBMISSIONS);
        assert_eq!(snapshot.last_round_trip_ms, Some(42));

        metrics.reset().await;
        assert_eq!(metrics.get_snapshot().await, AttemptMetrics::default());
    }
}
