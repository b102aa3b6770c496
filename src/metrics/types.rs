use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One frame submission round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionMetrics {
    pub timestamp: DateTime<Utc>,
    pub frame_bytes: usize,
    pub round_trip_ms: u64,
    pub failed: bool,
    pub discarded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttemptMetrics {
    pub recent_submissions: Vec<SubmissionMetrics>,
    pub frames_submitted: u64,
    pub frames_failed: u64,
    pub frames_discarded: u64,
    pub polls: u64,
    pub last_round_trip_ms: Option<u64>,
}
