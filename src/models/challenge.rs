use serde::{Deserialize, Serialize};

/// A single directive the user must perform.
///
/// `description` is the remote service's wording, expressed in the camera's
/// (unmirrored) frame of reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeTask {
    pub description: String,
    pub index: u32,
    pub total: u32,
    pub time_remaining_secs: f64,
}

impl ChallengeTask {
    /// True when `other` describes the same directive, ignoring the countdown.
    pub fn same_directive(&self, other: &ChallengeTask) -> bool {
        self.description == other.description && self.index == other.index
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub success_rate: Option<f64>,
    pub passed_tasks: Option<u32>,
    pub total_tasks: Option<u32>,
}

/// The remote service's final judgment for one challenge sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub passed: bool,
    pub stats: Option<VerificationStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EnrollmentResult {
    Matched {
        identity: String,
        confidence: f64,
    },
    Enrolled {
        identity: String,
        display_name: String,
    },
}

impl EnrollmentResult {
    pub fn identity(&self) -> &str {
        match self {
            EnrollmentResult::Matched { identity, .. } => identity,
            EnrollmentResult::Enrolled { identity, .. } => identity,
        }
    }
}
