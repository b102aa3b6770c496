use serde::Serialize;

use crate::error::FailureKind;
use crate::models::{ChallengeTask, EnrollmentResult, VerificationOutcome};

/// What a presentation layer renders for the current attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AttemptSnapshot {
    Idle,
    AwaitingChallenge,
    ChallengeActive {
        /// Mirrored text, identical to what is spoken.
        instruction: String,
        task: ChallengeTask,
    },
    Terminal {
        outcome: VerificationOutcome,
    },
    Completed {
        outcome: VerificationOutcome,
        result: EnrollmentResult,
    },
    Failed {
        kind: FailureKind,
        message: String,
        /// Liveness judgment, when one was reached before the failure.
        outcome: Option<VerificationOutcome>,
    },
}

impl Default for AttemptSnapshot {
    fn default() -> Self {
        AttemptSnapshot::Idle
    }
}

impl AttemptSnapshot {
    /// True once nothing further will happen without a reset or new attempt.
    pub fn is_settled(&self) -> bool {
        match self {
            AttemptSnapshot::Completed { .. } | AttemptSnapshot::Failed { .. } => true,
            AttemptSnapshot::Terminal { outcome } => !outcome.passed,
            _ => false,
        }
    }
}
