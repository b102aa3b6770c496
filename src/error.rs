//! Error taxonomy for a verification attempt.

use thiserror::Error;

use crate::transport::TransportError;

/// Failures surfaced by the orchestrator.
///
/// Every variant except [`LivenessError::TransientFrame`] is fatal to the
/// attempt: the capture loop stops and the snapshot stream reports a failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LivenessError {
    #[error("session creation failed: {0}")]
    SessionCreate(String),

    #[error("capture source unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("session {session_id} is no longer valid")]
    SessionInvalidated { session_id: String },

    #[error("challenge start rejected: {0}")]
    ChallengeStart(String),

    #[error("frame submission failed: {0}")]
    TransientFrame(String),

    #[error("{count} consecutive frame submissions failed")]
    FrameErrorsExhausted { count: u32 },

    #[error("verification pipeline failed: {0}")]
    VerificationPipeline(String),

    /// The attempt was reset or torn down while it was still starting.
    #[error("attempt cancelled before the challenge started")]
    Cancelled,
}

/// Coarse failure class carried on snapshots for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    SessionCreate,
    CaptureUnavailable,
    SessionInvalidated,
    ChallengeStart,
    FrameErrors,
    VerificationPipeline,
    Cancelled,
}

impl LivenessError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LivenessError::TransientFrame(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            LivenessError::SessionCreate(_) => FailureKind::SessionCreate,
            LivenessError::CaptureUnavailable(_) => FailureKind::CaptureUnavailable,
            LivenessError::SessionInvalidated { .. } => FailureKind::SessionInvalidated,
            LivenessError::ChallengeStart(_) => FailureKind::ChallengeStart,
            LivenessError::TransientFrame(_) | LivenessError::FrameErrorsExhausted { .. } => {
                FailureKind::FrameErrors
            }
            LivenessError::VerificationPipeline(_) => FailureKind::VerificationPipeline,
            LivenessError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            LivenessError::SessionCreate(_) => {
                "Could not start a verification session. Please try again."
            }
            LivenessError::CaptureUnavailable(_) => {
                "The camera is not available. Check camera permissions and try again."
            }
            LivenessError::SessionInvalidated { .. } => {
                "Your verification session expired. Please start again."
            }
            LivenessError::ChallengeStart(_) => {
                "The verification challenge could not be started. Please try again."
            }
            LivenessError::TransientFrame(_) | LivenessError::FrameErrorsExhausted { .. } => {
                "We are having trouble reaching the verification service. Please try again."
            }
            LivenessError::VerificationPipeline(_) => {
                "Liveness check passed, but identity verification failed. Please try again."
            }
            LivenessError::Cancelled => "Verification was cancelled.",
        }
    }

    pub(crate) fn from_create(err: TransportError) -> Self {
        LivenessError::SessionCreate(err.to_string())
    }

    pub(crate) fn from_pipeline(err: TransportError) -> Self {
        LivenessError::VerificationPipeline(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_frame_errors_are_recoverable() {
        assert!(!LivenessError::TransientFrame("timeout".into()).is_fatal());
        assert!(LivenessError::FrameErrorsExhausted { count: 5 }.is_fatal());
        assert!(LivenessError::SessionInvalidated {
            session_id: "sid-1".into()
        }
        .is_fatal());
    }

    #[test]
    fn pipeline_failure_is_reported_apart_from_liveness() {
        let err = LivenessError::from_pipeline(TransportError::Network("reset".into()));
        assert_eq!(err.kind(), FailureKind::VerificationPipeline);
        assert!(err.user_message().contains("Liveness check passed"));
    }
}
