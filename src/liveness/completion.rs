use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tokio_util::sync::CancellationToken;

use crate::error::LivenessError;
use crate::models::{EnrollmentResult, ReferenceImage, SessionId, VerificationOutcome};
use crate::transport::{EnrollMetadata, VerificationTransport};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const NAME_SUFFIX_LEN: usize = 6;

/// Runs the post-liveness face search, falling back to enrollment.
///
/// Fires at most once per attempt: the latch is taken before the first
/// network call, so a second trigger from the poll path or a late frame
/// response is a no-op. Cancelling the attempt's token abandons the step
/// and no enrollment is sent afterwards.
pub struct CompletionHandler {
    transport: Arc<dyn VerificationTransport>,
    name_prefix: String,
    fired: AtomicBool,
}

impl CompletionHandler {
    pub fn new(transport: Arc<dyn VerificationTransport>, name_prefix: impl Into<String>) -> Self {
        Self {
            transport,
            name_prefix: name_prefix.into(),
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Re-arms the latch for a new attempt.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }

    /// Returns `None` when the step already ran for this attempt, and
    /// `Err(Cancelled)` when `cancel` fired before it finished.
    pub async fn complete(
        &self,
        session_id: &SessionId,
        reference: &ReferenceImage,
        outcome: &VerificationOutcome,
        cancel: &CancellationToken,
    ) -> Option<Result<EnrollmentResult, LivenessError>> {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let result = self.search_or_enroll(session_id, reference, outcome, cancel).await;
        match &result {
            Ok(EnrollmentResult::Matched {
                identity,
                confidence,
            }) => log_info!(
                "session {} matched identity {} (confidence {:.3})",
                session_id,
                identity,
                confidence
            ),
            Ok(EnrollmentResult::Enrolled {
                identity,
                display_name,
            }) => log_info!(
                "session {} enrolled new identity {} as {}",
                session_id,
                identity,
                display_name
            ),
            Err(LivenessError::Cancelled) => {
                log_info!("completion for session {} abandoned", session_id)
            }
            Err(err) => log_error!("completion for session {} failed: {}", session_id, err),
        }
        Some(result)
    }

    async fn search_or_enroll(
        &self,
        session_id: &SessionId,
        reference: &ReferenceImage,
        outcome: &VerificationOutcome,
        cancel: &CancellationToken,
    ) -> Result<EnrollmentResult, LivenessError> {
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LivenessError::Cancelled),
            found = self.transport.search_face(reference) => {
                found.map_err(LivenessError::from_pipeline)?
            }
        };

        if let Some(found) = found {
            return Ok(EnrollmentResult::Matched {
                identity: found.identity,
                confidence: found.confidence,
            });
        }

        let display_name = generate_display_name(&self.name_prefix);
        let metadata = EnrollMetadata {
            source: "liveness".into(),
            session_id: session_id.to_string(),
            captured_at: reference.captured_at(),
            success_rate: outcome.stats.as_ref().and_then(|stats| stats.success_rate),
        };

        // Nothing is enrolled once the attempt has been abandoned.
        let identity = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LivenessError::Cancelled),
            identity = self.transport.enroll_face(reference, &display_name, &metadata) => {
                identity.map_err(LivenessError::from_pipeline)?
            }
        };

        Ok(EnrollmentResult::Enrolled {
            identity,
            display_name,
        })
    }
}

/// `{prefix}-{YYYYMMDD}-{random}`
pub fn generate_display_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_carry_prefix_date_and_suffix() {
        let name = generate_display_name("User");
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "User");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), NAME_SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn display_names_differ_between_calls() {
        assert_ne!(generate_display_name("User"), generate_display_name("User"));
    }
}
