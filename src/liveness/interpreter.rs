//! Maps one raw service response to a normalized progress signal.
//!
//! Responses are classified independently of each other; ordering and
//! stickiness are the state machine's concern.

use crate::models::{ChallengeTask, VerificationOutcome, VerificationStats};
use crate::transport::{ProgressResponse, TaskDescriptor, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    NoFace,
    ChallengeActive(ChallengeTask),
    Terminal(VerificationOutcome),
    TransientError(String),
    SessionInvalid,
    /// Frame accepted, nothing to update.
    NoChange,
}

pub fn interpret(response: &Result<ProgressResponse, TransportError>) -> Signal {
    let response = match response {
        Ok(response) => response,
        Err(TransportError::SessionNotFound) => return Signal::SessionInvalid,
        Err(err) => return Signal::TransientError(err.to_string()),
    };

    if response.session_invalid() {
        return Signal::SessionInvalid;
    }

    if !response.success {
        let reason = response
            .error
            .clone()
            .or_else(|| response.error_code.clone())
            .unwrap_or_else(|| "service reported failure".to_string());
        return Signal::TransientError(reason);
    }

    let sequence_active = response
        .task_session
        .as_ref()
        .map(|session| session.active)
        .unwrap_or(true);

    if let (false, Some(result)) = (sequence_active, response.result.as_ref()) {
        return Signal::Terminal(VerificationOutcome {
            passed: result.final_result,
            stats: Some(VerificationStats {
                success_rate: result.success_rate,
                passed_tasks: result.passed_tasks,
                total_tasks: result.total_tasks.or_else(|| {
                    response
                        .task_session
                        .as_ref()
                        .and_then(|session| session.total_tasks)
                }),
            }),
        });
    }

    if let Some(task) = response
        .current_task
        .as_ref()
        .filter(|task| !task.description.trim().is_empty())
    {
        return Signal::ChallengeActive(to_task(task, response));
    }

    if response.face_detected == Some(false) {
        return Signal::NoFace;
    }

    Signal::NoChange
}

fn to_task(task: &TaskDescriptor, response: &ProgressResponse) -> ChallengeTask {
    let session = response.task_session.as_ref();
    ChallengeTask {
        description: task.description.trim().to_string(),
        index: task
            .index
            .or_else(|| session.and_then(|s| s.current_index))
            .unwrap_or(0),
        total: task
            .total
            .or_else(|| session.and_then(|s| s.total_tasks))
            .unwrap_or(0),
        time_remaining_secs: task.time_remaining.unwrap_or(0.0).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ResultDescriptor, TaskSessionDescriptor};

    fn task(description: &str, remaining: f64) -> TaskDescriptor {
        TaskDescriptor {
            description: description.into(),
            time_remaining: Some(remaining),
            index: Some(0),
            total: Some(3),
        }
    }

    fn finished(passed: bool) -> ProgressResponse {
        ProgressResponse {
            face_detected: Some(true),
            task_session: Some(TaskSessionDescriptor {
                active: false,
                current_index: Some(3),
                total_tasks: Some(3),
            }),
            result: Some(ResultDescriptor {
                final_result: passed,
                success_rate: Some(if passed { 1.0 } else { 0.33 }),
                passed_tasks: None,
                total_tasks: None,
            }),
            ..ProgressResponse::default()
        }
    }

    #[test]
    fn missing_face_is_reported() {
        let resp = ProgressResponse {
            face_detected: Some(false),
            ..ProgressResponse::default()
        };
        assert_eq!(interpret(&Ok(resp)), Signal::NoFace);
    }

    #[test]
    fn active_task_is_carried_through_unmirrored() {
        let resp = ProgressResponse {
            face_detected: Some(true),
            current_task: Some(task("Look Left", 5.0)),
            ..ProgressResponse::default()
        };
        match interpret(&Ok(resp)) {
            Signal::ChallengeActive(task) => {
                assert_eq!(task.description, "Look Left");
                assert_eq!(task.time_remaining_secs, 5.0);
                assert_eq!(task.total, 3);
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn terminal_result_wins_over_stale_task() {
        let mut resp = finished(true);
        resp.current_task = Some(task("Blink", 1.0));
        match interpret(&Ok(resp)) {
            Signal::Terminal(outcome) => {
                assert!(outcome.passed);
                assert_eq!(outcome.stats.unwrap().total_tasks, Some(3));
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn result_while_sequence_active_is_not_terminal() {
        let mut resp = finished(false);
        resp.task_session = Some(TaskSessionDescriptor {
            active: true,
            current_index: Some(1),
            total_tasks: Some(3),
        });
        assert_eq!(interpret(&Ok(resp)), Signal::NoChange);
    }

    #[test]
    fn session_invalid_has_top_priority() {
        let mut resp = finished(true);
        resp.error_code = Some("invalid_session".into());
        assert_eq!(interpret(&Ok(resp)), Signal::SessionInvalid);
        assert_eq!(
            interpret(&Err(TransportError::SessionNotFound)),
            Signal::SessionInvalid
        );
    }

    #[test]
    fn transport_failures_are_transient() {
        let signal = interpret(&Err(TransportError::Network("connection reset".into())));
        assert!(matches!(signal, Signal::TransientError(msg) if msg.contains("connection reset")));

        let rejected = ProgressResponse {
            success: false,
            error: Some("decoder busy".into()),
            ..ProgressResponse::default()
        };
        assert_eq!(
            interpret(&Ok(rejected)),
            Signal::TransientError("decoder busy".into())
        );
    }

    #[test]
    fn blank_description_is_ignored() {
        let resp = ProgressResponse {
            face_detected: Some(true),
            current_task: Some(task("   ", 3.0)),
            ..ProgressResponse::default()
        };
        assert_eq!(interpret(&Ok(resp)), Signal::NoChange);
    }
}
