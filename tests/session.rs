mod common;

use common::*;
use liveness_orchestrator::models::{SessionAction, SessionId};
use liveness_orchestrator::session::SessionManager;
use liveness_orchestrator::transport::TransportError;
use liveness_orchestrator::LivenessError;

#[tokio::test]
async fn starting_again_ends_the_previous_session() {
    let transport = ScriptedTransport::new();
    let sessions = SessionManager::new(transport.clone());

    let first = sessions.start().await.unwrap();
    let second = sessions.start().await.unwrap();

    assert_ne!(first, second);
    assert!(sessions.is_current(&second).await);
    assert!(!sessions.is_current(&first).await);
    assert_eq!(
        *transport.ended.lock().unwrap(),
        vec![(first, SessionAction::End)]
    );
}

#[tokio::test]
async fn create_failure_leaves_no_session() {
    let transport = ScriptedTransport::new();
    transport.fail_create(TransportError::Api {
        status: 503,
        message: "maintenance".into(),
    });
    let sessions = SessionManager::new(transport.clone());

    let err = sessions.start().await.unwrap_err();
    assert!(matches!(err, LivenessError::SessionCreate(ref msg) if msg.contains("maintenance")));
    assert_eq!(sessions.current().await, None);
}

#[tokio::test]
async fn end_clears_the_current_session() {
    let transport = ScriptedTransport::new();
    let sessions = SessionManager::new(transport.clone());

    let session_id = sessions.start().await.unwrap();
    sessions.end(&session_id).await;

    assert_eq!(sessions.current().await, None);
    assert_eq!(transport.ended_sessions(), vec![session_id]);
}

#[tokio::test]
async fn reset_keeps_the_session_current() {
    let transport = ScriptedTransport::new();
    let sessions = SessionManager::new(transport.clone());

    let session_id = sessions.start().await.unwrap();
    sessions.reset(&session_id).await;

    assert!(sessions.is_current(&session_id).await);
    assert_eq!(
        *transport.ended.lock().unwrap(),
        vec![(session_id, SessionAction::Reset)]
    );
}

#[tokio::test]
async fn forget_skips_the_service() {
    let transport = ScriptedTransport::new();
    let sessions = SessionManager::new(transport.clone());

    let session_id = sessions.start().await.unwrap();
    sessions.forget(&SessionId::new("sid-other")).await;
    assert!(sessions.is_current(&session_id).await);

    sessions.forget(&session_id).await;
    assert_eq!(sessions.current().await, None);
    assert!(transport.ended_sessions().is_empty());
}
