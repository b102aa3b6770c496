use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::LivenessError;
use crate::models::{Session, SessionAction, SessionId};
use crate::transport::{TransportError, VerificationTransport};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Owns the single live remote session.
pub struct SessionManager {
    transport: Arc<dyn VerificationTransport>,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn VerificationTransport>) -> Self {
        Self {
            transport,
            current: Mutex::new(None),
        }
    }

    /// Identifier of the live session, if any.
    pub async fn current(&self) -> Option<SessionId> {
        self.current.lock().await.as_ref().map(|session| session.id.clone())
    }

    /// Stale-response guard: true only while `session_id` is the live session.
    pub async fn is_current(&self, session_id: &SessionId) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|session| &session.id == session_id)
            .unwrap_or(false)
    }

    /// Creates a session, ending any previous one first.
    pub async fn start(&self) -> Result<SessionId, LivenessError> {
        if let Some(previous) = self.take_current().await {
            self.end_remote(&previous.id, SessionAction::End).await;
        }

        let response = self
            .transport
            .create_session()
            .await
            .map_err(LivenessError::from_create)?;

        let session_id = match (response.success, response.session_id) {
            (true, Some(id)) if !id.trim().is_empty() => SessionId::new(id),
            (_, _) => {
                return Err(LivenessError::SessionCreate(
                    response
                        .error
                        .unwrap_or_else(|| "service returned no session identifier".into()),
                ))
            }
        };

        log_info!("created liveness session {}", session_id);
        *self.current.lock().await = Some(Session::active(session_id.clone()));
        Ok(session_id)
    }

    /// Best-effort end; failures are logged. A session that is no longer
    /// current is still ended remotely.
    pub async fn end(&self, session_id: &SessionId) {
        {
            let mut guard = self.current.lock().await;
            if guard.as_ref().map(|s| &s.id == session_id).unwrap_or(false) {
                if let Some(mut session) = guard.take() {
                    session.end();
                    let lifetime_ms = session
                        .ended_at
                        .map(|ended| (ended - session.created_at).num_milliseconds())
                        .unwrap_or_default();
                    log_info!("session {} closed after {}ms", session.id, lifetime_ms);
                }
            }
        }
        self.end_remote(session_id, SessionAction::End).await;
    }

    /// Asks the service to discard in-progress challenge state while keeping
    /// the identifier. Services without reset support answer with an error,
    /// which is ignored.
    pub async fn reset(&self, session_id: &SessionId) {
        match self.transport.end_session(session_id, SessionAction::Reset).await {
            Ok(ack) if ack.success => log_info!("reset session {}", session_id),
            Ok(ack) => log_warn!(
                "session {} reset not acknowledged: {}",
                session_id,
                ack.error.unwrap_or_default()
            ),
            Err(err) => log_warn!("session {} reset failed: {}", session_id, err),
        }
    }

    /// Drops the local handle without contacting the service, for sessions
    /// the service has already forgotten.
    pub async fn forget(&self, session_id: &SessionId) {
        let mut guard = self.current.lock().await;
        if guard.as_ref().map(|s| &s.id == session_id).unwrap_or(false) {
            guard.take();
        }
    }

    async fn take_current(&self) -> Option<Session> {
        self.current.lock().await.take()
    }

    async fn end_remote(&self, session_id: &SessionId, action: SessionAction) {
        match self.transport.end_session(session_id, action).await {
            Ok(ack) if ack.success => log_info!("ended session {}", session_id),
            Ok(ack) => log_warn!(
                "session {} end not acknowledged: {}",
                session_id,
                ack.error.unwrap_or_default()
            ),
            Err(TransportError::SessionNotFound) => {
                log_info!("session {} already gone on the service", session_id)
            }
            Err(err) => log_warn!("failed to end session {}: {}", session_id, err),
        }
    }
}
