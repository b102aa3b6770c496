//! Request/response contract with the remote verification service.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CaptureFrame, ReferenceImage, SessionAction, SessionId};

pub mod http;
pub mod wire;

pub use http::{HttpTransport, HttpTransportConfig};
pub use wire::{
    AckResponse, CreateSessionResponse, EnrollMetadata, FaceMatch, ProgressResponse,
    ResultDescriptor, TaskDescriptor, TaskSessionDescriptor,
};

/// Errors emitted by a transport.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// The service no longer recognises the session identifier.
    #[error("session not found")]
    SessionNotFound,

    /// API request failed with a structured status code.
    #[error("verification API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be parsed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Service answered but reported `success: false`.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Opaque client for the verification service.
///
/// Implementations own serialization and transport; the orchestrator only
/// depends on the fields modelled in [`wire`].
#[async_trait]
pub trait VerificationTransport: Send + Sync {
    async fn create_session(&self) -> Result<CreateSessionResponse, TransportError>;

    /// Ends or resets a session, depending on `action`.
    async fn end_session(
        &self,
        session_id: &SessionId,
        action: SessionAction,
    ) -> Result<AckResponse, TransportError>;

    async fn start_challenge(&self, session_id: &SessionId)
        -> Result<ProgressResponse, TransportError>;

    async fn submit_frame(
        &self,
        session_id: &SessionId,
        frame: &CaptureFrame,
    ) -> Result<ProgressResponse, TransportError>;

    async fn poll_status(&self, session_id: &SessionId) -> Result<ProgressResponse, TransportError>;

    /// Returns the best match for the image, or `None` when nobody matches.
    async fn search_face(&self, image: &ReferenceImage) -> Result<Option<FaceMatch>, TransportError>;

    /// Enrolls the image and returns the newly assigned identity.
    async fn enroll_face(
        &self,
        image: &ReferenceImage,
        display_name: &str,
        metadata: &EnrollMetadata,
    ) -> Result<String, TransportError>;
}
