use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::{CaptureFrame, ReferenceImage, SessionAction, SessionId};

use super::wire::{
    is_session_invalid_code, AckResponse, CreateSessionResponse, EnrollMetadata, EnrollResponse,
    FaceMatch, ProgressResponse, SearchResponse,
};
use super::{TransportError, VerificationTransport};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    pub base_url: String,
    #[serde(default, with = "crate::config::optional_millis")]
    pub request_timeout: Option<Duration>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: None,
            api_key: None,
        }
    }
}

/// `VerificationTransport` over JSON/HTTP with base64 image payloads.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("X-Request-Id", Uuid::new_v4().to_string());
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        scope: Scope,
    ) -> Result<T, TransportError> {
        let response = self.decorate(request).send().await?;
        decode(response, scope).await
    }
}

/// Whether a missing resource means the session itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Session,
    Faces,
}

async fn decode<T: DeserializeOwned>(response: Response, scope: Scope) -> Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(classify_failure(status, body, scope));
    }
    Ok(serde_json::from_str(&body)?)
}

fn classify_failure(status: StatusCode, body: String, scope: Scope) -> TransportError {
    if scope == Scope::Session {
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return TransportError::SessionNotFound;
        }
        // Some deployments report an expired session as a 400 with an error code.
        let code = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error_code")?.as_str().map(str::to_owned));
        if code.as_deref().map(is_session_invalid_code).unwrap_or(false) {
            return TransportError::SessionNotFound;
        }
    }

    TransportError::Api {
        status: status.as_u16(),
        message: body,
    }
}

fn encode_image(frame: &CaptureFrame) -> String {
    base64::engine::general_purpose::STANDARD.encode(&frame.data)
}

#[async_trait]
impl VerificationTransport for HttpTransport {
    async fn create_session(&self) -> Result<CreateSessionResponse, TransportError> {
        let request = self
            .client
            .post(self.url("/liveness/session"))
            .json(&json!({ "action": SessionAction::Create.as_str() }));
        self.send(request, Scope::Session).await
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
        action: SessionAction,
    ) -> Result<AckResponse, TransportError> {
        let request = self.client.post(self.url("/liveness/session")).json(&json!({
            "action": action.as_str(),
            "session_id": session_id.as_str(),
        }));
        self.send(request, Scope::Session).await
    }

    async fn start_challenge(
        &self,
        session_id: &SessionId,
    ) -> Result<ProgressResponse, TransportError> {
        let request = self
            .client
            .post(self.url("/liveness/challenge/start"))
            .json(&json!({ "session_id": session_id.as_str() }));
        self.send(request, Scope::Session).await
    }

    async fn submit_frame(
        &self,
        session_id: &SessionId,
        frame: &CaptureFrame,
    ) -> Result<ProgressResponse, TransportError> {
        log_debug!("submitting {} byte frame for session {}", frame.len(), session_id);
        let request = self.client.post(self.url("/liveness/frame")).json(&json!({
            "session_id": session_id.as_str(),
            "image": encode_image(frame),
            "content_type": frame.content_type,
            "captured_at": frame.captured_at,
        }));
        self.send(request, Scope::Session).await
    }

    async fn poll_status(&self, session_id: &SessionId) -> Result<ProgressResponse, TransportError> {
        let request = self
            .client
            .get(self.url(&format!("/liveness/status/{}", session_id.as_str())));
        self.send(request, Scope::Session).await
    }

    async fn search_face(&self, image: &ReferenceImage) -> Result<Option<FaceMatch>, TransportError> {
        let request = self.client.post(self.url("/faces/search")).json(&json!({
            "image": encode_image(image.frame()),
            "content_type": image.frame().content_type,
        }));
        let response: SearchResponse = self.send(request, Scope::Faces).await?;
        if !response.success {
            return Err(TransportError::Rejected(
                response.error.unwrap_or_else(|| "face search failed".into()),
            ));
        }
        Ok(response.matched)
    }

    async fn enroll_face(
        &self,
        image: &ReferenceImage,
        display_name: &str,
        metadata: &EnrollMetadata,
    ) -> Result<String, TransportError> {
        let request = self.client.post(self.url("/faces/enroll")).json(&json!({
            "image": encode_image(image.frame()),
            "content_type": image.frame().content_type,
            "name": display_name,
            "metadata": metadata,
        }));
        let response: EnrollResponse = self.send(request, Scope::Faces).await?;
        match (response.success, response.identity_id) {
            (true, Some(identity)) => Ok(identity),
            (_, _) => Err(TransportError::Rejected(
                response.error.unwrap_or_else(|| "enrollment returned no identity".into()),
            )),
        }
    }
}
