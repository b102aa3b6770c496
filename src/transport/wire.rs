//! Load-bearing response fields exchanged with the verification service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SESSION_INVALID_CODES: &[&str] = &["session_not_found", "invalid_session", "session_expired"];

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    #[serde(default)]
    pub success: bool,
    pub session_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDescriptor {
    pub description: String,
    pub time_remaining: Option<f64>,
    #[serde(alias = "current_index")]
    pub index: Option<u32>,
    #[serde(alias = "total_tasks")]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSessionDescriptor {
    pub active: bool,
    pub current_index: Option<u32>,
    pub total_tasks: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultDescriptor {
    pub final_result: bool,
    pub success_rate: Option<f64>,
    pub passed_tasks: Option<u32>,
    pub total_tasks: Option<u32>,
}

/// Progress shape shared by challenge start, frame submission and status polls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    pub face_detected: Option<bool>,
    pub current_task: Option<TaskDescriptor>,
    pub task_session: Option<TaskSessionDescriptor>,
    pub result: Option<ResultDescriptor>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl Default for ProgressResponse {
    fn default() -> Self {
        Self {
            success: true,
            face_detected: None,
            current_task: None,
            task_session: None,
            result: None,
            error: None,
            error_code: None,
        }
    }
}

impl ProgressResponse {
    pub fn session_invalid(&self) -> bool {
        self.error_code
            .as_deref()
            .map(is_session_invalid_code)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceMatch {
    pub identity: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "match")]
    pub matched: Option<FaceMatch>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollResponse {
    #[serde(default)]
    pub success: bool,
    pub identity_id: Option<String>,
    pub error: Option<String>,
}

/// Metadata attached to a freshly enrolled identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollMetadata {
    pub source: String,
    pub session_id: String,
    pub captured_at: DateTime<Utc>,
    pub success_rate: Option<f64>,
}

pub(crate) fn is_session_invalid_code(code: &str) -> bool {
    SESSION_INVALID_CODES.contains(&code)
}
