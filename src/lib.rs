//! Client-side orchestration of face liveness verification.
//!
//! A [`LivenessOrchestrator`] opens a remote session, streams throttled camera
//! frames, turns the service's progress reports into on-screen and spoken
//! directives, and on success matches the reference image against known
//! faces or enrolls it.

pub mod capture;
pub mod config;
pub mod error;
pub mod liveness;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod transport;
pub mod utils;
pub mod voice;

pub use capture::{CaptureSource, StillFrameSource};
pub use config::OrchestratorConfig;
pub use error::{FailureKind, LivenessError};
pub use orchestrator::{AttemptSnapshot, LivenessOrchestrator};
pub use transport::{HttpTransport, HttpTransportConfig, TransportError, VerificationTransport};
pub use utils::init_logging;
pub use voice::{LogSpeech, SpeechBackend};
