pub mod controller;
pub mod loop_worker;
pub mod still;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::LivenessError;
use crate::models::CaptureFrame;

pub use controller::CaptureScheduler;
pub use loop_worker::Throttle;
pub use still::{encode_frame, StillFrameSource};

/// A live camera feed.
pub trait CaptureSource: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Returns the current still. Fails when the source is not ready.
    fn grab_frame(&self) -> Result<CaptureFrame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Consumer of captured frames, consulted before every tick.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    /// False once the attempt is terminal or its session has ended.
    async fn is_active(&self) -> bool;

    async fn process_frame(&self, frame: CaptureFrame) -> TickOutcome;
}

/// Waits for the source to report ready, failing fast after `timeout`.
pub async fn wait_until_ready(
    source: &dyn CaptureSource,
    timeout: Duration,
    poll: Duration,
) -> Result<(), LivenessError> {
    let deadline = Instant::now() + timeout;
    loop {
        if source.is_ready() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(LivenessError::CaptureUnavailable(format!(
                "capture source not ready after {}ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(poll.max(Duration::from_millis(1))).await;
    }
}
