use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::SessionId;

use super::loop_worker::{capture_loop, LoopSettings};
use super::{CaptureSource, FrameProcessor};

/// Owns the capture loop task for one session.
pub struct CaptureScheduler {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    in_flight: Arc<AtomicBool>,
    min_interval: Duration,
    idle_poll: Duration,
}

impl CaptureScheduler {
    pub fn new(min_interval: Duration, idle_poll: Duration) -> Self {
        Self {
            handle: None,
            cancel_token: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            min_interval,
            idle_poll,
        }
    }

    pub fn start(
        &mut self,
        session_id: SessionId,
        source: Arc<dyn CaptureSource>,
        processor: Arc<dyn FrameProcessor>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        if self.is_running() {
            bail!("capture loop already active");
        }

        let settings = LoopSettings {
            min_interval: self.min_interval,
            idle_poll: self.idle_poll,
        };

        let handle = tokio::spawn(capture_loop(
            session_id,
            source,
            processor,
            settings,
            Arc::clone(&self.in_flight),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// True while a frame submission is awaiting its response.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")?;
            info!("capture loop joined");
        }
        Ok(())
    }
}
