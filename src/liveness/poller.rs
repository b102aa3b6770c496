use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::capture::TickOutcome;
use crate::models::SessionId;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Receiver of periodic status polls.
#[async_trait]
pub trait StatusReader: Send + Sync {
    async fn is_active(&self) -> bool;

    async fn poll_status(&self) -> TickOutcome;
}

/// Periodic status poll running alongside the capture loop.
///
/// A poll is awaited before the next tick fires, so polls never overlap.
pub struct StatusPoller {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl StatusPoller {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(
        &mut self,
        session_id: SessionId,
        interval: Duration,
        reader: Arc<dyn StatusReader>,
        cancel_token: CancellationToken,
    ) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        let handle = tokio::spawn(poll_loop(session_id, interval, reader, cancel_token.clone()));
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.await.context("status poll task failed to join")?;
        }
        Ok(())
    }
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new()
    }
}

async fn poll_loop(
    session_id: SessionId,
    interval: Duration,
    reader: Arc<dyn StatusReader>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately; the challenge start
    // response already carried the initial snapshot.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cancel_token.is_cancelled() || !reader.is_active().await {
                    break;
                }
                let outcome = tokio::select! {
                    biased;
                    outcome = reader.poll_status() => outcome,
                    _ = cancel_token.cancelled() => break,
                };
                if outcome == TickOutcome::Stop {
                    break;
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("status poll for session {} shutting down", session_id);
}
