use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::{CaptureFrame, SessionId};

use super::{CaptureSource, FrameProcessor, TickOutcome};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Minimum spacing between the starts of consecutive submissions.
///
/// Unlike a fixed-period timer the next slot is computed from the last start,
/// so a slow round trip never queues extra submissions behind it.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_start: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        self.last_start
            .map(|last| now.saturating_duration_since(last) >= self.min_interval)
            .unwrap_or(true)
    }

    pub fn next_allowed(&self, now: Instant) -> Instant {
        match self.last_start {
            Some(last) => (last + self.min_interval).max(now),
            None => now,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_start = Some(now);
    }
}

/// Holds the busy flag for the duration of one submission.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct LoopSettings {
    pub min_interval: Duration,
    pub idle_poll: Duration,
}

pub(crate) async fn capture_loop(
    session_id: SessionId,
    source: Arc<dyn CaptureSource>,
    processor: Arc<dyn FrameProcessor>,
    settings: LoopSettings,
    in_flight: Arc<AtomicBool>,
    cancel_token: CancellationToken,
) {
    let idle_poll = settings.idle_poll.max(Duration::from_millis(1));
    let mut throttle = Throttle::new(settings.min_interval);
    let mut next_tick = Instant::now();
    let mut ticks: u64 = 0;

    log_info!("capture loop started for session {}", session_id);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(next_tick) => {}
            _ = cancel_token.cancelled() => break,
        }

        // A tick that was already scheduled must re-check state before acting.
        if cancel_token.is_cancelled() || !processor.is_active().await {
            break;
        }

        let now = Instant::now();
        if !source.is_ready() {
            next_tick = throttle.next_allowed(now).max(now + idle_poll);
            continue;
        }
        if !throttle.ready(now) {
            next_tick = throttle.next_allowed(now);
            continue;
        }
        let Some(guard) = InFlightGuard::acquire(&in_flight) else {
            log_debug!("previous submission still in flight, skipping tick");
            next_tick = now + idle_poll;
            continue;
        };

        throttle.mark(now);
        ticks = ticks.wrapping_add(1);

        let frame = match grab(Arc::clone(&source)).await {
            Ok(frame) => frame,
            Err(err) => {
                drop(guard);
                log_warn!("frame grab failed for session {}: {err:#}", session_id);
                next_tick = throttle.next_allowed(Instant::now());
                continue;
            }
        };

        let outcome = tokio::select! {
            biased;
            outcome = processor.process_frame(frame) => outcome,
            _ = cancel_token.cancelled() => break,
        };
        drop(guard);

        if outcome == TickOutcome::Stop {
            break;
        }
        next_tick = throttle.next_allowed(Instant::now());
    }

    log_info!(
        "capture loop for session {} shutting down after {} submissions",
        session_id,
        ticks
    );
}

async fn grab(source: Arc<dyn CaptureSource>) -> Result<CaptureFrame> {
    tokio::task::spawn_blocking(move || source.grab_frame())
        .await
        .context("frame grab worker join failed")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_from_last_start() {
        let mut throttle = Throttle::new(Duration::from_millis(300));
        let t0 = Instant::now();
        assert!(throttle.ready(t0));

        throttle.mark(t0);
        assert!(!throttle.ready(t0 + Duration::from_millis(299)));
        assert!(throttle.ready(t0 + Duration::from_millis(300)));
        assert_eq!(
            throttle.next_allowed(t0 + Duration::from_millis(100)),
            t0 + Duration::from_millis(300)
        );
        // A slow round trip past the interval allows an immediate next tick.
        let late = t0 + Duration::from_millis(900);
        assert_eq!(throttle.next_allowed(late), late);
    }

    #[test]
    fn in_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = InFlightGuard::acquire(&flag).expect("first acquire");
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(first);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
