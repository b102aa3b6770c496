use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::{wait_until_ready, CaptureScheduler, CaptureSource, FrameProcessor, TickOutcome};
use crate::config::OrchestratorConfig;
use crate::error::LivenessError;
use crate::liveness::{
    interpret, CompletionHandler, Effect, Signal, StatusPoller, StatusReader, TaskPhase,
    TaskStateMachine,
};
use crate::metrics::{AttemptMetrics, MetricsCollector, SubmissionMetrics};
use crate::models::{
    CaptureFrame, EnrollmentResult, ReferenceImage, SessionId, VerificationOutcome,
};
use crate::session::SessionManager;
use crate::transport::{ProgressResponse, TransportError, VerificationTransport};
use crate::voice::{
    SpeechBackend, VoiceCoordinator, PROMPT_FAILED, PROMPT_LOOK_AT_CAMERA, PROMPT_PASSED,
};

use super::AttemptSnapshot;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Where a response came from; only frame submissions count towards the
/// transient error budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponsePath {
    ChallengeStart,
    Frame,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    /// Response belonged to a superseded or ended session.
    Stale,
    Applied,
    Transient,
    Finished,
}

impl Handled {
    fn tick_outcome(self) -> TickOutcome {
        match self {
            Handled::Finished | Handled::Stale => TickOutcome::Stop,
            Handled::Applied | Handled::Transient => TickOutcome::Continue,
        }
    }
}

struct AttemptState {
    attempt_id: Option<Uuid>,
    session_id: Option<SessionId>,
    machine: TaskStateMachine,
    reference: Option<ReferenceImage>,
    consecutive_frame_errors: u32,
    /// Lives from session creation until reset; parent of every other token.
    attempt_token: Option<CancellationToken>,
    loop_token: Option<CancellationToken>,
    failure: Option<LivenessError>,
    enrollment: Option<EnrollmentResult>,
}

impl AttemptState {
    fn new(mirror: bool) -> Self {
        Self {
            attempt_id: None,
            session_id: None,
            machine: TaskStateMachine::new(mirror),
            reference: None,
            consecutive_frame_errors: 0,
            attempt_token: None,
            loop_token: None,
            failure: None,
            enrollment: None,
        }
    }

    fn clear(&mut self) {
        self.attempt_id = None;
        self.session_id = None;
        self.machine.reset();
        self.reference = None;
        self.consecutive_frame_errors = 0;
        self.attempt_token = None;
        self.loop_token = None;
        self.failure = None;
        self.enrollment = None;
    }

    fn owns(&self, session_id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session_id)
    }

    fn is_running(&self) -> bool {
        self.failure.is_none() && !self.machine.is_idle() && !self.machine.is_terminal()
    }

    fn child_token(&self) -> CancellationToken {
        self.attempt_token
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default()
    }

    fn terminal_outcome(&self) -> Option<VerificationOutcome> {
        match self.machine.phase() {
            TaskPhase::Terminal { outcome } => Some(outcome.clone()),
            _ => None,
        }
    }

    fn snapshot(&self) -> AttemptSnapshot {
        if let Some(err) = &self.failure {
            return AttemptSnapshot::Failed {
                kind: err.kind(),
                message: err.user_message().to_string(),
                outcome: self.terminal_outcome(),
            };
        }

        let machine = &self.machine;
        match machine.phase() {
            TaskPhase::Idle => AttemptSnapshot::Idle,
            TaskPhase::AwaitingChallenge => AttemptSnapshot::AwaitingChallenge,
            TaskPhase::ChallengeActive { task } => AttemptSnapshot::ChallengeActive {
                instruction: machine.display_text(task),
                task: task.clone(),
            },
            TaskPhase::Terminal { outcome } => match &self.enrollment {
                Some(result) => AttemptSnapshot::Completed {
                    outcome: outcome.clone(),
                    result: result.clone(),
                },
                None => AttemptSnapshot::Terminal {
                    outcome: outcome.clone(),
                },
            },
        }
    }
}

struct Inner {
    config: OrchestratorConfig,
    transport: Arc<dyn VerificationTransport>,
    source: Arc<dyn CaptureSource>,
    voice: VoiceCoordinator,
    sessions: SessionManager,
    completion: CompletionHandler,
    metrics: MetricsCollector,
    attempt: Mutex<AttemptState>,
    scheduler: Mutex<CaptureScheduler>,
    poller: Mutex<StatusPoller>,
    /// Serialises start/reset/teardown around session creation.
    lifecycle: Mutex<()>,
    snapshot_tx: watch::Sender<AttemptSnapshot>,
}

/// Drives one verification attempt at a time: session, capture loop,
/// challenge progress and the post-success face match-or-enroll step.
#[derive(Clone)]
pub struct LivenessOrchestrator {
    inner: Arc<Inner>,
}

impl LivenessOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<dyn VerificationTransport>,
        source: Arc<dyn CaptureSource>,
        speech: Arc<dyn SpeechBackend>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(AttemptSnapshot::Idle);

        Self {
            inner: Arc::new(Inner {
                voice: VoiceCoordinator::new(speech, config.voice_enabled),
                sessions: SessionManager::new(Arc::clone(&transport)),
                completion: CompletionHandler::new(
                    Arc::clone(&transport),
                    config.enroll_name_prefix.clone(),
                ),
                metrics: MetricsCollector::new(),
                attempt: Mutex::new(AttemptState::new(config.mirror_directions)),
                scheduler: Mutex::new(CaptureScheduler::new(
                    config.min_capture_interval,
                    config.capture_ready_poll,
                )),
                poller: Mutex::new(StatusPoller::new()),
                lifecycle: Mutex::new(()),
                snapshot_tx,
                transport,
                source,
                config,
            }),
        }
    }

    /// Observable stream of attempt snapshots.
    pub fn subscribe(&self) -> watch::Receiver<AttemptSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.inner.attempt.lock().await.session_id.clone()
    }

    pub async fn attempt_metrics(&self) -> AttemptMetrics {
        self.inner.metrics.get_snapshot().await
    }

    pub async fn is_capturing(&self) -> bool {
        self.inner.scheduler.lock().await.is_running()
    }

    /// Starts a fresh attempt, ending any attempt already in progress.
    ///
    /// Returns once the challenge sequence has been requested and the
    /// capture loop is running; progress is reported through [`subscribe`].
    ///
    /// [`subscribe`]: LivenessOrchestrator::subscribe
    pub async fn start_attempt(&self) -> Result<SessionId, LivenessError> {
        let inner = &self.inner;

        let (session_id, attempt_token) = {
            let _lifecycle = inner.lifecycle.lock().await;
            inner.stop_attempt().await;

            let attempt_id = Uuid::new_v4();
            log_info!("starting verification attempt {}", attempt_id);

            match inner.sessions.start().await {
                Ok(session_id) => {
                    let token = CancellationToken::new();
                    let mut attempt = inner.attempt.lock().await;
                    attempt.attempt_id = Some(attempt_id);
                    attempt.session_id = Some(session_id.clone());
                    attempt.attempt_token = Some(token.clone());
                    (session_id, token)
                }
                Err(err) => {
                    log_error!("attempt {} aborted: {}", attempt_id, err);
                    let mut attempt = inner.attempt.lock().await;
                    attempt.failure = Some(err.clone());
                    inner.publish(attempt.snapshot());
                    return Err(err);
                }
            }
        };

        // Camera access only begins once a session exists.
        let readiness = wait_until_ready(
            inner.source.as_ref(),
            inner.config.capture_ready_timeout,
            inner.config.capture_ready_poll,
        )
        .await;
        inner.ensure_current(&session_id).await?;
        if let Err(err) = readiness {
            inner.report_error(&session_id, err.clone()).await;
            return Err(err);
        }

        let reference = match grab_reference(Arc::clone(&inner.source)).await {
            Ok(frame) => ReferenceImage::new(frame),
            Err(err) => {
                let err = LivenessError::CaptureUnavailable(format!("{err:#}"));
                inner.report_error(&session_id, err.clone()).await;
                return Err(err);
            }
        };

        {
            let mut attempt = inner.attempt.lock().await;
            if !attempt.owns(&session_id) {
                return Err(LivenessError::Cancelled);
            }
            attempt.machine.begin_challenge();
            attempt.reference = Some(reference);
            inner.publish(attempt.snapshot());
        }
        inner.voice.say(PROMPT_LOOK_AT_CAMERA);

        let started = inner.transport.start_challenge(&session_id).await;
        inner.ensure_current(&session_id).await?;
        match started {
            Ok(response) if response.success => {
                inner
                    .handle_response(&session_id, Ok(response), ResponsePath::ChallengeStart)
                    .await;
            }
            Ok(response) if response.session_invalid() => {
                let err = invalidated(&session_id);
                inner.report_error(&session_id, err.clone()).await;
                return Err(err);
            }
            Ok(response) => {
                let err = LivenessError::ChallengeStart(
                    response
                        .error
                        .unwrap_or_else(|| "service refused to start the challenge".into()),
                );
                inner.report_error(&session_id, err.clone()).await;
                return Err(err);
            }
            Err(TransportError::SessionNotFound) => {
                let err = invalidated(&session_id);
                inner.report_error(&session_id, err.clone()).await;
                return Err(err);
            }
            Err(err) => {
                let err = LivenessError::ChallengeStart(err.to_string());
                inner.report_error(&session_id, err.clone()).await;
                return Err(err);
            }
        }

        let driver = Arc::new(AttemptDriver {
            inner: Arc::clone(inner),
            session_id: session_id.clone(),
        });

        // Same lock order as stop_attempt: scheduler, then attempt.
        let mut scheduler = inner.scheduler.lock().await;
        let loop_token = {
            let mut attempt = inner.attempt.lock().await;
            if !attempt.owns(&session_id) || attempt_token.is_cancelled() {
                log_info!("attempt for session {} was superseded while starting", session_id);
                return Err(LivenessError::Cancelled);
            }
            // The initial snapshot may already be terminal.
            if !attempt.is_running() {
                return Ok(session_id);
            }
            let token = attempt_token.child_token();
            attempt.loop_token = Some(token.clone());
            token
        };

        if let Err(err) = scheduler.start(
            session_id.clone(),
            Arc::clone(&inner.source),
            driver.clone(),
            loop_token.clone(),
        ) {
            drop(scheduler);
            let err = LivenessError::CaptureUnavailable(format!("{err:#}"));
            inner.report_error(&session_id, err.clone()).await;
            return Err(err);
        }

        if let Some(interval) = inner.config.status_poll_interval {
            inner.poller.lock().await.start(
                session_id.clone(),
                interval,
                driver,
                loop_token.child_token(),
            );
        }

        Ok(session_id)
    }

    /// Reference image captured for the current attempt, if any.
    pub async fn reference_image(&self) -> Option<ReferenceImage> {
        self.inner.attempt.lock().await.reference.clone()
    }

    /// Abandons the current attempt from any state and returns to idle.
    pub async fn reset_attempt(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.stop_attempt().await;
        log_info!("attempt reset");
    }

    /// Ends everything this orchestrator owns, including the voice worker.
    pub async fn teardown(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.stop_attempt().await;
        self.inner.voice.shutdown();
        log_info!("orchestrator torn down");
    }
}

impl Inner {
    fn publish(&self, snapshot: AttemptSnapshot) {
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    async fn ensure_current(&self, session_id: &SessionId) -> Result<(), LivenessError> {
        if self.attempt.lock().await.owns(session_id) {
            Ok(())
        } else {
            log_info!("attempt for session {} was superseded while starting", session_id);
            Err(LivenessError::Cancelled)
        }
    }

    /// Cancels the capture loop and status poll of `session_id`'s attempt.
    /// A completion already underway keeps running.
    async fn cancel_loops(&self, session_id: &SessionId) {
        let attempt = self.attempt.lock().await;
        if !attempt.owns(session_id) {
            return;
        }
        if let Some(token) = &attempt.loop_token {
            token.cancel();
        }
    }

    /// Stops loops, abandons any completion, ends the live session and clears
    /// every per-attempt latch.
    async fn stop_attempt(&self) {
        let token = {
            let mut attempt = self.attempt.lock().await;
            attempt.loop_token = None;
            attempt.attempt_token.take()
        };
        if let Some(token) = token {
            token.cancel();
        }

        if let Err(err) = self.scheduler.lock().await.stop().await {
            log_warn!("capture loop did not stop cleanly: {err:#}");
        }
        if let Err(err) = self.poller.lock().await.stop().await {
            log_warn!("status poll did not stop cleanly: {err:#}");
        }

        {
            let mut attempt = self.attempt.lock().await;
            if let Some(attempt_id) = attempt.attempt_id {
                log_debug!("clearing state of attempt {}", attempt_id);
            }
            attempt.clear();
        }

        self.completion.reset();
        self.metrics.reset().await;
        self.voice.cancel();

        if let Some(session_id) = self.sessions.current().await {
            self.sessions.end(&session_id).await;
        }

        self.publish(AttemptSnapshot::Idle);
    }

    /// Routes an error raised for `session_id`'s attempt. Transient errors are
    /// only logged; anything fatal is recorded and releases the session.
    /// Running loops see a failure on their next tick; callers inside a loop
    /// cancel it afterwards.
    async fn report_error(&self, session_id: &SessionId, err: LivenessError) {
        if !err.is_fatal() {
            log_warn!("session {}: {}", session_id, err);
            return;
        }

        {
            let mut attempt = self.attempt.lock().await;
            if !attempt.owns(session_id) {
                return;
            }
            log_error!("attempt for session {} failed: {}", session_id, err);
            attempt.failure = Some(err.clone());
            self.publish(attempt.snapshot());
        }

        match err {
            LivenessError::SessionInvalidated { .. } => self.sessions.forget(session_id).await,
            _ => self.sessions.end(session_id).await,
        }
    }

    async fn handle_response(
        self: &Arc<Self>,
        session_id: &SessionId,
        response: Result<ProgressResponse, TransportError>,
        path: ResponsePath,
    ) -> Handled {
        let signal = interpret(&response);

        let mut attempt = self.attempt.lock().await;
        if !attempt.owns(session_id) || attempt.failure.is_some() {
            log_debug!("dropping response for stale session {}", session_id);
            return Handled::Stale;
        }

        if let Signal::TransientError(reason) = &signal {
            if path != ResponsePath::Frame {
                log_warn!("status request for session {} failed: {}", session_id, reason);
                return Handled::Transient;
            }

            attempt.consecutive_frame_errors += 1;
            let count = attempt.consecutive_frame_errors;
            drop(attempt);

            let limit = self.config.max_consecutive_frame_errors;
            if limit > 0 && count >= limit {
                self.report_error(session_id, LivenessError::FrameErrorsExhausted { count })
                    .await;
                return Handled::Finished;
            }
            self.report_error(
                session_id,
                LivenessError::TransientFrame(format!("submission {count} failed: {reason}")),
            )
            .await;
            return Handled::Transient;
        }

        if path == ResponsePath::Frame {
            attempt.consecutive_frame_errors = 0;
        }

        let effect = attempt.machine.apply(signal);
        self.publish(attempt.snapshot());

        match effect {
            Effect::None => Handled::Applied,
            Effect::Prompt(text) => {
                drop(attempt);
                self.voice.say(&text);
                Handled::Applied
            }
            Effect::Passed(outcome) => {
                let reference = attempt.reference.clone();
                let cancel = attempt.child_token();
                drop(attempt);

                log_info!("session {} passed liveness", session_id);
                self.voice.say(PROMPT_PASSED);
                self.spawn_completion(session_id.clone(), reference, outcome, cancel);
                Handled::Finished
            }
            Effect::Failed(outcome) => {
                drop(attempt);

                log_info!(
                    "session {} failed liveness (success rate {:?})",
                    session_id,
                    outcome.stats.as_ref().and_then(|stats| stats.success_rate)
                );
                self.voice.say(PROMPT_FAILED);
                Handled::Finished
            }
            Effect::SessionInvalidated => {
                drop(attempt);
                self.report_error(session_id, invalidated(session_id)).await;
                Handled::Finished
            }
        }
    }

    /// Runs the match-or-enroll step off the loop. `cancel` is a child of the
    /// attempt token, so a reset abandons the step before it enrolls.
    fn spawn_completion(
        self: &Arc<Self>,
        session_id: SessionId,
        reference: Option<ReferenceImage>,
        outcome: VerificationOutcome,
        cancel: CancellationToken,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = match reference {
                Some(reference) => {
                    inner
                        .completion
                        .complete(&session_id, &reference, &outcome, &cancel)
                        .await
                }
                None => Some(Err(LivenessError::VerificationPipeline(
                    "no reference image captured for this attempt".into(),
                ))),
            };
            let result = match result {
                None => {
                    log_debug!("completion already ran for session {}", session_id);
                    return;
                }
                Some(Err(LivenessError::Cancelled)) => return,
                Some(result) => result,
            };

            let mut attempt = inner.attempt.lock().await;
            if !attempt.owns(&session_id) {
                log_info!("discarding completion result for stale session {}", session_id);
                return;
            }
            match result {
                Ok(enrollment) => attempt.enrollment = Some(enrollment),
                Err(err) => attempt.failure = Some(err),
            }
            inner.publish(attempt.snapshot());
        });
    }
}

async fn grab_reference(source: Arc<dyn CaptureSource>) -> anyhow::Result<CaptureFrame> {
    tokio::task::spawn_blocking(move || source.grab_frame())
        .await
        .context("reference frame worker join failed")?
        .context("reference frame capture failed")
}

fn invalidated(session_id: &SessionId) -> LivenessError {
    LivenessError::SessionInvalidated {
        session_id: session_id.to_string(),
    }
}

/// Binds the capture loop and status poll to one session identifier.
struct AttemptDriver {
    inner: Arc<Inner>,
    session_id: SessionId,
}

impl AttemptDriver {
    async fn still_running(&self) -> bool {
        let attempt = self.inner.attempt.lock().await;
        attempt.owns(&self.session_id) && attempt.is_running()
    }
}

#[async_trait]
impl FrameProcessor for AttemptDriver {
    async fn is_active(&self) -> bool {
        self.still_running().await
    }

    async fn process_frame(&self, frame: CaptureFrame) -> TickOutcome {
        let started = Instant::now();
        let frame_bytes = frame.len();
        let response = self
            .inner
            .transport
            .submit_frame(&self.session_id, &frame)
            .await;
        let round_trip_ms = started.elapsed().as_millis() as u64;
        let failed = response.is_err() || response.as_ref().map(|r| !r.success).unwrap_or(false);

        let handled = self
            .inner
            .handle_response(&self.session_id, response, ResponsePath::Frame)
            .await;

        self.inner
            .metrics
            .record_submission(SubmissionMetrics {
                timestamp: Utc::now(),
                frame_bytes,
                round_trip_ms,
                failed,
                discarded: handled == Handled::Stale,
            })
            .await;

        if handled == Handled::Finished {
            self.inner.cancel_loops(&self.session_id).await;
        }
        handled.tick_outcome()
    }
}

#[async_trait]
impl StatusReader for AttemptDriver {
    async fn is_active(&self) -> bool {
        self.still_running().await
    }

    async fn poll_status(&self) -> TickOutcome {
        let response = self.inner.transport.poll_status(&self.session_id).await;
        self.inner.metrics.record_poll().await;
        let handled = self
            .inner
            .handle_response(&self.session_id, response, ResponsePath::Poll)
            .await;

        if handled == Handled::Finished {
            self.inner.cancel_loops(&self.session_id).await;
        }
        handled.tick_outcome()
    }
}
