#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::watch;

use liveness_orchestrator::capture::CaptureSource;
use liveness_orchestrator::config::OrchestratorConfig;
use liveness_orchestrator::models::{CaptureFrame, ReferenceImage, SessionAction, SessionId};
use liveness_orchestrator::transport::{
    AckResponse, CreateSessionResponse, EnrollMetadata, FaceMatch, ProgressResponse,
    ResultDescriptor, TaskDescriptor, TaskSessionDescriptor, TransportError,
    VerificationTransport,
};
use liveness_orchestrator::{AttemptSnapshot, SpeechBackend};

pub type Reply = Result<ProgressResponse, TransportError>;

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        min_capture_interval: Duration::from_millis(10),
        capture_ready_timeout: Duration::from_millis(200),
        capture_ready_poll: Duration::from_millis(5),
        status_poll_interval: None,
        ..OrchestratorConfig::default()
    }
}

pub fn face_missing() -> Reply {
    Ok(ProgressResponse {
        face_detected: Some(false),
        ..ProgressResponse::default()
    })
}

pub fn task(description: &str, index: u32, remaining: f64) -> Reply {
    Ok(ProgressResponse {
        face_detected: Some(true),
        current_task: Some(TaskDescriptor {
            description: description.to_string(),
            time_remaining: Some(remaining),
            index: Some(index),
            total: Some(3),
        }),
        task_session: Some(TaskSessionDescriptor {
            active: true,
            current_index: Some(index),
            total_tasks: Some(3),
        }),
        ..ProgressResponse::default()
    })
}

pub fn finished(passed: bool) -> Reply {
    Ok(ProgressResponse {
        task_session: Some(TaskSessionDescriptor {
            active: false,
            current_index: Some(3),
            total_tasks: Some(3),
        }),
        result: Some(ResultDescriptor {
            final_result: passed,
            success_rate: Some(if passed { 1.0 } else { 0.33 }),
            passed_tasks: Some(if passed { 3 } else { 1 }),
            total_tasks: Some(3),
        }),
        ..ProgressResponse::default()
    })
}

/// In-memory verification service with queued replies.
///
/// Empty queues fall back to a benign "frame accepted" reply.
pub struct ScriptedTransport {
    created: AtomicUsize,
    create_error: Mutex<Option<TransportError>>,
    challenge_reply: Mutex<Option<Reply>>,
    frame_replies: Mutex<VecDeque<Reply>>,
    frame_fallback: Mutex<Reply>,
    poll_replies: Mutex<VecDeque<Reply>>,
    frame_latency: Mutex<Vec<Duration>>,
    search_result: Mutex<Option<FaceMatch>>,
    search_latency: Mutex<Duration>,
    pub frames: AtomicUsize,
    pub polls: AtomicUsize,
    pub searches: AtomicUsize,
    pub enrolls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub ended: Mutex<Vec<(SessionId, SessionAction)>>,
    pub enrolled_names: Mutex<Vec<String>>,
    pub frame_sessions: Mutex<Vec<SessionId>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            create_error: Mutex::new(None),
            challenge_reply: Mutex::new(None),
            frame_replies: Mutex::new(VecDeque::new()),
            frame_fallback: Mutex::new(Ok(ProgressResponse::default())),
            poll_replies: Mutex::new(VecDeque::new()),
            frame_latency: Mutex::new(Vec::new()),
            search_result: Mutex::new(None),
            search_latency: Mutex::new(Duration::from_millis(20)),
            frames: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            enrolls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            ended: Mutex::new(Vec::new()),
            enrolled_names: Mutex::new(Vec::new()),
            frame_sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_create(&self, err: TransportError) {
        *self.create_error.lock().unwrap() = Some(err);
    }

    pub fn on_challenge(&self, reply: Reply) {
        *self.challenge_reply.lock().unwrap() = Some(reply);
    }

    pub fn queue_frames(&self, replies: impl IntoIterator<Item = Reply>) {
        self.frame_replies.lock().unwrap().extend(replies);
    }

    pub fn frame_fallback(&self, reply: Reply) {
        *self.frame_fallback.lock().unwrap() = reply;
    }

    pub fn queue_polls(&self, replies: impl IntoIterator<Item = Reply>) {
        self.poll_replies.lock().unwrap().extend(replies);
    }

    /// Latencies are applied round-robin to frame submissions.
    pub fn frame_latency(&self, latencies: Vec<Duration>) {
        *self.frame_latency.lock().unwrap() = latencies;
    }

    pub fn search_returns(&self, found: Option<FaceMatch>) {
        *self.search_result.lock().unwrap() = found;
    }

    pub fn search_latency(&self, latency: Duration) {
        *self.search_latency.lock().unwrap() = latency;
    }

    pub fn frame_count(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn ended_sessions(&self) -> Vec<SessionId> {
        self.ended
            .lock()
            .unwrap()
            .iter()
            .map(|(session_id, _)| session_id.clone())
            .collect()
    }
}

#[async_trait]
impl VerificationTransport for ScriptedTransport {
    async fn create_session(&self) -> Result<CreateSessionResponse, TransportError> {
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(err);
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreateSessionResponse {
            success: true,
            session_id: Some(format!("sid-{n}")),
            error: None,
        })
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
        action: SessionAction,
    ) -> Result<AckResponse, TransportError> {
        self.ended.lock().unwrap().push((session_id.clone(), action));
        Ok(AckResponse {
            success: true,
            error: None,
        })
    }

    async fn start_challenge(&self, _session_id: &SessionId) -> Reply {
        self.challenge_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(ProgressResponse::default()))
    }

    async fn submit_frame(&self, session_id: &SessionId, _frame: &CaptureFrame) -> Reply {
        let n = self.frames.fetch_add(1, Ordering::SeqCst);
        self.frame_sessions.lock().unwrap().push(session_id.clone());

        // Taken up front so an abandoned request still consumes its reply.
        let queued = self.frame_replies.lock().unwrap().pop_front();
        let reply = queued.unwrap_or_else(|| self.frame_fallback.lock().unwrap().clone());

        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);

        let latency = {
            let latencies = self.frame_latency.lock().unwrap();
            if latencies.is_empty() {
                None
            } else {
                Some(latencies[n % latencies.len()])
            }
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    async fn poll_status(&self, _session_id: &SessionId) -> Reply {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.poll_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ProgressResponse::default()))
    }

    async fn search_face(&self, _image: &ReferenceImage) -> Result<Option<FaceMatch>, TransportError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let latency = *self.search_latency.lock().unwrap();
        tokio::time::sleep(latency).await;
        Ok(self.search_result.lock().unwrap().clone())
    }

    async fn enroll_face(
        &self,
        _image: &ReferenceImage,
        display_name: &str,
        _metadata: &EnrollMetadata,
    ) -> Result<String, TransportError> {
        self.enrolls.fetch_add(1, Ordering::SeqCst);
        self.enrolled_names
            .lock()
            .unwrap()
            .push(display_name.to_string());
        Ok("identity-new".to_string())
    }
}

/// Camera double that counts every access.
pub struct FakeCamera {
    ready: AtomicBool,
    pub readiness_checks: AtomicUsize,
    pub grabs: AtomicUsize,
}

impl FakeCamera {
    pub fn ready() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            readiness_checks: AtomicUsize::new(0),
            grabs: AtomicUsize::new(0),
        })
    }

    pub fn offline() -> Arc<Self> {
        let camera = Self::ready();
        camera.ready.store(false, Ordering::SeqCst);
        camera
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn accessed(&self) -> bool {
        self.readiness_checks.load(Ordering::SeqCst) > 0 || self.grab_count() > 0
    }
}

impl CaptureSource for FakeCamera {
    fn is_ready(&self) -> bool {
        self.readiness_checks.fetch_add(1, Ordering::SeqCst);
        self.ready.load(Ordering::SeqCst)
    }

    fn grab_frame(&self) -> Result<CaptureFrame> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        if !self.ready.load(Ordering::SeqCst) {
            bail!("camera offline");
        }
        Ok(CaptureFrame::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9]))
    }
}

#[derive(Default)]
pub struct RecordingSpeech {
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechBackend for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Waits until the published snapshot satisfies `predicate`.
pub async fn wait_for_snapshot(
    rx: &mut watch::Receiver<AttemptSnapshot>,
    predicate: impl FnMut(&AttemptSnapshot) -> bool,
) -> AttemptSnapshot {
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed");
    snapshot.clone()
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
