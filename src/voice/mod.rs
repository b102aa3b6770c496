//! Spoken feedback with at most one utterance active at a time.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const PROMPT_LOOK_AT_CAMERA: &str = "Please look at the camera";
pub const PROMPT_PASSED: &str = "Verification passed";
pub const PROMPT_FAILED: &str = "Verification failed, please try again";

/// Text-to-speech engine. `speak` resolves once the utterance has finished;
/// dropping the future abandons it.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    /// Silences any audio still playing after `speak` was abandoned.
    fn stop(&self) {}
}

/// Backend for headless deployments: prompts go to the log.
pub struct LogSpeech;

#[async_trait]
impl SpeechBackend for LogSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        log_info!("voice prompt: {}", text);
        Ok(())
    }
}

enum VoiceCommand {
    Say(String),
    Cancel,
    Shutdown,
}

/// Owns the speech worker; newer utterances preempt older ones.
pub struct VoiceCoordinator {
    backend: Arc<dyn SpeechBackend>,
    tx: Mutex<Option<UnboundedSender<VoiceCommand>>>,
    last_spoken: Mutex<Option<String>>,
    enabled: bool,
}

impl VoiceCoordinator {
    pub fn new(backend: Arc<dyn SpeechBackend>, enabled: bool) -> Self {
        Self {
            backend,
            tx: Mutex::new(None),
            last_spoken: Mutex::new(None),
            enabled,
        }
    }

    fn ensure_worker(&self) -> UnboundedSender<VoiceCommand> {
        let mut guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = guard.as_ref().filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(voice_worker(Arc::clone(&self.backend), rx));
        *guard = Some(tx.clone());
        tx
    }

    /// Fire-and-forget. An immediate repeat of the last text is suppressed.
    pub fn say(&self, text: &str) {
        if !self.enabled || text.trim().is_empty() {
            return;
        }

        {
            let mut last = self
                .last_spoken
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.as_deref() == Some(text) {
                log_debug!("suppressing repeated prompt '{}'", text);
                return;
            }
            *last = Some(text.to_string());
        }

        let _ = self.ensure_worker().send(VoiceCommand::Say(text.to_string()));
    }

    /// Stops the current utterance and forgets the last spoken text.
    pub fn cancel(&self) {
        *self
            .last_spoken
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

        let guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(VoiceCommand::Cancel);
        }
    }

    pub fn shutdown(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(VoiceCommand::Shutdown);
        }
    }
}

impl Drop for VoiceCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn voice_worker(backend: Arc<dyn SpeechBackend>, mut rx: UnboundedReceiver<VoiceCommand>) {
    let mut pending: Option<String> = None;

    loop {
        let text = match pending.take() {
            Some(text) => text,
            None => match rx.recv().await {
                Some(VoiceCommand::Say(text)) => text,
                Some(VoiceCommand::Cancel) => continue,
                Some(VoiceCommand::Shutdown) | None => break,
            },
        };

        let utterance = backend.speak(&text);
        tokio::pin!(utterance);

        tokio::select! {
            biased;
            result = &mut utterance => {
                if let Err(err) = result {
                    log_warn!("speech backend failed for '{}': {err:#}", text);
                }
            }
            command = rx.recv() => {
                backend.stop();
                match command {
                    Some(VoiceCommand::Say(next)) => pending = Some(next),
                    Some(VoiceCommand::Cancel) => {}
                    Some(VoiceCommand::Shutdown) | None => break,
                }
            }
        }
    }
}
