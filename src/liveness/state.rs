use serde::Serialize;

use crate::models::{ChallengeTask, VerificationOutcome};

use super::interpreter::Signal;
use super::mirror::mirror_directions;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum TaskPhase {
    Idle,
    AwaitingChallenge,
    ChallengeActive { task: ChallengeTask },
    Terminal { outcome: VerificationOutcome },
}

impl Default for TaskPhase {
    fn default() -> Self {
        TaskPhase::Idle
    }
}

/// What the caller must do after a signal has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Speak this (already mirrored) instruction.
    Prompt(String),
    Passed(VerificationOutcome),
    Failed(VerificationOutcome),
    SessionInvalidated,
}

/// Challenge progress for one attempt.
///
/// Shared by the frame path and the status-poll path so both consult the same
/// prompt de-duplication key. Terminal phases are sticky until [`reset`].
///
/// [`reset`]: TaskStateMachine::reset
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    phase: TaskPhase,
    last_prompted: Option<String>,
    mirror: bool,
}

impl TaskStateMachine {
    pub fn new(mirror: bool) -> Self {
        Self {
            phase: TaskPhase::Idle,
            last_prompted: None,
            mirror,
        }
    }

    pub fn phase(&self) -> &TaskPhase {
        &self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, TaskPhase::Terminal { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, TaskPhase::Idle)
    }

    pub fn current_task(&self) -> Option<&ChallengeTask> {
        match &self.phase {
            TaskPhase::ChallengeActive { task } => Some(task),
            _ => None,
        }
    }

    pub fn last_prompted(&self) -> Option<&str> {
        self.last_prompted.as_deref()
    }

    /// Text shown and spoken for a task.
    pub fn display_text(&self, task: &ChallengeTask) -> String {
        if self.mirror {
            mirror_directions(&task.description)
        } else {
            task.description.clone()
        }
    }

    /// Idle -> AwaitingChallenge. Returns false from any other phase.
    pub fn begin_challenge(&mut self) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.phase = TaskPhase::AwaitingChallenge;
        true
    }

    pub fn apply(&mut self, signal: Signal) -> Effect {
        if self.is_idle() || self.is_terminal() {
            return Effect::None;
        }

        match signal {
            Signal::SessionInvalid => Effect::SessionInvalidated,
            Signal::Terminal(outcome) => {
                self.phase = TaskPhase::Terminal {
                    outcome: outcome.clone(),
                };
                if outcome.passed {
                    Effect::Passed(outcome)
                } else {
                    Effect::Failed(outcome)
                }
            }
            Signal::ChallengeActive(task) => self.enter_task(task),
            Signal::NoFace | Signal::NoChange | Signal::TransientError(_) => Effect::None,
        }
    }

    fn enter_task(&mut self, mut task: ChallengeTask) -> Effect {
        if let Some(current) = self.current_task() {
            if current.same_directive(&task) {
                task.time_remaining_secs = task.time_remaining_secs.min(current.time_remaining_secs);
            }
        }

        let is_new = self.last_prompted.as_deref() != Some(task.description.as_str());
        let prompt = is_new.then(|| self.display_text(&task));
        if is_new {
            self.last_prompted = Some(task.description.clone());
        }
        self.phase = TaskPhase::ChallengeActive { task };

        prompt.map(Effect::Prompt).unwrap_or(Effect::None)
    }

    pub fn reset(&mut self) {
        self.phase = TaskPhase::Idle;
        self.last_prompted = None;
    }
}
