use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "LIVENESS_";

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Minimum spacing between the starts of two frame submissions.
    #[serde(with = "millis")]
    pub min_capture_interval: Duration,
    /// Upper bound on waiting for the capture source to report ready.
    #[serde(with = "millis")]
    pub capture_ready_timeout: Duration,
    #[serde(with = "millis")]
    pub capture_ready_poll: Duration,
    /// When set, progress is also polled on this interval alongside the
    /// status embedded in frame responses.
    #[serde(with = "optional_millis")]
    pub status_poll_interval: Option<Duration>,
    /// Consecutive failed submissions tolerated before the attempt fails.
    /// Zero disables escalation.
    pub max_consecutive_frame_errors: u32,
    pub mirror_directions: bool,
    pub voice_enabled: bool,
    pub enroll_name_prefix: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_capture_interval: Duration::from_millis(300),
            capture_ready_timeout: Duration::from_secs(10),
            capture_ready_poll: Duration::from_millis(100),
            status_poll_interval: None,
            max_consecutive_frame_errors: 5,
            mirror_directions: true,
            voice_enabled: true,
            enroll_name_prefix: "User".into(),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overlaid with `LIVENESS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse orchestrator config")
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("MIN_CAPTURE_INTERVAL_MS") {
            config.min_capture_interval = parse_millis("MIN_CAPTURE_INTERVAL_MS", &value)?;
        }
        if let Some(value) = var("CAPTURE_READY_TIMEOUT_MS") {
            config.capture_ready_timeout = parse_millis("CAPTURE_READY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("STATUS_POLL_INTERVAL_MS") {
            let interval = parse_millis("STATUS_POLL_INTERVAL_MS", &value)?;
            config.status_poll_interval = (!interval.is_zero()).then_some(interval);
        }
        if let Some(value) = var("MAX_FRAME_ERRORS") {
            config.max_consecutive_frame_errors = value
                .trim()
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}MAX_FRAME_ERRORS '{value}'"))?;
        }
        if let Some(value) = var("MIRROR") {
            config.mirror_directions = parse_flag(&value);
        }
        if let Some(value) = var("VOICE") {
            config.voice_enabled = parse_flag(&value);
        }
        if let Some(value) = var("ENROLL_PREFIX") {
            if !value.trim().is_empty() {
                config.enroll_name_prefix = value.trim().to_string();
            }
        }

        Ok(config)
    }
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .with_context(|| format!("invalid {ENV_PREFIX}{name} '{value}'"))
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

pub(crate) mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
