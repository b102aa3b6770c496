use std::sync::Arc;

use chrono::{DateTime, Utc};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// One encoded still pulled from the capture source.
///
/// The payload is reference counted so a frame can be handed to the transport
/// and kept as the reference image without copying the bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    pub data: Arc<[u8]>,
    pub content_type: String,
    pub captured_at: DateTime<Utc>,
}

impl CaptureFrame {
    pub fn new(data: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            captured_at: Utc::now(),
        }
    }

    pub fn jpeg(data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(data, JPEG_CONTENT_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The frame captured immediately before the challenge sequence starts.
/// Used once, by the completion step, for face search or enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage(CaptureFrame);

impl ReferenceImage {
    pub fn new(frame: CaptureFrame) -> Self {
        Self(frame)
    }

    pub fn frame(&self) -> &CaptureFrame {
        &self.0
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.0.captured_at
    }
}
