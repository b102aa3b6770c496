use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};

use crate::models::CaptureFrame;

use super::CaptureSource;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Encodes a raw RGB still as a JPEG capture frame.
pub fn encode_frame(image: &RgbImage, quality: u8) -> Result<CaptureFrame> {
    let mut bytes = Cursor::new(Vec::with_capacity(image.as_raw().len() / 8));
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(image)
        .context("jpeg encoding failed")?;
    Ok(CaptureFrame::jpeg(bytes.into_inner()))
}

/// Capture source that replays one fixed image, e.g. a kiosk still or a
/// frame decoded from disk.
pub struct StillFrameSource {
    image: RgbImage,
    quality: u8,
    ready: AtomicBool,
}

impl StillFrameSource {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            quality: DEFAULT_JPEG_QUALITY,
            ready: AtomicBool::new(true),
        }
    }

    /// Decodes any format the `image` crate understands.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).context("failed to decode still image")?;
        Ok(Self::new(DynamicImage::to_rgb8(&decoded)))
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl CaptureSource for StillFrameSource {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn grab_frame(&self) -> Result<CaptureFrame> {
        if !self.is_ready() {
            bail!("capture source is not ready");
        }
        encode_frame(&self.image, self.quality)
    }
}
