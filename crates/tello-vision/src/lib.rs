pub mod calibration;
pub mod decoder;
pub mod doctor;
pub mod source;

use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use calibration::CameraCalibration;
pub use decoder::{DecoderConfig, FfmpegSource};
pub use source::{FrameSource, Interrupter};

/// A decoded video frame. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    /// Position in the decode sequence, starting at 1.
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self { image: Arc::new(image), seq }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Pixel rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f32,
    pub left: f32,
    pub height: f32,
    pub width: f32,
}

impl BoundingBox {
    /// Axis-aligned box enclosing a set of corner points `(x, y)`.
    pub fn from_corners(corners: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = corners.split_first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        Some(Self { top: y0, left: x0, height: y1 - y0, width: x1 - x0 })
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Recognized name, or marker id for fiducials.
    pub label: String,
    pub bbox: BoundingBox,
    pub distance_cm: Option<f32>,
}

/// A pattern detector (faces, markers). Works on one frame at a time and keeps
/// no per-stream state inside the link layer.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}
