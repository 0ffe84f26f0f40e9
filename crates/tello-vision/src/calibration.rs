use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of the forward camera at a given output resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// k1, k2, p1, p2, k3
    pub distortion: [f64; 5],
    /// Printed edge length of the fiducial markers in use.
    pub marker_size_cm: f64,
}

impl CameraCalibration {
    /// Firmware variants streaming 1280x720.
    pub fn tello_1280x720() -> Self {
        Self {
            width: 1280,
            height: 720,
            fx: 921.170702,
            fy: 919.018377,
            cx: 459.904354,
            cy: 351.238301,
            distortion: [-0.033458, 0.105152, 0.001256, -0.006647, 0.0],
            marker_size_cm: 8.89,
        }
    }

    /// Firmware variants streaming 960x720: same sensor, horizontal axis scaled.
    pub fn tello_960x720() -> Self {
        let base = Self::tello_1280x720();
        let sx = 960.0 / 1280.0;
        Self { width: 960, fx: base.fx * sx, cx: base.cx * sx, ..base }
    }

    pub fn for_resolution(width: u32, height: u32) -> Option<Self> {
        match (width, height) {
            (1280, 720) => Some(Self::tello_1280x720()),
            (960, 720) => Some(Self::tello_960x720()),
            _ => None,
        }
    }

    /// Distance to an object of known size from its apparent width in pixels.
    pub fn estimate_distance_cm(&self, real_size_cm: f64, apparent_px: f64) -> Option<f64> {
        if apparent_px <= 0.0 || !apparent_px.is_finite() { return None; }
        Some(self.fx * real_size_cm / apparent_px)
    }

    pub fn marker_distance_cm(&self, apparent_px: f64) -> Option<f64> {
        self.estimate_distance_cm(self.marker_size_cm, apparent_px)
    }
}

impl Default for CameraCalibration {
    fn default() -> Self {
        Self::tello_960x720()
    }
}
