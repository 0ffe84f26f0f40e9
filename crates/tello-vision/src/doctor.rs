use anyhow::{Context, Result};
use std::process::{Command, Stdio};

use crate::calibration::CameraCalibration;
use crate::decoder::DecoderConfig;

pub fn check_ffmpeg(cfg: &DecoderConfig) -> Result<()> {
    let status = Command::new(&cfg.ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("run {} -version", cfg.ffmpeg))?;
    anyhow::ensure!(status.success(), "{} -version failed", cfg.ffmpeg);
    Ok(())
}

pub fn check_decoder(cfg: &DecoderConfig) -> Result<()> {
    anyhow::ensure!(
        matches!((cfg.width, cfg.height), (960, 720) | (1280, 720)),
        "video resolution {}x{} is not a known firmware output (960x720 or 1280x720)",
        cfg.width, cfg.height
    );
    anyhow::ensure!(!cfg.url.is_empty(), "video.url empty");
    Ok(())
}

pub fn check_calibration(cal: &CameraCalibration, cfg: &DecoderConfig) -> Result<()> {
    anyhow::ensure!(cal.fx > 0.0 && cal.fy > 0.0, "camera focal lengths must be positive");
    anyhow::ensure!(cal.marker_size_cm > 0.0, "camera.marker_size_cm must be positive");
    anyhow::ensure!(
        cal.width == cfg.width && cal.height == cfg.height,
        "camera calibration is for {}x{} but video decodes {}x{}",
        cal.width, cal.height, cfg.width, cfg.height
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_resolutions() {
        assert!(check_decoder(&DecoderConfig::default()).is_ok());
        let odd = DecoderConfig { width: 640, height: 480, ..DecoderConfig::default() };
        assert!(check_decoder(&odd).is_err());
    }

    #[test]
    fn calibration_must_match_stream() {
        let cfg = DecoderConfig::default();
        assert!(check_calibration(&CameraCalibration::tello_960x720(), &cfg).is_ok());
        assert!(check_calibration(&CameraCalibration::tello_1280x720(), &cfg).is_err());
    }
}
