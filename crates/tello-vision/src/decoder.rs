use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::source::{FrameSource, Interrupter};

const RESPAWN_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// ffmpeg executable
    pub ffmpeg: String,
    /// Stream input, e.g. "udp://0.0.0.0:11111"
    pub url: String,
    /// Output size. 960x720 or 1280x720 depending on firmware.
    pub width: u32,
    pub height: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            url: "udp://0.0.0.0:11111".into(),
            width: 960,
            height: 720,
        }
    }
}

impl DecoderConfig {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Decodes the H.264 stream by running ffmpeg and reading raw rgb24 frames
/// from its stdout. A dead decoder is respawned on the next pull.
pub struct FfmpegSource {
    cfg: DecoderConfig,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
    buf: Vec<u8>,
    interrupted: Arc<AtomicBool>,
    respawn_at: Option<Instant>,
}

fn lock(child: &Mutex<Option<Child>>) -> MutexGuard<'_, Option<Child>> {
    child.lock().unwrap_or_else(|e| e.into_inner())
}

impl FfmpegSource {
    pub fn spawn(cfg: DecoderConfig) -> Result<Self> {
        anyhow::ensure!(cfg.width > 0 && cfg.height > 0, "video dimensions must be non-zero");
        let mut src = Self {
            buf: vec![0u8; cfg.frame_bytes()],
            cfg,
            child: Arc::new(Mutex::new(None)),
            stdout: None,
            interrupted: Arc::new(AtomicBool::new(false)),
            respawn_at: None,
        };
        src.launch()?;
        info!("video: decoding {} at {}x{}", src.cfg.url, src.cfg.width, src.cfg.height);
        Ok(src)
    }

    fn launch(&mut self) -> Result<()> {
        // ffmpeg -i udp://0.0.0.0:11111 -vf scale=WxH -f rawvideo -pix_fmt rgb24 -
        let mut cmd = Command::new(&self.cfg.ffmpeg);
        cmd.args([
            "-hide_banner", "-loglevel", "error",
            "-fflags", "nobuffer",
            "-flags", "low_delay",
            "-i", &self.cfg.url,
            "-an",
            "-vf", &format!("scale={}:{}", self.cfg.width, self.cfg.height),
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

        debug!("video: spawning {}", self.cfg.ffmpeg);
        let mut child = cmd.spawn().with_context(|| format!("spawn {}", self.cfg.ffmpeg))?;
        self.stdout = child.stdout.take();
        *lock(&self.child) = Some(child);
        Ok(())
    }

    fn reap(&mut self) {
        self.stdout = None;
        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.cfg.width, self.cfg.height)
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        anyhow::ensure!(!self.interrupted.load(Ordering::Acquire), "decoder interrupted");

        if self.stdout.is_none() {
            if let Some(at) = self.respawn_at {
                if Instant::now() < at {
                    std::thread::sleep(Duration::from_millis(50));
                    return Ok(None);
                }
            }
            self.respawn_at = Some(Instant::now() + RESPAWN_BACKOFF);
            self.launch()?;
        }

        let Some(out) = self.stdout.as_mut() else { return Ok(None); };
        match out.read_exact(&mut self.buf) {
            Ok(()) => Ok(RgbImage::from_raw(self.cfg.width, self.cfg.height, self.buf.clone())),
            Err(e) => {
                if !self.interrupted.load(Ordering::Acquire) {
                    warn!("video: decoder output ended: {}", e);
                }
                self.reap();
                self.respawn_at = Some(Instant::now() + RESPAWN_BACKOFF);
                Err(e).context("read decoded frame")
            }
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let child = self.child.clone();
        let flag = self.interrupted.clone();
        Some(Interrupter::new(move || {
            flag.store(true, Ordering::Release);
            if let Some(c) = lock(&child).as_mut() {
                let _ = c.kill();
            }
        }))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.reap();
    }
}
