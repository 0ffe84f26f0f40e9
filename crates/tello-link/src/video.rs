use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use tello_vision::{DecoderConfig, FfmpegSource, Frame, FrameSource, Interrupter};
use tracing::{debug, info};

use crate::slot::LatestSlot;
use crate::state::SessionState;

const HICCUP_BACKOFF: Duration = Duration::from_millis(5);

struct Shared {
    latest: LatestSlot<Frame>,
    decoded: AtomicU64,
    hiccups: AtomicU64,
    running: AtomicBool,
}

/// Pulls decoded frames continuously and keeps the newest one.
pub struct VideoChannel {
    cfg: DecoderConfig,
    source: Option<Box<dyn FrameSource>>,
    dims: Option<(u32, u32)>,
    interrupter: Option<Interrupter>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    state: SessionState,
}

impl VideoChannel {
    /// Decodes the device stream through ffmpeg once started.
    pub fn new(cfg: DecoderConfig) -> Self {
        Self {
            cfg,
            source: None,
            dims: None,
            interrupter: None,
            shared: Arc::new(Shared {
                latest: LatestSlot::new(),
                decoded: AtomicU64::new(0),
                hiccups: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
            worker: None,
            state: SessionState::Unstarted,
        }
    }

    pub fn with_source(source: Box<dyn FrameSource>) -> Self {
        let mut ch = Self::new(DecoderConfig::default());
        ch.source = Some(source);
        ch
    }

    pub fn start(&mut self) -> Result<()> {
        anyhow::ensure!(self.state == SessionState::Unstarted, "video channel already {:?}", self.state);

        let source: Box<dyn FrameSource> = match self.source.take() {
            Some(s) => s,
            None => Box::new(FfmpegSource::spawn(self.cfg.clone())?),
        };
        let dims = source.dimensions();
        self.dims = Some(dims);
        self.interrupter = source.interrupter();

        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let worker = std::thread::Builder::new()
            .name("tello-video".into())
            .spawn(move || decode_loop(source, shared))
            .context("spawn video decoder")?;

        self.worker = Some(worker);
        self.state = SessionState::Active;
        info!("video: started at {}x{}", dims.0, dims.1);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frame size, known once started.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dims
    }

    /// Last good frame, which survives decode hiccups. Marks it consumed.
    pub fn latest(&self) -> Option<Frame> {
        self.shared.latest.take_latest()
    }

    pub fn has_unconsumed(&self) -> bool {
        self.shared.latest.is_fresh()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.shared.decoded.load(Ordering::Relaxed)
    }

    pub fn hiccups(&self) -> u64 {
        self.shared.hiccups.load(Ordering::Relaxed)
    }

    /// Stops decoding and releases the decoder. Later calls do nothing.
    pub fn close(&mut self) {
        if !self.state.close() {
            return;
        }
        self.shared.running.store(false, Ordering::Release);
        if let Some(i) = self.interrupter.take() {
            i.interrupt();
        }
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        self.shared.latest.clear();
        debug!(
            "video: closed after {} frame(s), {} hiccup(s)",
            self.frames_decoded(),
            self.hiccups()
        );
    }
}

impl Drop for VideoChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode_loop(mut source: Box<dyn FrameSource>, shared: Arc<Shared>) {
    let mut seq = 0u64;
    while shared.running.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(Some(image)) => {
                seq += 1;
                shared.latest.publish(Frame::new(image, seq));
                shared.decoded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                shared.hiccups.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.hiccups.fetch_add(1, Ordering::Relaxed);
                if shared.running.load(Ordering::Acquire) {
                    debug!("video: hiccup: {:#}", e);
                    std::thread::sleep(HICCUP_BACKOFF);
                }
            }
        }
    }
    drop(source);
    debug!("video: decoder released");
}
