use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tello_proto::{Command, FlipDir, Query, Snapshot};
use tello_vision::{Detection, Detector, Frame, FrameSource};
use tracing::{info, warn};

use crate::command::{CommandChannel, CommandLink};
use crate::error::LinkError;
use crate::queue::{CommandQueue, QueueStats};
use crate::rc::RcChannel;
use crate::record::CommandRecord;
use crate::state::{LinkStatus, SessionState};
use crate::telemetry::TelemetryChannel;
use crate::video::VideoChannel;
use crate::ControllerConfig;

/// Owns every channel of one device session.
///
/// Movement methods validate, then queue; the queue worker executes them
/// one at a time and the caller returns immediately. `execute` is the
/// blocking path for callers that need the reply.
pub struct Controller {
    cfg: ControllerConfig,
    command: CommandChannel,
    telemetry: TelemetryChannel,
    video: Option<VideoChannel>,
    rc: RcChannel,
    queue: Option<CommandQueue>,
    state: SessionState,
}

impl Controller {
    /// Binds the command socket. Nothing is sent until `start`.
    pub fn new(cfg: ControllerConfig) -> Result<Self> {
        let command = CommandChannel::open(&cfg.link)?;
        let rc = RcChannel::new(command.link(), &cfg.rc);
        let telemetry = TelemetryChannel::new(cfg.link.telemetry_bind);
        let video = cfg.video.enable.then(|| VideoChannel::new(cfg.video.decoder.clone()));
        Ok(Self { cfg, command, telemetry, video, rc, queue: None, state: SessionState::Unstarted })
    }

    /// Decode frames from `source` instead of the device stream. Enables
    /// video.
    pub fn with_frame_source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.cfg.video.enable = true;
        self.video = Some(VideoChannel::with_source(source));
        self
    }

    /// Handshake, enable the stream, then start telemetry, video, the RC
    /// heartbeat and the queue worker. If a step fails, the channels
    /// already started are torn down and `start` may be retried.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Active => return Ok(()),
            SessionState::Closed => return Err(LinkError::Closed.into()),
            SessionState::Unstarted => {}
        }

        self.command.connect(self.cfg.link.handshake_attempts)?;
        if let Err(e) = self.start_channels() {
            warn!("controller: start failed, rolling back: {:#}", e);
            self.rollback();
            return Err(e);
        }

        self.state = SessionState::Active;
        info!("controller: session active with {}", self.command.link().device());
        Ok(())
    }

    fn start_channels(&mut self) -> Result<()> {
        if self.video.is_some() {
            self.command.stream_on().context("enable video stream")?;
        }
        self.telemetry.start()?;
        if let Some(video) = self.video.as_mut() {
            video.start()?;
        }
        self.rc.start().context("start rc heartbeat")?;
        self.queue = Some(
            CommandQueue::start(self.command.link(), self.cfg.link.queue_capacity)
                .context("start command queue")?,
        );
        Ok(())
    }

    fn rollback(&mut self) {
        self.queue = None;
        self.rc = RcChannel::new(self.command.link(), &self.cfg.rc);
        if let Some(video) = self.video.as_mut() {
            if video.state() != SessionState::Unstarted {
                *video = VideoChannel::new(self.cfg.video.decoder.clone());
            }
        }
        self.telemetry = TelemetryChannel::new(self.cfg.link.telemetry_bind);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn link(&self) -> Arc<CommandLink> {
        self.command.link()
    }

    pub fn rc(&self) -> &RcChannel {
        &self.rc
    }

    pub fn command_addr(&self) -> Option<SocketAddr> {
        Some(self.command.local_addr())
    }

    pub fn telemetry_addr(&self) -> Option<SocketAddr> {
        self.telemetry.local_addr()
    }

    /// Validates and queues any one-shot command.
    pub fn enqueue(&self, cmd: Command) -> Result<(), LinkError> {
        cmd.validate()?;
        match (&self.queue, self.state) {
            (Some(queue), SessionState::Active) => queue.push(cmd),
            (_, SessionState::Closed) => Err(LinkError::Closed),
            _ => Err(LinkError::NotConnected),
        }
    }

    pub fn takeoff(&self) -> Result<(), LinkError> {
        self.enqueue(Command::Takeoff)
    }

    pub fn land(&self) -> Result<(), LinkError> {
        self.enqueue(Command::Land)
    }

    pub fn up(&self, cm: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Up(cm))
    }

    pub fn down(&self, cm: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Down(cm))
    }

    pub fn left(&self, cm: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Left(cm))
    }

    pub fn right(&self, cm: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Right(cm))
    }

    pub fn forward(&self, cm: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Forward(cm))
    }

    pub fn backward(&self, cm: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Back(cm))
    }

    pub fn rotate_cw(&self, deg: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Cw(deg))
    }

    pub fn rotate_ccw(&self, deg: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Ccw(deg))
    }

    pub fn flip(&self, dir: FlipDir) -> Result<(), LinkError> {
        self.enqueue(Command::Flip(dir))
    }

    /// Straight-line move to `(x, y, z)` cm relative to the current position.
    pub fn go(&self, x: i32, y: i32, z: i32, speed: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Go { x, y, z, speed })
    }

    /// Arc through `p1` ending at `p2`.
    pub fn curve(&self, p1: [i32; 3], p2: [i32; 3], speed: i32) -> Result<(), LinkError> {
        self.enqueue(Command::Curve { p1, p2, speed })
    }

    /// Runs `cmd` now and returns the reply, waiting behind any command
    /// already in flight.
    pub fn execute(&self, cmd: &Command) -> Result<String, LinkError> {
        cmd.validate()?;
        if self.state == SessionState::Closed {
            return Err(LinkError::Closed);
        }
        self.command.execute(cmd)
    }

    pub fn query(&self, q: Query) -> Result<String, LinkError> {
        self.execute(&Command::Query(q))
    }

    /// Toggles the device video stream. The video channel keeps running
    /// either way and simply sees no frames while it is off.
    pub fn stream_on(&self) -> Result<(), LinkError> {
        self.execute(&Command::StreamOn).map(drop)
    }

    pub fn stream_off(&self) -> Result<(), LinkError> {
        self.execute(&Command::StreamOff).map(drop)
    }

    /// Drops queued commands that have not started yet.
    pub fn cancel_pending(&self) -> usize {
        let dropped = self.queue.as_ref().map_or(0, CommandQueue::clear);
        if dropped > 0 {
            warn!("controller: dropped {} queued command(s)", dropped);
        }
        dropped
    }

    /// Motors off now. Pending queued commands are dropped.
    pub fn emergency(&self) -> Result<(), LinkError> {
        self.cancel_pending();
        self.command.emergency()
    }

    /// Waits for every queued command to finish. False on timeout.
    pub fn complete(&self, timeout: Duration) -> bool {
        self.queue.as_ref().map_or(true, |q| q.wait_idle(timeout))
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.as_ref().map(CommandQueue::stats).unwrap_or_default()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.video.as_ref().and_then(VideoChannel::latest)
    }

    pub fn has_new_frame(&self) -> bool {
        self.video.as_ref().is_some_and(VideoChannel::has_unconsumed)
    }

    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.video.as_ref().and_then(VideoChannel::dimensions)
    }

    pub fn latest_telemetry(&self) -> Option<Snapshot> {
        self.telemetry.latest()
    }

    pub fn has_new_telemetry(&self) -> bool {
        self.telemetry.has_unconsumed()
    }

    /// Runs `detector` on the newest frame, if any.
    pub fn detect(&self, detector: &mut dyn Detector) -> Result<Option<Vec<Detection>>> {
        match self.latest_frame() {
            Some(frame) => detector.detect(&frame).map(Some),
            None => Ok(None),
        }
    }

    pub fn records(&self) -> Vec<CommandRecord> {
        self.command.records()
    }

    pub fn status(&self) -> LinkStatus {
        let link = self.command.link();
        let queue = self.queue_stats();
        LinkStatus {
            state: self.state,
            connected: link.is_connected(),
            commands_sent: link.record_count(),
            last_reply: link.last_reply(),
            queue_pending: queue.pending,
            queue_failed: queue.failed,
            telemetry_received: self.telemetry.received(),
            frames_decoded: self.video.as_ref().map_or(0, VideoChannel::frames_decoded),
            rc_heartbeats: self.rc.heartbeats(),
            battery_pct: self.telemetry.peek().and_then(|s| s.battery_pct()),
        }
    }

    /// Shuts every channel down and writes the command and telemetry logs.
    /// Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if !self.state.close() {
            return Ok(());
        }
        let log_dir = self.cfg.link.log_dir.clone();

        if let Some(mut queue) = self.queue.take() {
            queue.close();
        }
        if let Some(video) = self.video.as_mut() {
            video.close();
        }
        let telemetry = self.telemetry.close(&log_dir);
        self.rc.close();
        let command = self.command.close(&log_dir);

        telemetry.context("write telemetry log")?;
        command.context("write command log")?;
        info!("controller: closed");
        Ok(())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("controller: close on drop: {:#}", e);
        }
    }
}
