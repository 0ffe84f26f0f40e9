use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tello_proto::shaping::StickAxis;
use tello_proto::{Command, FlipDir, RcVector};
use tracing::{debug, info, trace, warn};

use crate::command::CommandLink;
use crate::error::LinkError;
use crate::state::SessionState;
use crate::RcConfig;

struct Stick {
    vector: RcVector,
    last_tx: Instant,
}

/// Directions currently held on a digital input (keyboard, gamepad buttons).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldInputs {
    pub right: bool,
    pub left: bool,
    pub forward: bool,
    pub back: bool,
    pub up: bool,
    pub down: bool,
    pub cw: bool,
    pub ccw: bool,
}

struct Shared {
    stick: Mutex<Stick>,
    /// lateral, longitudinal, vertical, yaw
    axes: Mutex<[StickAxis; 4]>,
    running: AtomicBool,
    heartbeats: AtomicU64,
}

impl Shared {
    fn stick(&self) -> MutexGuard<'_, Stick> {
        self.stick.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Continuous four-axis stick control over the command socket.
///
/// Vector changes go out immediately and unacknowledged. While the vector
/// is unchanged a heartbeat re-sends it every `tick` so the device keeps
/// its failsafe armed, but only when no command is awaiting a reply.
pub struct RcChannel {
    link: Arc<CommandLink>,
    shared: Arc<Shared>,
    tick: Duration,
    worker: Option<JoinHandle<()>>,
    state: SessionState,
}

impl RcChannel {
    pub fn new(link: Arc<CommandLink>, cfg: &RcConfig) -> Self {
        Self {
            link,
            shared: Arc::new(Shared {
                stick: Mutex::new(Stick { vector: RcVector::ZERO, last_tx: Instant::now() }),
                axes: Mutex::new([StickAxis::new(cfg.vel_timing_s); 4]),
                running: AtomicBool::new(false),
                heartbeats: AtomicU64::new(0),
            }),
            tick: cfg.tick(),
            worker: None,
            state: SessionState::Unstarted,
        }
    }

    /// Handshake (unless already done), enable the video stream, then start
    /// the heartbeat.
    pub fn connect(&mut self, attempts: u32) -> Result<(), LinkError> {
        if !self.link.is_connected() {
            self.link.connect(attempts)?;
        }
        self.stream_on()?;
        self.start()
    }

    /// Starts the heartbeat thread.
    pub fn start(&mut self) -> Result<(), LinkError> {
        match self.state {
            SessionState::Active => return Ok(()),
            SessionState::Closed => return Err(LinkError::Closed),
            SessionState::Unstarted => {}
        }

        self.shared.running.store(true, Ordering::Release);
        self.shared.stick().last_tx = Instant::now();
        let link = self.link.clone();
        let shared = self.shared.clone();
        let tick = self.tick;
        let worker = std::thread::Builder::new()
            .name("tello-rc".into())
            .spawn(move || heartbeat_loop(link, shared, tick))?;

        self.worker = Some(worker);
        self.state = SessionState::Active;
        info!("rc: heartbeat every {:?}", self.tick);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn vector(&self) -> RcVector {
        self.shared.stick().vector
    }

    pub fn heartbeats(&self) -> u64 {
        self.shared.heartbeats.load(Ordering::Relaxed)
    }

    /// Clamps each axis to ±100. Returns whether a datagram was sent; an
    /// unchanged vector is left to the heartbeat.
    pub fn set_vector(&self, lateral: i32, longitudinal: i32, vertical: i32, yaw: i32) -> Result<bool, LinkError> {
        self.apply(|_| RcVector::clamped(lateral, longitudinal, vertical, yaw))
    }

    pub fn set_lateral(&self, v: i32) -> Result<bool, LinkError> {
        self.apply(|cur| RcVector { lateral: v, ..cur })
    }

    pub fn set_longitudinal(&self, v: i32) -> Result<bool, LinkError> {
        self.apply(|cur| RcVector { longitudinal: v, ..cur })
    }

    pub fn set_vertical(&self, v: i32) -> Result<bool, LinkError> {
        self.apply(|cur| RcVector { vertical: v, ..cur })
    }

    pub fn set_yaw(&self, v: i32) -> Result<bool, LinkError> {
        self.apply(|cur| RcVector { yaw: v, ..cur })
    }

    /// All axes to zero. Also resets the hold ramps used by `drive`.
    pub fn hover(&self) -> Result<bool, LinkError> {
        for axis in self.shared.axes.lock().unwrap_or_else(|e| e.into_inner()).iter_mut() {
            axis.reset();
        }
        self.apply(|_| RcVector::ZERO)
    }

    /// Advances each axis' hold ramp by `dt` seconds and sends the shaped
    /// vector if it changed. Holding a direction ramps its throttle up
    /// logarithmically; releasing ramps it back down.
    pub fn drive(&self, held: HeldInputs, dt: f64) -> Result<bool, LinkError> {
        let next = {
            let mut axes = self.shared.axes.lock().unwrap_or_else(|e| e.into_inner());
            RcVector::from_shaped(
                axes[0].update(held.right, held.left, dt),
                axes[1].update(held.forward, held.back, dt),
                axes[2].update(held.up, held.down, dt),
                axes[3].update(held.cw, held.ccw, dt),
            )
        };
        self.apply(|_| next)
    }

    fn apply(&self, f: impl FnOnce(RcVector) -> RcVector) -> Result<bool, LinkError> {
        let mut stick = self.shared.stick();
        let next = f(stick.vector);
        let next = RcVector::clamped(next.lateral, next.longitudinal, next.vertical, next.yaw);
        if next == stick.vector {
            return Ok(false);
        }
        stick.vector = next;
        stick.last_tx = Instant::now();
        trace!("rc: {}", next);
        self.link.send_no_wait(&next.to_string())?;
        Ok(true)
    }

    pub fn takeoff(&self) -> Result<(), LinkError> {
        self.link.execute(&Command::Takeoff).map(drop)
    }

    pub fn land(&self) -> Result<(), LinkError> {
        self.link.execute(&Command::Land).map(drop)
    }

    pub fn flip(&self, dir: FlipDir) -> Result<(), LinkError> {
        self.link.execute(&Command::Flip(dir)).map(drop)
    }

    pub fn stream_on(&self) -> Result<(), LinkError> {
        self.link.execute(&Command::StreamOn).map(drop)
    }

    pub fn stream_off(&self) -> Result<(), LinkError> {
        self.link.execute(&Command::StreamOff).map(drop)
    }

    pub fn emergency(&self) -> Result<(), LinkError> {
        self.link.emergency()
    }

    /// Stops the heartbeat. Later calls do nothing.
    pub fn close(&mut self) {
        if !self.state.close() {
            return;
        }
        self.shared.running.store(false, Ordering::Release);
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        debug!("rc: closed after {} heartbeat(s)", self.heartbeats());
    }
}

impl Drop for RcChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn heartbeat_loop(link: Arc<CommandLink>, shared: Arc<Shared>, tick: Duration) {
    let poll = (tick / 10).clamp(Duration::from_millis(5), Duration::from_millis(50));
    while shared.running.load(Ordering::Acquire) && link.is_running() {
        std::thread::sleep(poll);

        let mut stick = shared.stick();
        if stick.last_tx.elapsed() <= tick {
            continue;
        }
        let wire = stick.vector.to_string();
        match link.send_if_idle(&wire) {
            None => trace!("rc: command in flight, heartbeat deferred"),
            Some(Ok(())) => {
                stick.last_tx = Instant::now();
                shared.heartbeats.fetch_add(1, Ordering::Relaxed);
                trace!("rc: heartbeat {}", wire);
            }
            Some(Err(e)) => {
                // retried one tick later
                warn!("rc: heartbeat failed: {}", e);
                stick.last_tx = Instant::now();
            }
        }
    }
    debug!("rc: heartbeat stopped");
}
