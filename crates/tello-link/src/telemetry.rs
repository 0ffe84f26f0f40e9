use std::io::{self, Write};
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tello_proto::{Snapshot, TelemetryRecord, MAX_DATAGRAM};
use tracing::{debug, info, warn};

use crate::logfile;
use crate::slot::LatestSlot;
use crate::state::SessionState;

const RECV_POLL: Duration = Duration::from_millis(100);

struct Shared {
    latest: LatestSlot<Snapshot>,
    history: Mutex<Vec<TelemetryRecord>>,
    received: AtomicU64,
    running: AtomicBool,
}

impl Shared {
    fn history(&self) -> MutexGuard<'_, Vec<TelemetryRecord>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Listens for the device's unsolicited state broadcast.
pub struct TelemetryChannel {
    bind: SocketAddr,
    local: Option<SocketAddr>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    state: SessionState,
}

impl TelemetryChannel {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            local: None,
            shared: Arc::new(Shared {
                latest: LatestSlot::new(),
                history: Mutex::new(Vec::new()),
                received: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
            worker: None,
            state: SessionState::Unstarted,
        }
    }

    /// Binds the telemetry port and starts the mission clock.
    pub fn start(&mut self) -> Result<()> {
        anyhow::ensure!(self.state == SessionState::Unstarted, "telemetry channel already {:?}", self.state);

        let socket = UdpSocket::bind(self.bind)
            .with_context(|| format!("bind telemetry socket {}", self.bind))?;
        socket.set_read_timeout(Some(RECV_POLL)).context("set telemetry socket timeout")?;
        self.local = socket.local_addr().ok();

        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let started = Instant::now();
        let worker = std::thread::Builder::new()
            .name("tello-telemetry".into())
            .spawn(move || receive_loop(socket, shared, started))
            .context("spawn telemetry receiver")?;

        self.worker = Some(worker);
        self.state = SessionState::Active;
        info!("telemetry: listening on {:?}", self.local);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    /// Most recent snapshot; marks it consumed.
    pub fn latest(&self) -> Option<Snapshot> {
        self.shared.latest.take_latest()
    }

    pub fn peek(&self) -> Option<Snapshot> {
        self.shared.latest.peek()
    }

    /// True if a snapshot arrived since the last `latest()`.
    pub fn has_unconsumed(&self) -> bool {
        self.shared.latest.is_fresh()
    }

    pub fn history(&self) -> Vec<TelemetryRecord> {
        self.shared.history().clone()
    }

    pub fn received(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    fn shutdown(&mut self) -> bool {
        let was_active = self.state == SessionState::Active;
        if !self.state.close() {
            return false;
        }
        self.shared.running.store(false, Ordering::Release);
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        was_active
    }

    /// Stops listening and writes every snapshot as one JSON object per line
    /// to `<log_dir>/<timestamp>-state.log`. Later calls do nothing.
    pub fn close(&mut self, log_dir: &Path) -> Result<Option<PathBuf>> {
        if !self.shutdown() {
            return Ok(None);
        }
        let (path, mut out) = logfile::create(log_dir, "state")?;
        let history = self.shared.history();
        write_history(&history, &mut out).with_context(|| format!("write {}", path.display()))?;
        info!("telemetry: {} snapshot(s) logged to {}", history.len(), path.display());
        Ok(Some(path))
    }
}

impl Drop for TelemetryChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn write_history(history: &[TelemetryRecord], out: &mut impl Write) -> io::Result<()> {
    for rec in history {
        serde_json::to_writer(&mut *out, rec)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

fn receive_loop(socket: UdpSocket, shared: Arc<Shared>, started: Instant) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while shared.running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let Ok(text) = std::str::from_utf8(&buf[..n]) else {
                    debug!("telemetry: undecodable packet from {}", from);
                    continue;
                };
                let snapshot = Snapshot::parse(text);
                if snapshot.is_empty() {
                    debug!("telemetry: no fields in packet from {}", from);
                    continue;
                }
                shared.history().push(TelemetryRecord {
                    mission_time: started.elapsed(),
                    snapshot: snapshot.clone(),
                });
                shared.latest.publish(snapshot);
                shared.received.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                if shared.running.load(Ordering::Acquire) {
                    warn!("telemetry: receive error: {}", e);
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }
    debug!("telemetry: receiver stopped");
}
