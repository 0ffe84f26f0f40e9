use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tello_proto::{Command, Reply, MAX_DATAGRAM};
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::logfile;
use crate::record::{CommandLog, CommandRecord, Response};
use crate::state::SessionState;
use crate::LinkConfig;

/// Upper bound on how long a command waits for its reply.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver socket read timeout; bounds how long shutdown waits for it.
const RECV_POLL: Duration = Duration::from_millis(100);

/// Copies of `emergency` sent, since it gets no reply to confirm delivery.
const EMERGENCY_REPEATS: usize = 3;

/// The shared command socket. Every request/reply exchange goes through
/// `gate`, so at most one command is awaiting a reply at any time; the
/// receiver thread matches each reply to the newest pending record.
///
/// The socket is released when the owning `CommandChannel` closes, even
/// while other holders of the link are still alive; their sends then fail
/// with `LinkError::Closed`.
pub struct CommandLink {
    socket: RwLock<Option<UdpSocket>>,
    local: SocketAddr,
    device: SocketAddr,
    timeout: Duration,
    gate: Mutex<()>,
    log: Mutex<CommandLog>,
    replied: Condvar,
    last_reply: Mutex<Option<Instant>>,
    connected: AtomicBool,
    running: AtomicBool,
}

impl CommandLink {
    fn new(socket: UdpSocket, local: SocketAddr, device: SocketAddr, timeout: Duration) -> Self {
        Self {
            socket: RwLock::new(Some(socket)),
            local,
            device,
            timeout: timeout.min(MAX_TIMEOUT),
            gate: Mutex::new(()),
            log: Mutex::new(CommandLog::default()),
            replied: Condvar::new(),
            last_reply: Mutex::new(None),
            connected: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    fn lock_log(&self) -> MutexGuard<'_, CommandLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn socket(&self) -> RwLockReadGuard<'_, Option<UdpSocket>> {
        self.socket.read().unwrap_or_else(|e| e.into_inner())
    }

    fn transmit(&self, text: &str) -> Result<(), LinkError> {
        let socket = self.socket();
        let socket = socket.as_ref().ok_or(LinkError::Closed)?;
        socket.send_to(text.as_bytes(), self.device)?;
        Ok(())
    }

    /// Drops the socket, unbinding the local port.
    fn release(&self) {
        self.socket.write().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn device(&self) -> SocketAddr {
        self.device
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_reply(&self) -> Option<Instant> {
        *self.last_reply.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sends `text` and blocks until its reply or the timeout. Callers queue
    /// up on the gate; a timeout is never retried.
    pub fn send(&self, text: &str) -> Result<String, LinkError> {
        if !self.is_running() {
            return Err(LinkError::Closed);
        }
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        self.exchange(text)
    }

    fn exchange(&self, text: &str) -> Result<String, LinkError> {
        // Record first: the reply may land before send_to returns.
        let idx = self.lock_log().push(text);
        debug!("cmd: -> {}", text);

        if let Err(e) = self.transmit(text) {
            self.lock_log().resolve(idx, Response::SendFailed);
            warn!("cmd: send `{}` failed: {}", text, e);
            return Err(e);
        }

        let deadline = Instant::now() + self.timeout;
        let mut log = self.lock_log();
        loop {
            match log.get(idx).and_then(|r| r.response.as_ref()) {
                Some(Response::Reply(reply)) => return Ok(reply.clone()),
                Some(Response::DecodeError) => return Err(LinkError::Decode),
                Some(_) => return Err(LinkError::TimedOut(self.timeout)),
                None => {}
            }

            let now = Instant::now();
            if now >= deadline {
                log.resolve(idx, Response::TimedOut);
                warn!("cmd: `{}` got no reply within {:?}", text, self.timeout);
                return Err(LinkError::TimedOut(self.timeout));
            }
            log = self
                .replied
                .wait_timeout(log, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Fire-and-forget datagram. Creates no record and ignores the gate.
    pub fn send_no_wait(&self, text: &str) -> Result<(), LinkError> {
        if !self.is_running() {
            return Err(LinkError::Closed);
        }
        self.transmit(text)
    }

    /// Sends `text` only if no command is awaiting a reply; `None` means
    /// the gate was busy and nothing was sent.
    pub fn send_if_idle(&self, text: &str) -> Option<Result<(), LinkError>> {
        let _gate = match self.gate.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(self.send_no_wait(text))
    }

    /// Validates, sends and interprets the reply. Commands other than the
    /// handshake need a completed handshake first.
    pub fn execute(&self, cmd: &Command) -> Result<String, LinkError> {
        cmd.validate()?;
        if *cmd == Command::Emergency {
            self.emergency()?;
            return Ok(String::new());
        }
        if *cmd != Command::Handshake && !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let reply = self.send(&cmd.to_string())?;
        if cmd.expects_ok() && !Reply::classify(&reply).is_ok() {
            return Err(LinkError::Refused(reply));
        }
        Ok(reply)
    }

    /// Kills the motors. Sent without waiting and regardless of the
    /// handshake or any command in flight.
    pub fn emergency(&self) -> Result<(), LinkError> {
        warn!("cmd: emergency stop");
        let mut last = Ok(());
        for _ in 0..EMERGENCY_REPEATS {
            last = self.send_no_wait("emergency");
        }
        last
    }

    /// Sends `command` until it is acknowledged with `ok`, up to `attempts`
    /// times.
    pub fn connect(&self, attempts: u32) -> Result<(), LinkError> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.send(&Command::Handshake.to_string()) {
                Ok(reply) if Reply::classify(&reply).is_ok() => {
                    self.connected.store(true, Ordering::Release);
                    info!("cmd: connected to {} (attempt {})", self.device, attempt);
                    return Ok(());
                }
                Ok(reply) => debug!("cmd: handshake attempt {} answered `{}`", attempt, reply),
                Err(LinkError::Closed) => return Err(LinkError::Closed),
                Err(e) => debug!("cmd: handshake attempt {} failed: {}", attempt, e),
            }
        }
        warn!("cmd: no handshake from {} after {} attempt(s)", self.device, attempts);
        Err(LinkError::Handshake(attempts))
    }

    pub fn records(&self) -> Vec<CommandRecord> {
        self.lock_log().records().to_vec()
    }

    pub fn record_count(&self) -> usize {
        self.lock_log().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.lock_log().peak_in_flight()
    }

    fn deliver(&self, response: Response) {
        let mut log = self.lock_log();
        if log.resolve_latest(response.clone()) {
            *self.last_reply.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
            self.replied.notify_all();
        } else {
            debug!("cmd: dropping unsolicited reply `{}`", response);
        }
    }
}

fn receive_loop(link: Arc<CommandLink>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while link.is_running() {
        let received = match link.socket().as_ref() {
            Some(socket) => socket.recv_from(&mut buf),
            None => break,
        };
        match received {
            Ok((n, from)) => {
                if from.ip() != link.device.ip() {
                    debug!("cmd: ignoring {} bytes from {}", n, from);
                    continue;
                }
                let response = match std::str::from_utf8(&buf[..n]) {
                    Ok(text) => Response::Reply(text.trim().to_string()),
                    Err(_) => Response::DecodeError,
                };
                debug!("cmd: <- {}", response);
                link.deliver(response);
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                if link.is_running() {
                    warn!("cmd: receive error: {}", e);
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }
    debug!("cmd: receiver stopped");
}

/// Owns the command socket and its receiver thread.
pub struct CommandChannel {
    link: Arc<CommandLink>,
    worker: Option<JoinHandle<()>>,
    state: SessionState,
}

impl CommandChannel {
    /// Binds the command socket and starts listening for replies.
    pub fn open(cfg: &LinkConfig) -> Result<Self> {
        let socket = UdpSocket::bind(cfg.command_bind)
            .with_context(|| format!("bind command socket {}", cfg.command_bind))?;
        socket.set_read_timeout(Some(RECV_POLL)).context("set command socket timeout")?;

        let local = socket.local_addr().context("command socket address")?;
        let link = Arc::new(CommandLink::new(socket, local, cfg.device_addr, cfg.command_timeout()));
        let rx = link.clone();
        let worker = std::thread::Builder::new()
            .name("tello-cmd-rx".into())
            .spawn(move || receive_loop(rx))
            .context("spawn command receiver")?;

        debug!("cmd: listening on {} for {}", local, cfg.device_addr);
        Ok(Self { link, worker: Some(worker), state: SessionState::Active })
    }

    pub fn link(&self) -> Arc<CommandLink> {
        self.link.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.link.local_addr()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn connect(&self, attempts: u32) -> Result<(), LinkError> {
        self.link.connect(attempts)
    }

    pub fn send(&self, text: &str) -> Result<String, LinkError> {
        self.link.send(text)
    }

    pub fn send_no_wait(&self, text: &str) -> Result<(), LinkError> {
        self.link.send_no_wait(text)
    }

    pub fn execute(&self, cmd: &Command) -> Result<String, LinkError> {
        self.link.execute(cmd)
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

    pub fn records(&self) -> Vec<CommandRecord> {
        self.link.records()
    }

    fn shutdown(&mut self) -> bool {
        if !self.state.close() {
            return false;
        }
        self.link.running.store(false, Ordering::Release);
        self.link.replied.notify_all();
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        self.link.release();
        true
    }

    /// Stops the receiver, releases the socket and writes the exchange history to
    /// `<log_dir>/<timestamp>-cmd.log`. Later calls do nothing.
    pub fn close(&mut self, log_dir: &Path) -> Result<Option<PathBuf>> {
        if !self.shutdown() {
            return Ok(None);
        }
        let (path, mut out) = logfile::create(log_dir, "cmd")?;
        let log = self.link.lock_log();
        log.write_to(&mut out)
            .and_then(|()| io::Write::flush(&mut out))
            .with_context(|| format!("write {}", path.display()))?;
        info!("cmd: {} exchange(s) logged to {}", log.len(), path.display());
        Ok(Some(path))
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
