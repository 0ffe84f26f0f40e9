#![allow(dead_code)]

use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use tello_link::{ControllerConfig, LinkConfig, RcConfig, VideoConfig};
use tello_vision::{FrameSource, Interrupter};

/// What the fake device does with one datagram.
pub enum Script {
    Reply(Vec<u8>),
    Delayed(Duration, Vec<u8>),
    Silent,
}

pub fn reply(text: &str) -> Script {
    Script::Reply(text.as_bytes().to_vec())
}

/// Answers like firmware: `ok` to one-shots, nothing to `rc`/`emergency`,
/// values to queries.
pub fn firmware(text: &str) -> Script {
    match text {
        t if t.starts_with("rc ") || t == "emergency" => Script::Silent,
        "battery?" => reply("87\r\n"),
        "sdk?" => reply("20"),
        _ => reply("ok"),
    }
}

type Responder = Box<dyn Fn(&str) -> Script + Send>;

/// Loopback stand-in for the drone's command port.
pub struct FakeDevice {
    socket: Arc<UdpSocket>,
    received: Arc<Mutex<Vec<(String, Instant)>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeDevice {
    pub fn spawn(respond: impl Fn(&str) -> Script + Send + 'static) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        socket.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let (s, r, run) = (socket.clone(), received.clone(), running.clone());
        let respond: Responder = Box::new(respond);
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 2048];
            while run.load(Ordering::Acquire) {
                let Ok((n, from)) = s.recv_from(&mut buf) else { continue };
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                r.lock().unwrap().push((text.clone(), Instant::now()));
                match respond(&text) {
                    Script::Reply(bytes) => {
                        let _ = s.send_to(&bytes, from);
                    }
                    Script::Delayed(delay, bytes) => {
                        let s = s.clone();
                        std::thread::spawn(move || {
                            std::thread::sleep(delay);
                            let _ = s.send_to(&bytes, from);
                        });
                    }
                    Script::Silent => {}
                }
            }
        });

        Self { socket, received, running, handle: Some(handle) }
    }

    pub fn firmware() -> Self {
        Self::spawn(firmware)
    }

    pub fn silent() -> Self {
        Self::spawn(|_| Script::Silent)
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn received_at(&self) -> Vec<(String, Instant)> {
        self.received.lock().unwrap().clone()
    }

    /// Everything except `rc` datagrams.
    pub fn commands(&self) -> Vec<String> {
        self.received().into_iter().filter(|t| !t.starts_with("rc ")).collect()
    }

    pub fn count(&self, text: &str) -> usize {
        self.received().iter().filter(|t| *t == text).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.received().iter().filter(|t| t.starts_with(prefix)).count()
    }

    pub fn wait_for_count(&self, text: &str, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.count(text) >= n)
    }

    /// Sends an unsolicited datagram from the device's socket.
    pub fn send_to(&self, to: SocketAddr, bytes: &[u8]) {
        self.socket.send_to(bytes, to).unwrap();
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

pub fn link_config(device: SocketAddr, log_dir: &Path) -> LinkConfig {
    LinkConfig {
        device_addr: device,
        command_bind: loopback(),
        telemetry_bind: loopback(),
        command_timeout_ms: 300,
        handshake_attempts: 2,
        queue_capacity: 10,
        log_dir: log_dir.to_path_buf(),
    }
}

pub fn controller_config(device: SocketAddr, log_dir: &Path) -> ControllerConfig {
    ControllerConfig {
        link: link_config(device, log_dir),
        rc: RcConfig { tick_s: 0.2, vel_timing_s: 10.0 },
        video: VideoConfig { enable: false, ..VideoConfig::default() },
    }
}

/// One step of a scripted frame source.
#[derive(Clone, Copy)]
pub enum Step {
    /// A frame filled with this value.
    Frame(u8),
    Hiccup,
    Fail,
}

/// Plays `steps`, then hiccups forever. An endless source yields frames
/// of value 7 on every pull.
pub struct ScriptedSource {
    steps: Vec<Step>,
    pos: usize,
    endless: bool,
    pub pulls: Arc<AtomicUsize>,
}

pub const MOCK_DIMS: (u32, u32) = (8, 6);

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps, pos: 0, endless: false, pulls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn endless() -> Self {
        Self { endless: true, ..Self::new(Vec::new()) }
    }
}

pub fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(MOCK_DIMS.0, MOCK_DIMS.1, Rgb([value, value, value]))
}

impl FrameSource for ScriptedSource {
    fn dimensions(&self) -> (u32, u32) {
        MOCK_DIMS
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        std::thread::sleep(Duration::from_millis(2));
        self.pulls.fetch_add(1, Ordering::Relaxed);
        if self.endless {
            return Ok(Some(solid(7)));
        }
        let step = self.steps.get(self.pos).copied().unwrap_or(Step::Hiccup);
        self.pos += 1;
        match step {
            Step::Frame(v) => Ok(Some(solid(v))),
            Step::Hiccup => Ok(None),
            Step::Fail => anyhow::bail!("corrupt packet"),
        }
    }
}

/// Blocks in `next_frame` until interrupted, like a decoder waiting on a
/// silent stream.
pub struct BlockingSource {
    gate: Arc<(Mutex<bool>, Condvar)>,
    pub dropped: Arc<AtomicBool>,
}

impl BlockingSource {
    pub fn new() -> Self {
        Self {
            gate: Arc::new((Mutex::new(false), Condvar::new())),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSource for BlockingSource {
    fn dimensions(&self) -> (u32, u32) {
        MOCK_DIMS
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        let (lock, cv) = &*self.gate;
        let mut interrupted = lock.lock().unwrap();
        while !*interrupted {
            interrupted = cv.wait(interrupted).unwrap();
        }
        anyhow::bail!("interrupted")
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let gate = self.gate.clone();
        Some(Interrupter::new(move || {
            let (lock, cv) = &*gate;
            *lock.lock().unwrap() = true;
            cv.notify_all();
        }))
    }
}

impl Drop for BlockingSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::Release);
    }
}
