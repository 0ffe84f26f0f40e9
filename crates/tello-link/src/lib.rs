pub mod command;
pub mod controller;
pub mod doctor;
pub mod error;
pub mod queue;
pub mod rc;
pub mod record;
pub mod state;
pub mod telemetry;
pub mod video;

mod logfile;
mod slot;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tello_vision::DecoderConfig;

pub use command::{CommandChannel, CommandLink, MAX_TIMEOUT};
pub use controller::Controller;
pub use error::LinkError;
pub use queue::CommandQueue;
pub use rc::{HeldInputs, RcChannel};
pub use record::{CommandRecord, Response};
pub use state::{LinkStatus, SessionState};
pub use telemetry::TelemetryChannel;
pub use video::VideoChannel;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Device command endpoint.
    pub device_addr: SocketAddr,

    /// Local address of the command socket; replies and RC share it.
    pub command_bind: SocketAddr,

    /// Local address the telemetry broadcast arrives on.
    pub telemetry_bind: SocketAddr,

    /// Per-command reply deadline.
    pub command_timeout_ms: u64,

    /// `command` handshakes to try before giving up.
    pub handshake_attempts: u32,

    /// Outbound one-shot queue size.
    pub queue_capacity: usize,

    /// Where command/telemetry audit logs are written on close.
    pub log_dir: PathBuf,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_addr: SocketAddr::from(([192, 168, 10, 1], tello_proto::COMMAND_PORT)),
            command_bind: SocketAddr::from(([0, 0, 0, 0], tello_proto::COMMAND_PORT)),
            telemetry_bind: SocketAddr::from(([0, 0, 0, 0], tello_proto::TELEMETRY_PORT)),
            command_timeout_ms: MAX_TIMEOUT.as_millis() as u64,
            handshake_attempts: 5,
            queue_capacity: 100,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl LinkConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RcConfig {
    /// Silence (seconds) after which the current vector is retransmitted.
    pub tick_s: f64,

    /// Hold duration (seconds) at which shaped stick input saturates.
    pub vel_timing_s: f64,
}

impl Default for RcConfig {
    fn default() -> Self {
        Self { tick_s: 5.0, vel_timing_s: 10.0 }
    }
}

impl RcConfig {
    /// Heartbeat period. Values `Duration` cannot hold (negative, NaN,
    /// infinite) fall back to the default tick.
    pub fn tick(&self) -> Duration {
        Duration::try_from_secs_f64(self.tick_s)
            .unwrap_or_else(|_| Duration::from_secs_f64(RcConfig::default().tick_s))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enable: bool,
    #[serde(flatten)]
    pub decoder: DecoderConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self { enable: true, decoder: DecoderConfig::default() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub link: LinkConfig,
    pub rc: RcConfig,
    pub video: VideoConfig,
}
