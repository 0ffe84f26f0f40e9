pub mod command;
pub mod rc;
pub mod shaping;
pub mod telemetry;

pub use command::{Command, FlipDir, Query, Reply};
pub use rc::RcVector;
pub use telemetry::{Snapshot, TelemetryRecord};

/// Device address in AP mode.
pub const DEVICE_IP: &str = "192.168.10.1";
pub const COMMAND_PORT: u16 = 8889;
pub const TELEMETRY_PORT: u16 = 8890;
pub const VIDEO_PORT: u16 = 11111;

/// Largest datagram the device sends on the command or telemetry port.
pub const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("{what} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("missing argument for `{0}`")]
    MissingArgument(&'static str),

    #[error("invalid number `{0}`")]
    BadNumber(String),

    #[error("unknown command `{0}`")]
    UnknownVerb(String),
}
