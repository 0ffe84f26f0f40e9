use std::time::Duration;

use tello_proto::ProtoError;

/// Per-call failures. None of these take a channel down.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("invalid argument: {0}")]
    Invalid(#[from] ProtoError),

    #[error("not connected")]
    NotConnected,

    #[error("no `ok` from device after {0} handshake attempt(s)")]
    Handshake(u32),

    #[error("no reply within {0:?}")]
    TimedOut(Duration),

    #[error("device replied `{0}`")]
    Refused(String),

    #[error("reply was not valid UTF-8")]
    Decode,

    #[error("command queue full ({0} pending)")]
    QueueFull(usize),

    #[error("channel closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
