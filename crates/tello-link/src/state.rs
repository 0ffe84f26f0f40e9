use std::time::{Duration, Instant};

/// Lifecycle of a channel or of the whole controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unstarted,
    Active,
    Closed,
}

impl SessionState {
    /// Moves to `Closed`. Returns false if it already was.
    pub fn close(&mut self) -> bool {
        if *self == SessionState::Closed {
            return false;
        }
        *self = SessionState::Closed;
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    pub state: SessionState,
    pub connected: bool,
    pub commands_sent: usize,
    pub last_reply: Option<Instant>,
    pub queue_pending: usize,
    pub queue_failed: u64,
    pub telemetry_received: u64,
    pub frames_decoded: u64,
    pub rc_heartbeats: u64,
    pub battery_pct: Option<u8>,
}

impl LinkStatus {
    pub fn reply_age(&self) -> Option<Duration> {
        self.last_reply.map(|t| t.elapsed())
    }
}
