use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tello_proto::Command;
use tracing::{debug, info, warn};

use crate::command::CommandLink;
use crate::error::LinkError;
use crate::state::SessionState;

struct Inner {
    pending: VecDeque<Command>,
    busy: bool,
    accepting: bool,
    completed: u64,
    failed: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub completed: u64,
    pub failed: u64,
}

/// FIFO of one-shot commands drained by a single worker, one at a time.
/// A failed command is logged and the next one runs.
pub struct CommandQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    state: SessionState,
}

impl CommandQueue {
    pub fn start(link: Arc<CommandLink>, capacity: usize) -> Result<Self, LinkError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                busy: false,
                accepting: true,
                completed: 0,
                failed: 0,
            }),
            changed: Condvar::new(),
            capacity: capacity.max(1),
        });
        let s = shared.clone();
        let worker = std::thread::Builder::new()
            .name("tello-queue".into())
            .spawn(move || drain_loop(link, s))?;
        Ok(Self { shared, worker: Some(worker), state: SessionState::Active })
    }

    /// Validates and appends `cmd`. Rejected commands never reach the wire.
    pub fn push(&self, cmd: Command) -> Result<(), LinkError> {
        cmd.validate()?;
        let mut inner = self.shared.lock();
        if !inner.accepting {
            return Err(LinkError::Closed);
        }
        if inner.pending.len() >= self.shared.capacity {
            return Err(LinkError::QueueFull(inner.pending.len()));
        }
        debug!("queue: + {}", cmd);
        inner.pending.push_back(cmd);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Commands waiting or executing.
    pub fn pending(&self) -> usize {
        let inner = self.shared.lock();
        inner.pending.len() + usize::from(inner.busy)
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.shared.lock();
        QueueStats {
            pending: inner.pending.len() + usize::from(inner.busy),
            completed: inner.completed,
            failed: inner.failed,
        }
    }

    /// Blocks until everything queued so far has run. False on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.lock();
        while !inner.pending.is_empty() || inner.busy {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = self
                .shared
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }

    /// Drops everything not yet started. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.shared.lock();
        let n = inner.pending.len();
        inner.pending.clear();
        self.shared.changed.notify_all();
        n
    }

    /// Stops accepting, discards what has not started and waits for the
    /// command in progress. Later calls do nothing.
    pub fn close(&mut self) -> usize {
        if !self.state.close() {
            return 0;
        }
        let discarded = {
            let mut inner = self.shared.lock();
            inner.accepting = false;
            let n = inner.pending.len();
            inner.pending.clear();
            self.shared.changed.notify_all();
            n
        };
        if discarded > 0 {
            info!("queue: discarded {} unsent command(s)", discarded);
        }
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        discarded
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain_loop(link: Arc<CommandLink>, shared: Arc<Shared>) {
    loop {
        let cmd = {
            let mut inner = shared.lock();
            while inner.pending.is_empty() && inner.accepting {
                inner = shared.changed.wait(inner).unwrap_or_else(|e| e.into_inner());
            }
            if !inner.accepting {
                break;
            }
            let Some(cmd) = inner.pending.pop_front() else { continue };
            inner.busy = true;
            cmd
        };

        let result = link.execute(&cmd);
        match &result {
            Ok(reply) => debug!("queue: {} -> {}", cmd, reply),
            Err(e) => warn!("queue: {} failed: {}", cmd, e),
        }

        let mut inner = shared.lock();
        inner.busy = false;
        if result.is_ok() {
            inner.completed += 1;
        } else {
            inner.failed += 1;
        }
        shared.changed.notify_all();
    }
    debug!("queue: worker stopped");
}
