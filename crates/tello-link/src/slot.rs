use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Single-value mailbox: writers overwrite, readers take a copy and clear
/// the fresh flag. Value and flag change together under the lock; the flag
/// is mirrored in an atomic so polling it never blocks the writer.
pub(crate) struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    fresh: AtomicBool,
}

impl<T: Clone> LatestSlot<T> {
    pub fn new() -> Self {
        Self { value: Mutex::new(None), fresh: AtomicBool::new(false) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn publish(&self, v: T) {
        let mut slot = self.lock();
        *slot = Some(v);
        self.fresh.store(true, Ordering::Release);
    }

    pub fn take_latest(&self) -> Option<T> {
        let slot = self.lock();
        self.fresh.store(false, Ordering::Release);
        slot.clone()
    }

    pub fn peek(&self) -> Option<T> {
        self.lock().clone()
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        let mut slot = self.lock();
        *slot = None;
        self.fresh.store(false, Ordering::Release);
    }
}
