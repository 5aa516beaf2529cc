//! Readiness events delivered to consumers.
//!
//! The poll worker does not know who is waiting on the device; it only calls
//! [`EventSink::notify`]. [`EventCounter`] is the UIO-style sink: a
//! monotonically increasing event count that consumers read and wait on.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Wakes consumers waiting for a readiness event on a device.
///
/// `notify()` must never block for long; it is called from the poll worker
/// once per interval.
pub trait EventSink: Send + Sync {
    /// Signal one readiness event.
    fn notify(&self);
}

/// Event counter with UIO read semantics.
///
/// Each [`notify`](EventSink::notify) bumps the counter; a consumer remembers
/// the last count it saw and waits for it to change. Waiters sleep on a
/// condition variable and are woken by every event.
#[derive(Debug, Default)]
pub struct EventCounter {
    events: AtomicU32,
    waiters: AtomicUsize,
    lock: Mutex<()>,
    wake: Condvar,
}

impl EventCounter {
    pub const fn new() -> Self {
        Self {
            events: AtomicU32::new(0),
            waiters: AtomicUsize::new(0),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Total number of events signalled so far (wrapping).
    #[inline]
    pub fn count(&self) -> u32 {
        self.events.load(Ordering::Acquire)
    }

    /// Number of consumers currently blocked in [`wait_event`](Self::wait_event).
    #[inline]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Waits until the event count differs from `seen` or `timeout` expires.
    ///
    /// Returns the new count, or `None` on timeout. A timeout too large to
    /// express as a deadline (such as `Duration::MAX`) waits without one.
    pub fn wait_event(&self, seen: u32, timeout: Duration) -> Option<u32> {
        let current = self.count();
        if current != seen {
            return Some(current);
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.guard();
        self.waiters.fetch_add(1, Ordering::AcqRel);

        let result = loop {
            // Checked under the lock; notify() takes it before waking.
            let current = self.count();
            if current != seen {
                break Some(current);
            }
            guard = match deadline {
                None => self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break None;
                    }
                    self.wake
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        };

        self.waiters.fetch_sub(1, Ordering::AcqRel);
        result
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for EventCounter {
    #[inline]
    fn notify(&self) {
        let count = self.events.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        trace!("event {} signalled ({} waiters)", count, self.waiters());
        drop(self.guard());
        self.wake.notify_all();
    }
}
