//! Reference-counted device sessions.
//!
//! Any number of consumers may hold a device open at once. The session only
//! counts them: the first open starts the poll worker, the last close stops
//! it.
//!
//! # Design
//!
//! The count is a single `AtomicUsize`. Transitions that stay strictly above
//! zero are a lock-free compare-and-swap and never touch the worker. The two
//! boundary transitions (0 → 1 and 1 → 0) are only ever performed while
//! holding the worker-slot lock, so starting and stopping the worker is
//! serialized with them:
//!
//! ```text
//!            open (count > 0): CAS count+1
//!          ┌──────────────────────────────┐
//!          ▼                              │
//! ┌─────────────────┐  open (count == 0)  ┌──────────────────┐
//! │ count 0, no     │ ──────────────────> │ count ≥ 1,       │
//! │ worker          │ <────────────────── │ one worker       │
//! └─────────────────┘  close (count == 1) └──────────────────┘
//!                      [both under lock]
//! ```
//!
//! Outside the lock, a worker exists if and only if the count is positive.
//! Because the count cannot leave zero without the lock, a failed worker
//! spawn leaves the count untouched.
//!
//! The 1 → 0 close joins the worker thread while still holding the slot, so a
//! concurrent 0 → 1 open cannot start a second worker before the first one has
//! exited. The join is short (`stop` unparks the worker), but callers that hit
//! the boundary meanwhile wait for it. The slot is a `std::sync::Mutex` so they
//! sleep rather than spin.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{UioError, UioResult};
use crate::notify::{EventSink, PollWorker};

/// Counters for session activity.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Successful `open` calls.
    pub open_count: AtomicU64,
    /// Successful `close` calls.
    pub close_count: AtomicU64,
    /// Poll workers started.
    pub worker_starts: AtomicU64,
    /// Poll workers stopped.
    pub worker_stops: AtomicU64,
}

impl SessionStats {
    pub fn opens(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.close_count.load(Ordering::Relaxed)
    }

    pub fn worker_starts(&self) -> u64 {
        self.worker_starts.load(Ordering::Relaxed)
    }

    pub fn worker_stops(&self) -> u64 {
        self.worker_stops.load(Ordering::Relaxed)
    }
}

/// Starts the poll worker for a session: thread name, interval, sink.
pub(crate) type StartWorker = fn(String, Duration, Arc<dyn EventSink>) -> UioResult<PollWorker>;

/// The reference-counted "in use" state of one device.
pub struct DeviceSession {
    count: AtomicUsize,
    worker: Mutex<Option<PollWorker>>,
    retired: AtomicBool,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    worker_prefix: &'static str,
    start_worker: StartWorker,
    minor: AtomicU32,
    stats: SessionStats,
}

impl DeviceSession {
    /// Creates an idle session whose worker will notify `sink` every
    /// `interval`.
    pub fn new(sink: Arc<dyn EventSink>, interval: Duration, worker_prefix: &'static str) -> Self {
        Self {
            count: AtomicUsize::new(0),
            worker: Mutex::new(None),
            retired: AtomicBool::new(false),
            sink,
            interval,
            worker_prefix,
            start_worker: PollWorker::start,
            minor: AtomicU32::new(0),
            stats: SessionStats::default(),
        }
    }

    /// Replaces the function used to start the poll worker.
    #[cfg(test)]
    pub(crate) fn with_start_worker(mut self, start_worker: StartWorker) -> Self {
        self.start_worker = start_worker;
        self
    }

    /// Sets the minor number used to name the worker thread.
    pub fn set_minor(&self, minor: u32) {
        self.minor.store(minor, Ordering::Relaxed);
    }

    /// Number of outstanding opens.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the poll worker is currently present.
    pub fn is_polling(&self) -> bool {
        self.slot().is_some()
    }

    /// Whether the session has been shut down.
    #[inline]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Registers one more consumer.
    ///
    /// The consumer that moves the count from 0 to 1 starts the poll worker;
    /// every other consumer is served by the worker already running.
    ///
    /// # Errors
    ///
    /// - [`UioError::Removed`] if the session has been shut down.
    /// - [`UioError::WorkerCreationFailure`] if the worker cannot be started;
    ///   the count is left unchanged.
    pub fn open(&self) -> UioResult {
        if let Ok(prev) = self.increment_if_open() {
            trace!("session open, count {}", prev + 1);
            self.stats.open_count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let mut worker = self.slot();
        if self.is_retired() {
            return Err(UioError::Removed);
        }

        // Another consumer may have crossed the boundary while we waited.
        if let Ok(prev) = self.increment_if_open() {
            trace!("session open, count {}", prev + 1);
            self.stats.open_count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        // The count is zero and cannot change while the lock is held.
        debug_assert!(worker.is_none());
        let name = format!("{}{}", self.worker_prefix, self.minor.load(Ordering::Relaxed));
        *worker = Some((self.start_worker)(name, self.interval, Arc::clone(&self.sink))?);
        self.stats.worker_starts.fetch_add(1, Ordering::Relaxed);

        let post = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert_eq!(post, 1);
        debug!("session opened, poll worker started");
        self.stats.open_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Releases one consumer.
    ///
    /// The consumer that moves the count from 1 to 0 stops and joins the
    /// poll worker before returning.
    ///
    /// # Errors
    ///
    /// Returns [`UioError::NotOpen`] if there is no outstanding open; the
    /// state is left unchanged.
    pub fn close(&self) -> UioResult {
        match self.decrement_if_shared() {
            Ok(prev) => {
                trace!("session close, count {}", prev - 1);
                self.stats.close_count.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(0) => return Err(UioError::NotOpen),
            Err(_) => {}
        }

        let mut worker = self.slot();
        let prev = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .map_err(|_| UioError::NotOpen)?;
        self.stats.close_count.fetch_add(1, Ordering::Relaxed);

        if prev == 1 {
            if let Some(w) = worker.take() {
                w.stop();
                self.stats.worker_stops.fetch_add(1, Ordering::Relaxed);
            }
            debug!("session closed, poll worker stopped");
        } else {
            trace!("session close, count {}", prev - 1);
        }
        Ok(())
    }

    /// Drops every outstanding open, stops the worker and refuses further
    /// opens.
    ///
    /// Returns the number of opens that were still outstanding. With no
    /// outstanding open the worker is not touched.
    pub fn shutdown(&self) -> usize {
        let mut worker = self.slot();
        self.retired.store(true, Ordering::Release);
        let dropped = self.count.swap(0, Ordering::AcqRel);

        if let Some(w) = worker.take() {
            w.stop();
            self.stats.worker_stops.fetch_add(1, Ordering::Relaxed);
        }
        if dropped > 0 {
            info!("session shut down with {} open consumer(s)", dropped);
        }
        dropped
    }

    fn slot(&self) -> MutexGuard<'_, Option<PollWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// count += 1, only if count > 0. Returns the previous count.
    #[inline]
    fn increment_if_open(&self) -> Result<usize, usize> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c > 0).then(|| c + 1)
            })
    }

    /// count -= 1, only if count > 1. Returns the previous count.
    #[inline]
    fn decrement_if_shared(&self) -> Result<usize, usize> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c > 1).then(|| c - 1)
            })
    }
}

impl core::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("ref_count", &self.ref_count())
            .field("retired", &self.is_retired())
            .finish()
    }
}
