//! Fixed-interval poll worker.
//!
//! The device has no usable interrupt line, so while it is open a dedicated
//! thread signals a readiness event every poll interval. The worker stops
//! cooperatively: [`PollWorker::stop`] raises a flag, wakes the thread out of
//! its sleep and joins it.

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::error::{UioError, UioResult};

use super::event::EventSink;

/// Handle to a running poll thread.
///
/// Dropping the handle stops the thread.
pub struct PollWorker {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollWorker {
    /// Spawns a thread named `name` that notifies `sink` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`UioError::WorkerCreationFailure`] if the thread cannot be
    /// spawned.
    pub fn start(name: String, interval: Duration, sink: Arc<dyn EventSink>) -> UioResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || poll_loop(&thread_stop, interval, sink.as_ref()))
            .map_err(|err| {
                error!("failed to spawn poll worker {}: {}", name, err);
                UioError::WorkerCreationFailure
            })?;

        debug!("poll worker {} started ({:?} interval)", name, interval);
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` until the worker thread has exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker and waits for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            error!("poll worker {} panicked", self.name);
        }
        debug!("poll worker {} stopped", self.name);
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for PollWorker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PollWorker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn poll_loop(stop: &AtomicBool, interval: Duration, sink: &dyn EventSink) {
    while !stop.load(Ordering::Acquire) {
        sink.notify();

        // park_timeout may return early; sleep out the rest of the interval.
        // An interval past the end of the clock parks until stopped.
        let deadline = Instant::now().checked_add(interval);
        loop {
            if stop.load(Ordering::Acquire) {
                return;
            }
            let Some(deadline) = deadline else {
                thread::park();
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
}
