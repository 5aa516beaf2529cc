//! Polled readiness notification.
//!
//! The device has no interrupt routed to user space. Instead, while at least
//! one consumer holds the device open, a poll worker signals a readiness
//! event at a fixed interval:
//!
//! ```text
//! ┌──────────────┐  notify() every interval  ┌──────────────┐
//! │  PollWorker  │ ────────────────────────> │  EventSink   │
//! │ (one thread) │                           │ EventCounter │
//! └──────────────┘                           └──────┬───────┘
//!                                                   │ wait_event()
//!                                                   ▼
//!                                            ┌──────────────┐
//!                                            │  consumers   │
//!                                            └──────────────┘
//! ```
//!
//! The worker is created and destroyed by the device session; see
//! [`DeviceSession`](crate::DeviceSession).

mod event;
mod poll;

pub use event::{EventCounter, EventSink};
pub use poll::PollWorker;
