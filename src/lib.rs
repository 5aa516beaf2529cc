//! # AxUIO Platform Device Bridge
//!
//! This crate exposes the memory-mapped register space of a platform device
//! to a user-space consumer, UIO style. It maps the device's physical memory
//! resources, registers the device with a session host, and while any
//! consumer holds the device open, signals a readiness event at a fixed
//! interval in place of a hardware interrupt.
//!
//! ## Architecture
//!
//! ### Mapping
//! - [`PlatformDevice`]: Enumerates the memory resources of a device
//! - [`IoMapper`]: Physical-to-virtual mapping primitive
//! - [`MappedRegions`]: Page-aligned region table, unmapped on teardown
//!
//! ### Sessions
//! - [`DeviceSession`]: Reference-counted open/close; first open starts the
//!   poll worker, last close stops it
//! - [`PollWorker`]: Background thread signalling an [`EventSink`]
//! - [`EventCounter`]: Event counter consumers wait on
//!
//! ### Lifecycle
//! - [`DeviceLifecycle`]: Probe/remove state machine (Unregistered/Registered)
//! - [`SessionHost`]: Framework the device is registered with
//! - [`UioRegistry`]: In-process session host handing out minor numbers
//!
//! ## Example
//!
//! ```rust,ignore
//! use axuio::{DeviceLifecycle, DevMemMapper, MemResource, StaticPlatformDevice,
//!             UioConfig, UioRegistry};
//!
//! let registry = Arc::new(UioRegistry::new());
//! let lifecycle = DeviceLifecycle::new(
//!     UioConfig::default(),
//!     Arc::new(DevMemMapper::open()?),
//!     registry.clone(),
//! );
//!
//! // Device arrival
//! let pdev = StaticPlatformDevice::new("3200c000.ethernet")
//!     .with_resource(MemResource::from_inclusive(0x3200_c000, 0x3200_dfff).ok_or(UioError::NoResource)?);
//! let minor = lifecycle.probe(&pdev)?;
//!
//! // Consumer side
//! let handle = registry.open(minor)?;
//! let regs = handle.device().regions()[0].mapped();
//! let mut seen = 0;
//! while let Some(count) = handle.wait_event(seen, Duration::from_secs(1)) {
//!     seen = count;
//!     // ... service the device through `regs` ...
//! }
//! handle.close()?;
//!
//! // Device removal
//! lifecycle.remove()?;
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod config;
mod device;
mod error;
mod host;
mod lifecycle;
mod mapper;
mod notify;
mod region;
mod registry;
mod resource;
mod session;

cfg_if::cfg_if! {
    if #[cfg(all(unix, feature = "devmem"))] {
        mod devmem;
        pub use devmem::DevMemMapper;
    }
}

pub use config::{UioConfig, DEFAULT_POLL_INTERVAL};
pub use device::{UioDevice, MINOR_UNASSIGNED};
pub use error::{UioError, UioResult};
pub use host::{DeviceHooks, NoHooks, SessionHost};
pub use lifecycle::{DeviceLifecycle, LifecycleState};
pub use mapper::{IoMapper, MappedPtr};
pub use notify::{EventCounter, EventSink, PollWorker};
pub use region::{MappedRegions, Region, RegionKind};
pub use registry::{UioHandle, UioRegistry, MAX_MINORS};
pub use resource::{MemResource, PlatformDevice, StaticPlatformDevice, MAX_UIO_MAPS};
pub use session::{DeviceSession, SessionStats};
