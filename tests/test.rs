use axerrno::{AxError, AxResult};
use axuio::{
    DeviceHooks, DeviceLifecycle, IoMapper, LifecycleState, MappedPtr, MemResource,
    StaticPlatformDevice, UioConfig, UioDevice, UioError, UioRegistry,
};
use memory_addr::PhysAddr;
use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

/// Mapper that hands out fake virtual addresses and tracks live mappings.
struct MockMapper {
    live: Mutex<BTreeMap<usize, (usize, usize)>>,
    next: AtomicUsize,
    maps: AtomicUsize,
    unmaps: AtomicUsize,
}

impl MockMapper {
    fn new() -> Self {
        Self {
            live: Mutex::new(BTreeMap::new()),
            next: AtomicUsize::new(0x7f00_0000_0000),
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
        }
    }

    fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl IoMapper for MockMapper {
    fn map(&self, paddr: PhysAddr, size: usize) -> AxResult<MappedPtr> {
        let vaddr = self.next.fetch_add(0x10_0000, Ordering::SeqCst);
        self.live
            .lock()
            .unwrap()
            .insert(vaddr, (paddr.as_usize(), size));
        self.maps.fetch_add(1, Ordering::SeqCst);
        Ok(MappedPtr::new(NonNull::new(vaddr as *mut u8).unwrap()))
    }

    fn unmap(&self, ptr: MappedPtr, size: usize) {
        let entry = self.live.lock().unwrap().remove(&ptr.addr());
        assert_eq!(entry.map(|(_, s)| s), Some(size), "unmap of unknown mapping");
        self.unmaps.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockHooks {
    fail_publish: bool,
    fail_self_test: bool,
    published: AtomicBool,
    self_tests: AtomicUsize,
}

impl DeviceHooks for MockHooks {
    fn publish(&self, _device: &UioDevice) -> AxResult {
        if self.fail_publish {
            return Err(AxError::NoMemory);
        }
        self.published.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn retract(&self, _device: &UioDevice) {
        self.published.store(false, Ordering::SeqCst);
    }

    fn self_test(&self, _device: &UioDevice) -> AxResult {
        self.self_tests.fetch_add(1, Ordering::SeqCst);
        if self.fail_self_test {
            Err(AxError::NoMemory)
        } else {
            Ok(())
        }
    }
}

struct Fixture {
    mapper: Arc<MockMapper>,
    registry: Arc<UioRegistry>,
    lifecycle: DeviceLifecycle,
}

fn fixture() -> Fixture {
    let mapper = Arc::new(MockMapper::new());
    let registry = Arc::new(UioRegistry::new());
    let config = UioConfig::default().with_poll_interval(Duration::from_millis(2));
    let lifecycle = DeviceLifecycle::new(config, mapper.clone(), registry.clone());
    Fixture {
        mapper,
        registry,
        lifecycle,
    }
}

fn macb_pdev() -> StaticPlatformDevice {
    StaticPlatformDevice::new("3200c000.ethernet")
        .with_resource(MemResource::from_inclusive(0x3200_c000, 0x3200_dfff).unwrap())
        .with_hole()
        .with_resource(MemResource::new(PhysAddr::from(0x3201_0004), 0x40))
}

#[test]
fn test_probe_maps_present_resources_in_order() {
    let fx = fixture();
    let minor = fx.lifecycle.probe(&macb_pdev()).unwrap();

    let device = fx.registry.get_device(minor).expect("device not registered");
    let regions = device.regions();
    assert_eq!(regions.len(), 2);

    assert_eq!(regions[0].slot, 0);
    assert_eq!(regions[0].phys_addr, PhysAddr::from(0x3200_c000));
    assert_eq!(regions[0].size, 0x2000);
    assert_eq!(regions[0].name, "macb_regs");

    assert_eq!(regions[1].slot, 2);
    assert_eq!(regions[1].phys_addr, PhysAddr::from(0x3201_0000));
    assert_eq!(regions[1].size, 0x1000);

    assert_eq!(fx.mapper.live_count(), 2);
}

#[test]
fn test_probe_without_resources_stays_unregistered() {
    let fx = fixture();
    let pdev = StaticPlatformDevice::new("empty").with_hole().with_hole();

    assert_eq!(fx.lifecycle.probe(&pdev), Err(UioError::NoResource));
    assert_eq!(fx.lifecycle.state(), LifecycleState::Unregistered);
    assert_eq!(fx.registry.device_count(), 0);
    assert_eq!(fx.mapper.maps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_session_scenarios_through_registry() {
    let fx = fixture();
    let minor = fx.lifecycle.probe(&macb_pdev()).unwrap();
    let device = fx.registry.get_device(minor).unwrap();

    // open, open, close: worker keeps running
    device.open().unwrap();
    device.open().unwrap();
    device.release().unwrap();
    assert_eq!(device.session().ref_count(), 1);
    assert!(device.session().is_polling());
    let seen = device.events().count();
    assert!(device.events().wait_event(seen, Duration::from_secs(5)).is_some());

    // close, close: second one is unbalanced
    device.release().unwrap();
    assert_eq!(device.release(), Err(UioError::NotOpen));
    assert!(!device.session().is_polling());
    assert_eq!(device.session().stats().worker_starts(), 1);
    assert_eq!(device.session().stats().worker_stops(), 1);
}

#[test]
fn test_remove_idle_device_skips_close() {
    let fx = fixture();
    let minor = fx.lifecycle.probe(&macb_pdev()).unwrap();
    let device = fx.registry.get_device(minor).unwrap();

    fx.lifecycle.remove().unwrap();

    assert_eq!(device.session().stats().closes(), 0);
    assert_eq!(device.session().stats().worker_stops(), 0);
    assert_eq!(fx.lifecycle.state(), LifecycleState::Unregistered);
    assert!(fx.registry.get_device(minor).is_none());
    assert_eq!(fx.mapper.live_count(), 0);
    assert_eq!(fx.mapper.unmaps.load(Ordering::SeqCst), 2);
}

#[test]
fn test_remove_while_open_drives_count_to_zero() {
    let fx = fixture();
    let minor = fx.lifecycle.probe(&macb_pdev()).unwrap();

    let first = fx.registry.open(minor).unwrap();
    let second = fx.registry.open(minor).unwrap();
    let device = Arc::clone(first.device());
    assert!(device.session().is_polling());

    fx.lifecycle.remove().unwrap();

    assert_eq!(device.session().ref_count(), 0);
    assert!(!device.session().is_polling());
    assert_eq!(fx.mapper.live_count(), 0);

    // Consumers that outlived the device
    assert_eq!(first.close(), Err(UioError::NotOpen));
    drop(second);
    assert!(matches!(fx.registry.open(minor), Err(UioError::NotRegistered)));
    assert_eq!(device.open(), Err(UioError::Removed));
}

#[test]
fn test_concurrent_consumers_share_one_worker() {
    let fx = fixture();
    let minor = fx.lifecycle.probe(&macb_pdev()).unwrap();
    let registry = Arc::clone(&fx.registry);
    let consumers = 12;
    let barrier = Arc::new(Barrier::new(consumers));

    let handles: Vec<_> = (0..consumers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                let handle = registry.open(minor).unwrap();
                assert!(handle.wait_event(0, Duration::from_secs(5)).is_some());
                barrier.wait();
                handle.close().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let device = fx.registry.get_device(minor).unwrap();
    let stats = device.session().stats();
    assert_eq!(stats.opens(), consumers as u64);
    assert_eq!(stats.worker_starts(), 1);
    assert_eq!(stats.worker_stops(), 1);
    assert!(!device.session().is_polling());
}

#[test]
fn test_attribute_failure_unwinds_mapping() {
    let mapper = Arc::new(MockMapper::new());
    let registry = Arc::new(UioRegistry::new());
    let hooks = Arc::new(MockHooks {
        fail_publish: true,
        ..MockHooks::default()
    });
    let lifecycle = DeviceLifecycle::new(UioConfig::default(), mapper.clone(), registry.clone())
        .with_hooks(hooks.clone());

    assert_eq!(
        lifecycle.probe(&macb_pdev()),
        Err(UioError::AttributeFailure(AxError::NoMemory))
    );
    assert_eq!(mapper.maps.load(Ordering::SeqCst), 2);
    assert_eq!(mapper.live_count(), 0);
    assert_eq!(registry.device_count(), 0);
}

#[test]
fn test_self_test_failure_is_not_fatal() {
    let mapper = Arc::new(MockMapper::new());
    let registry = Arc::new(UioRegistry::new());
    let hooks = Arc::new(MockHooks {
        fail_self_test: true,
        ..MockHooks::default()
    });
    let lifecycle = DeviceLifecycle::new(UioConfig::default(), mapper.clone(), registry.clone())
        .with_hooks(hooks.clone());

    lifecycle.probe(&macb_pdev()).unwrap();
    assert_eq!(hooks.self_tests.load(Ordering::SeqCst), 1);
    assert!(hooks.published.load(Ordering::SeqCst));
    assert_eq!(lifecycle.state(), LifecycleState::Registered);

    lifecycle.remove().unwrap();
    assert!(!hooks.published.load(Ordering::SeqCst));
    assert_eq!(mapper.live_count(), 0);
}

#[test]
fn test_reprobe_after_remove() {
    let fx = fixture();
    let first = fx.lifecycle.probe(&macb_pdev()).unwrap();
    fx.lifecycle.remove().unwrap();

    let second = fx.lifecycle.probe(&macb_pdev()).unwrap();
    assert_eq!(first, second);

    let device = fx.registry.get_device(second).unwrap();
    device.open().unwrap();
    assert!(device.session().is_polling());
    device.release().unwrap();
    assert_eq!(fx.mapper.live_count(), 2);
}

#[test]
fn test_probe_skips_malformed_resource() {
    let fx = fixture();
    let pdev = StaticPlatformDevice::new("broken.ethernet")
        .with_resource(MemResource::new(PhysAddr::from(0x1000), usize::MAX - 10))
        .with_resource(MemResource::new(PhysAddr::from(0x2000), 0x1000));

    let minor = fx.lifecycle.probe(&pdev).unwrap();
    let regions = fx.registry.get_device(minor).unwrap().regions();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].slot, 1);
    assert_eq!(fx.mapper.maps.load(Ordering::SeqCst), 1);
}

#[test]
fn test_consumer_waits_without_deadline() {
    let fx = fixture();
    let minor = fx.lifecycle.probe(&macb_pdev()).unwrap();
    let handle = fx.registry.open(minor).unwrap();

    let seen = handle.device().events().count();
    assert!(handle.wait_event(seen, Duration::MAX).is_some());
    handle.close().unwrap();
}
