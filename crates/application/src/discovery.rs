use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

use crate::bus::EventBus;
use domain::{AppEvent, DiscoveryResult, DiscoverySource};

/// Service-level observer for found devices.
pub type DeviceFoundCallback = Arc<dyn Fn(&DiscoveryResult) + Send + Sync>;
/// Service-level observer for lost devices, by id.
pub type DeviceLostCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Sink handed to a backend at start: found results and loss notices flow
/// through these into the service.
pub type BackendFound = Arc<dyn Fn(DiscoveryResult) + Send + Sync>;
pub type BackendLost = Arc<dyn Fn(String) + Send + Sync>;

/// One way of finding devices on the network (mDNS, SSDP, ...).
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin browsing; push results into the callbacks until stopped.
    /// Returns true if the backend came up.
    async fn start(&self, on_found: BackendFound, on_lost: BackendLost) -> bool;

    async fn stop(&self);
}

/// Unified facade over the discovery backends.
///
/// Dedupes repeat announcements per device id (repeats refresh the stored
/// record without re-firing observers), fans found/lost notices out to
/// registered callbacks with panic isolation, and mirrors lifecycle onto
/// the event bus.
pub struct DiscoveryService {
    backends: Vec<Arc<dyn DiscoveryBackend>>,
    discovered: DashMap<String, DiscoveryResult>,
    on_found: Mutex<Vec<DeviceFoundCallback>>,
    on_lost: Mutex<Vec<DeviceLostCallback>>,
    event_bus: Option<Arc<EventBus>>,
    running: AtomicBool,
    // Handed to backends as the sink target; weak so a backend that
    // outlives the service cannot keep it alive.
    self_ref: Weak<DiscoveryService>,
}

impl DiscoveryService {
    pub fn new(
        backends: Vec<Arc<dyn DiscoveryBackend>>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            backends,
            discovered: DashMap::new(),
            on_found: Mutex::new(Vec::new()),
            on_lost: Mutex::new(Vec::new()),
            event_bus,
            running: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of everything currently discovered.
    pub fn discovered_devices(&self) -> Vec<DiscoveryResult> {
        self.discovered
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn on_device_found(&self, callback: DeviceFoundCallback) {
        self.on_found.lock().push(callback);
    }

    pub fn on_device_lost(&self, callback: DeviceLostCallback) {
        self.on_lost.lock().push(callback);
    }

    /// Start every backend. Returns true iff at least one came up.
    /// Idempotent while running.
    pub async fn start(&self) -> bool {
        if self.is_running() {
            warn!("Discovery service already running");
            return true;
        }

        let mut any_started = false;
        for backend in &self.backends {
            let service = self.self_ref.clone();
            let on_found: BackendFound = Arc::new(move |result| {
                if let Some(service) = service.upgrade() {
                    service.handle_found(result);
                }
            });
            let service = self.self_ref.clone();
            let on_lost: BackendLost = Arc::new(move |device_id| {
                if let Some(service) = service.upgrade() {
                    service.handle_lost(&device_id);
                }
            });

            if backend.start(on_found, on_lost).await {
                info!(backend = backend.name(), "Discovery backend started");
                any_started = true;
            } else {
                warn!(backend = backend.name(), "Discovery backend failed to start");
            }
        }

        if any_started {
            self.running.store(true, Ordering::SeqCst);
            if let Some(bus) = &self.event_bus {
                bus.publish(&AppEvent::discovery_started());
            }
        }
        any_started
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for backend in &self.backends {
            backend.stop().await;
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(&AppEvent::discovery_stopped());
        }
        info!("Discovery service stopped");
    }

    /// Manually register a device discovery cannot see. Fires the found
    /// observers like any other sighting.
    pub fn add_manual_device(
        &self,
        device_id: &str,
        name: &str,
        ip_address: &str,
        device_type: &str,
        port: u16,
    ) -> DiscoveryResult {
        let result = DiscoveryResult {
            device_id: format!("manual:{device_id}"),
            name: name.to_string(),
            ip_address: Some(ip_address.to_string()),
            port,
            device_type: device_type.to_string(),
            source: DiscoverySource::Manual,
            properties: Default::default(),
        };
        self.handle_found(result.clone());
        result
    }

    /// Forget all discovered devices without firing observers.
    pub fn clear(&self) {
        self.discovered.clear();
    }

    fn handle_found(&self, result: DiscoveryResult) {
        let is_new = self
            .discovered
            .insert(result.device_id.clone(), result.clone())
            .is_none();
        if !is_new {
            return;
        }

        info!(
            name = %result.name,
            device_type = %result.device_type,
            ip = ?result.ip_address,
            source = %result.source,
            "Discovered device"
        );

        let callbacks = self.on_found.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&result))).is_err() {
                error!(device_id = %result.device_id, "Error in device found callback");
            }
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(&AppEvent::device_discovered(result));
        }
    }

    fn handle_lost(&self, device_id: &str) {
        if self.discovered.remove(device_id).is_none() {
            return;
        }

        info!(device_id = %device_id, "Device lost");

        let callbacks = self.on_lost.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(device_id))).is_err() {
                error!(device_id = %device_id, "Error in device lost callback");
            }
        }
    }
}

/// Strip service-type suffixes and separator noise from an mDNS service
/// name for display.
pub fn clean_service_name(name: &str) -> String {
    const SUFFIXES: [&str; 6] = [
        "._googlecast._tcp.local.",
        "._hue._tcp.local.",
        "._http._tcp.local.",
        "._airplay._tcp.local.",
        "._esphomelib._tcp.local.",
        "._homekit._tcp.local.",
    ];

    let mut base = name;
    for suffix in SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped;
            break;
        }
    }

    let mut cleaned = base.replace(['_', '-'], " ");
    while cleaned.contains("  ") {
        cleaned = cleaned.replace("  ", " ");
    }
    cleaned.trim().to_string()
}
