use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error, info};

use domain::{Device, DeviceType};

/// Observer for newly registered devices.
pub type DeviceAddedCallback = Arc<dyn Fn(&Arc<dyn Device>) + Send + Sync>;
/// Observer for removals. Removal observers get the id only; the device
/// object may already be invalid by the time they run.
pub type DeviceRemovedCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Observer for "re-render this one" update notifications.
pub type DeviceUpdatedCallback = Arc<dyn Fn(&Arc<dyn Device>) + Send + Sync>;

/// Authoritative in-memory set of currently known devices.
///
/// The map is mutex-protected and every observer callback fires after the
/// guard is dropped, so a callback may re-enter the registry without
/// deadlocking. A panicking observer is caught and logged; it never breaks
/// the registry or the remaining observers.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, Arc<dyn Device>>>,
    on_added: Mutex<Vec<DeviceAddedCallback>>,
    on_removed: Mutex<Vec<DeviceRemovedCallback>>,
    on_updated: Mutex<Vec<DeviceUpdatedCallback>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device. Returns true iff the id was not already present;
    /// re-adding an existing id is a no-op reported as failure.
    pub fn add_device(&self, device: Arc<dyn Device>) -> bool {
        let device_id = device.device_id();
        {
            let mut devices = self.devices.lock();
            if devices.contains_key(&device_id) {
                debug!(device_id = %device_id, "Device already in registry");
                return false;
            }
            devices.insert(device_id.clone(), Arc::clone(&device));
        }

        info!(device_id = %device_id, name = %device.name(), "Added device");

        let callbacks = self.on_added.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&device))).is_err() {
                error!(device_id = %device_id, "Error in device added callback");
            }
        }
        true
    }

    /// Pop and return the device if present, firing removal observers with
    /// the id.
    pub fn remove_device(&self, device_id: &str) -> Option<Arc<dyn Device>> {
        let device = self.devices.lock().remove(device_id)?;

        info!(device_id = %device_id, name = %device.name(), "Removed device");

        let callbacks = self.on_removed.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(device_id))).is_err() {
                error!(device_id = %device_id, "Error in device removed callback");
            }
        }
        Some(device)
    }

    /// Notify observers that a registered device changed. The stored entry
    /// is the same shared object, so this mutates nothing; unknown ids are
    /// ignored.
    pub fn update_device(&self, device: &Arc<dyn Device>) {
        let device_id = device.device_id();
        if !self.devices.lock().contains_key(&device_id) {
            return;
        }

        let callbacks = self.on_updated.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(device))).is_err() {
                error!(device_id = %device_id, "Error in device updated callback");
            }
        }
    }

    pub fn get_device(&self, device_id: &str) -> Option<Arc<dyn Device>> {
        self.devices.lock().get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.lock().contains_key(device_id)
    }

    /// Snapshot of all registered devices.
    pub fn devices(&self) -> Vec<Arc<dyn Device>> {
        self.devices.lock().values().cloned().collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Snapshot of devices of one type.
    pub fn devices_by_type(&self, device_type: DeviceType) -> Vec<Arc<dyn Device>> {
        self.devices
            .lock()
            .values()
            .filter(|device| device.device_type() == device_type)
            .cloned()
            .collect()
    }

    /// Snapshot of devices currently online.
    pub fn online_devices(&self) -> Vec<Arc<dyn Device>> {
        // is_online takes each device's own state lock; snapshot first,
        // probe after the map guard is gone.
        self.devices()
            .into_iter()
            .filter(|device| device.is_online())
            .collect()
    }

    /// Remove every device one at a time so each fires its own removal
    /// callback.
    pub fn clear(&self) {
        let device_ids: Vec<String> = self.devices.lock().keys().cloned().collect();
        for device_id in device_ids {
            self.remove_device(&device_id);
        }
    }

    pub fn on_device_added(&self, callback: DeviceAddedCallback) {
        self.on_added.lock().push(callback);
    }

    pub fn on_device_removed(&self, callback: DeviceRemovedCallback) {
        self.on_removed.lock().push(callback);
    }

    pub fn on_device_updated(&self, callback: DeviceUpdatedCallback) {
        self.on_updated.lock().push(callback);
    }
}
