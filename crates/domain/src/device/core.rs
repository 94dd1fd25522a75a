use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::{Device, DeviceCapability, DeviceInfo, DeviceState};
use crate::error::{DeviceError, Result};

/// Callback invoked when a device's state mutates outside a direct
/// request/response call. One slot per device; last registration wins.
pub type StateCallback = Arc<dyn Fn(&dyn Device) + Send + Sync>;

/// Shared cell embedded by every adapter: identity, capability set, the
/// owned state and the state-changed callback slot.
///
/// Locks are never held across an await point or a callback invocation.
pub struct DeviceCore {
    info: Mutex<DeviceInfo>,
    capabilities: Mutex<HashSet<DeviceCapability>>,
    state: Mutex<DeviceState>,
    on_state_changed: Mutex<Option<StateCallback>>,
}

impl DeviceCore {
    pub fn new(
        info: DeviceInfo,
        capabilities: impl IntoIterator<Item = DeviceCapability>,
    ) -> Self {
        Self {
            info: Mutex::new(info),
            capabilities: Mutex::new(capabilities.into_iter().collect()),
            state: Mutex::new(DeviceState::default()),
            on_state_changed: Mutex::new(None),
        }
    }

    pub fn info(&self) -> DeviceInfo {
        self.info.lock().clone()
    }

    pub fn device_id(&self) -> String {
        self.info.lock().device_id.clone()
    }

    pub fn name(&self) -> String {
        self.info.lock().name.clone()
    }

    pub fn rename(&self, name: impl Into<String>) {
        self.info.lock().name = name.into();
    }

    pub fn capabilities(&self) -> HashSet<DeviceCapability> {
        self.capabilities.lock().clone()
    }

    pub fn has_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities.lock().contains(&capability)
    }

    /// Grow the capability set after the transport reveals support.
    /// Returns true if the capability was newly added.
    pub fn add_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities.lock().insert(capability)
    }

    pub fn require(&self, capability: DeviceCapability) -> Result<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(DeviceError::UnsupportedCapability {
                device: self.name(),
                capability,
            })
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state.lock().clone()
    }

    /// Mutate the owned state and return the updated snapshot.
    pub fn update_state<F>(&self, mutate: F) -> DeviceState
    where
        F: FnOnce(&mut DeviceState),
    {
        let mut state = self.state.lock();
        mutate(&mut state);
        state.clone()
    }

    /// Flip `is_online` off, leaving everything else untouched so stale
    /// data stays available.
    pub fn mark_offline(&self) -> DeviceState {
        self.update_state(|state| state.is_online = false)
    }

    pub fn set_state_callback(&self, callback: StateCallback) {
        *self.on_state_changed.lock() = Some(callback);
    }

    /// Invoke the registered callback, if any. The slot lock is released
    /// before the call so the callback may re-register.
    pub fn notify_state_changed(&self, device: &dyn Device) {
        let callback = self.on_state_changed.lock().clone();
        if let Some(callback) = callback {
            callback(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        core: DeviceCore,
    }

    #[async_trait]
    impl Device for Probe {
        fn info(&self) -> DeviceInfo {
            self.core.info()
        }
        fn device_type(&self) -> DeviceType {
            DeviceType::Sensor
        }
        fn capabilities(&self) -> HashSet<DeviceCapability> {
            self.core.capabilities()
        }
        fn state(&self) -> DeviceState {
            self.core.state()
        }
        fn rename(&self, name: String) {
            self.core.rename(name);
        }
        fn set_state_callback(&self, callback: StateCallback) {
            self.core.set_state_callback(callback);
        }
        async fn connect(&self) -> bool {
            true
        }
        async fn disconnect(&self) {}
        async fn refresh_state(&self) -> DeviceState {
            self.core.state()
        }
    }

    fn probe() -> Probe {
        Probe {
            core: DeviceCore::new(
                DeviceInfo::new("sensor:1", "Hall sensor"),
                [DeviceCapability::TemperatureSensor],
            ),
        }
    }

    #[test]
    fn test_require_reports_device_name() {
        let device = probe();
        let err = device.core.require(DeviceCapability::Brightness).unwrap_err();
        assert_eq!(
            err,
            DeviceError::UnsupportedCapability {
                device: "Hall sensor".to_string(),
                capability: DeviceCapability::Brightness,
            }
        );
        assert!(device.core.require(DeviceCapability::TemperatureSensor).is_ok());
    }

    #[test]
    fn test_capability_set_grows_once() {
        let device = probe();
        assert!(device.core.add_capability(DeviceCapability::HumiditySensor));
        assert!(!device.core.add_capability(DeviceCapability::HumiditySensor));
        assert!(device.core.has_capability(DeviceCapability::HumiditySensor));
    }

    #[test]
    fn test_last_callback_registration_wins() {
        let device = probe();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let hits = first.clone();
        device
            .core
            .set_state_callback(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        let hits = second.clone();
        device
            .core
            .set_state_callback(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));

        device.core.notify_state_changed(&device);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_offline_keeps_stale_data() {
        let device = probe();
        device.core.update_state(|state| {
            state.is_online = true;
            state.temperature = Some(21.5);
        });
        let state = device.core.mark_offline();
        assert!(!state.is_online);
        assert_eq!(state.temperature, Some(21.5));
    }
}
