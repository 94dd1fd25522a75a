use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use domain::discovery::device_type_for_hint;
use domain::{
    Device, DeviceCapability, DeviceCore, DeviceInfo, DeviceState, DeviceType, DiscoveryResult,
    StateCallback,
};

/// Placeholder adapter for a discovered-but-unconfigured device.
///
/// Type comes from the discovery hint; capabilities are a coarse guess
/// (OnOff plus Volume for speakers or Brightness for lights). Control
/// operations stay at the contract defaults until a vendor manager
/// produces the fully-configured device that replaces this one.
pub struct DiscoveredDeviceAdapter {
    core: DeviceCore,
    device_type: DeviceType,
}

impl DiscoveredDeviceAdapter {
    pub fn new(result: &DiscoveryResult) -> Arc<Self> {
        let device_type = device_type_for_hint(&result.device_type);

        let mut capabilities = vec![DeviceCapability::OnOff];
        match device_type {
            DeviceType::Speaker => capabilities.push(DeviceCapability::Volume),
            DeviceType::Light => capabilities.push(DeviceCapability::Brightness),
            _ => {}
        }

        let mut info = DeviceInfo::new(result.device_id.clone(), result.name.clone());
        info.ip_address = result.ip_address.clone();

        let core = DeviceCore::new(info, capabilities);
        // Seen on the network right now, so it starts online.
        core.update_state(|state| state.is_online = true);

        Arc::new(Self { core, device_type })
    }
}

#[async_trait]
impl Device for DiscoveredDeviceAdapter {
    fn info(&self) -> DeviceInfo {
        self.core.info()
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
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
