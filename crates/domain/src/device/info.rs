use serde::{Deserialize, Serialize};

/// Identity and metadata shared by every device adapter.
///
/// `device_id` is globally unique and stable for the device lifetime; it is
/// the map key everywhere. `name` is user-renameable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            ip_address: None,
            model: None,
            manufacturer: None,
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }
}
