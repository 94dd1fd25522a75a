use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of devices the hub manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Switch,
    Plug,
    Sensor,
    Thermostat,
    Speaker,
    Camera,
    Unknown,
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Light => "light",
            Self::Switch => "switch",
            Self::Plug => "plug",
            Self::Sensor => "sensor",
            Self::Thermostat => "thermostat",
            Self::Speaker => "speaker",
            Self::Camera => "camera",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}
