use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryResult;

/// Closed set of event kinds used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Device events
    DeviceDiscovered,
    DeviceConnected,
    DeviceDisconnected,
    DeviceStateChanged,
    DeviceRemoved,

    // Discovery events
    DiscoveryStarted,
    DiscoveryStopped,

    // Application events
    SettingsChanged,
    AppMinimized,
    AppRestored,
}

/// Application events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AppEvent {
    /// A device was seen on the network
    DeviceDiscovered {
        result: DiscoveryResult,
        timestamp: DateTime<Utc>,
    },

    /// A device's transport session was established
    DeviceConnected {
        device_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A device's transport session ended
    DeviceDisconnected {
        device_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A device's state mutated outside a direct request/response call
    DeviceStateChanged {
        device_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A device left the registry
    DeviceRemoved {
        device_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Discovery began browsing
    DiscoveryStarted { timestamp: DateTime<Utc> },

    /// Discovery stopped browsing
    DiscoveryStopped { timestamp: DateTime<Utc> },

    /// Persisted settings were updated
    SettingsChanged { timestamp: DateTime<Utc> },

    /// The main window was minimized to the tray
    AppMinimized { timestamp: DateTime<Utc> },

    /// The main window was restored from the tray
    AppRestored { timestamp: DateTime<Utc> },
}

impl AppEvent {
    pub fn device_discovered(result: DiscoveryResult) -> Self {
        Self::DeviceDiscovered {
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn device_connected(device_id: impl Into<String>) -> Self {
        Self::DeviceConnected {
            device_id: device_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn device_disconnected(device_id: impl Into<String>) -> Self {
        Self::DeviceDisconnected {
            device_id: device_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn device_state_changed(device_id: impl Into<String>) -> Self {
        Self::DeviceStateChanged {
            device_id: device_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn device_removed(device_id: impl Into<String>) -> Self {
        Self::DeviceRemoved {
            device_id: device_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn discovery_started() -> Self {
        Self::DiscoveryStarted {
            timestamp: Utc::now(),
        }
    }

    pub fn discovery_stopped() -> Self {
        Self::DiscoveryStopped {
            timestamp: Utc::now(),
        }
    }

    pub fn settings_changed() -> Self {
        Self::SettingsChanged {
            timestamp: Utc::now(),
        }
    }

    pub fn app_minimized() -> Self {
        Self::AppMinimized {
            timestamp: Utc::now(),
        }
    }

    pub fn app_restored() -> Self {
        Self::AppRestored {
            timestamp: Utc::now(),
        }
    }

    /// Kind used for bus subscription.
    pub fn kind(&self) -> EventType {
        match self {
            Self::DeviceDiscovered { .. } => EventType::DeviceDiscovered,
            Self::DeviceConnected { .. } => EventType::DeviceConnected,
            Self::DeviceDisconnected { .. } => EventType::DeviceDisconnected,
            Self::DeviceStateChanged { .. } => EventType::DeviceStateChanged,
            Self::DeviceRemoved { .. } => EventType::DeviceRemoved,
            Self::DiscoveryStarted { .. } => EventType::DiscoveryStarted,
            Self::DiscoveryStopped { .. } => EventType::DiscoveryStopped,
            Self::SettingsChanged { .. } => EventType::SettingsChanged,
            Self::AppMinimized { .. } => EventType::AppMinimized,
            Self::AppRestored { .. } => EventType::AppRestored,
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DeviceDiscovered { timestamp, .. }
            | Self::DeviceConnected { timestamp, .. }
            | Self::DeviceDisconnected { timestamp, .. }
            | Self::DeviceStateChanged { timestamp, .. }
            | Self::DeviceRemoved { timestamp, .. }
            | Self::DiscoveryStarted { timestamp }
            | Self::DiscoveryStopped { timestamp }
            | Self::SettingsChanged { timestamp }
            | Self::AppMinimized { timestamp }
            | Self::AppRestored { timestamp } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoverySource;

    #[test]
    fn test_kind_matches_variant() {
        let event = AppEvent::device_state_changed("wiz:abc");
        assert_eq!(event.kind(), EventType::DeviceStateChanged);
        match event {
            AppEvent::DeviceStateChanged { device_id, .. } => {
                assert_eq!(device_id, "wiz:abc");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let result = DiscoveryResult {
            device_id: "mdns:Lamp._hue._tcp.local.".to_string(),
            name: "Lamp".to_string(),
            ip_address: Some("192.168.1.50".to_string()),
            port: 80,
            device_type: "hue_bridge".to_string(),
            source: DiscoverySource::Mdns,
            properties: Default::default(),
        };
        let event = AppEvent::device_discovered(result);

        let json_str = serde_json::to_string(&event).unwrap();
        let deserialized: AppEvent = serde_json::from_str(&json_str).unwrap();
        assert_eq!(deserialized.kind(), EventType::DeviceDiscovered);
    }
}
