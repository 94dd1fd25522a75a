use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::device::DeviceType;

/// Where a discovery result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Mdns,
    Ssdp,
    Manual,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mdns => "mdns",
            Self::Ssdp => "ssdp",
            Self::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// Transient, pre-configuration description of a device seen on the
/// network. Consumed once to construct an adapter or routed to a vendor
/// manager; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub device_id: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub port: u16,
    /// Coarse type hint, e.g. "chromecast" or "hue_bridge".
    pub device_type: String,
    pub source: DiscoverySource,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// TXT keys that may carry a hardware address usable as a stable identity.
const IDENTITY_PROPERTY_KEYS: [&str; 3] = ["mac", "bt_mac", "deviceid"];

/// Identity key for a hardware address. Returns `None` when the value is
/// too short to be a real MAC, so junk never produces a false match.
pub fn mac_identity(mac: &str) -> Option<String> {
    let normalized: String = mac
        .chars()
        .filter(char::is_ascii_hexdigit)
        .collect::<String>()
        .to_ascii_lowercase();
    (normalized.len() >= 12).then(|| format!("mac:{normalized}"))
}

/// Identity key for a device only known by its address.
pub fn ip_identity(ip: &str) -> String {
    format!("ip:{ip}")
}

impl DiscoveryResult {
    /// Stable cross-source identity for dual-discovery suppression.
    ///
    /// Prefers a normalized hardware address from the TXT properties over
    /// the IP address; type-name heuristics are never part of the key.
    pub fn identity_key(&self) -> Option<String> {
        for key in IDENTITY_PROPERTY_KEYS {
            if let Some(identity) = self.properties.get(key).and_then(|value| mac_identity(value))
            {
                return Some(identity);
            }
        }
        self.ip_address.as_deref().map(ip_identity)
    }
}

/// Map an mDNS service type to the coarse hint used before a vendor
/// manager claims the device.
pub fn service_type_hint(service_type: &str) -> &'static str {
    match service_type {
        "_hue._tcp.local." => "hue_bridge",
        "_tradfri._udp.local." => "tradfri_gateway",
        "_googlecast._tcp.local." => "chromecast",
        "_airplay._tcp.local." => "airplay",
        "_esphomelib._tcp.local." => "esphome",
        "_http._tcp.local." => "generic_http",
        "_tuya._tcp.local." => "tuya",
        _ => "unknown",
    }
}

/// Coarse device type for a hint string.
pub fn device_type_for_hint(hint: &str) -> DeviceType {
    match hint {
        "hue_bridge" | "tradfri_gateway" | "tuya" => DeviceType::Light,
        "chromecast" | "airplay" => DeviceType::Speaker,
        "esphome" => DeviceType::Switch,
        _ => DeviceType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(properties: &[(&str, &str)], ip: Option<&str>) -> DiscoveryResult {
        DiscoveryResult {
            device_id: "mdns:Lamp._hue._tcp.local.".to_string(),
            name: "Lamp".to_string(),
            ip_address: ip.map(str::to_string),
            port: 80,
            device_type: "hue_bridge".to_string(),
            source: DiscoverySource::Mdns,
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_identity_prefers_mac_over_ip() {
        let result = result_with(&[("mac", "AA:BB:CC:11:22:33")], Some("192.168.1.50"));
        assert_eq!(result.identity_key().unwrap(), "mac:aabbcc112233");
    }

    #[test]
    fn test_identity_falls_back_to_ip() {
        let result = result_with(&[("md", "Chromecast")], Some("192.168.1.50"));
        assert_eq!(result.identity_key().unwrap(), "ip:192.168.1.50");
    }

    #[test]
    fn test_identity_rejects_short_mac_values() {
        // A truncated or junk mac must not produce a false identity match.
        let result = result_with(&[("mac", "AB12")], None);
        assert_eq!(result.identity_key(), None);
    }

    #[test]
    fn test_service_hints_map_to_types() {
        assert_eq!(service_type_hint("_googlecast._tcp.local."), "chromecast");
        assert_eq!(service_type_hint("_unknown._tcp.local."), "unknown");
        assert_eq!(device_type_for_hint("hue_bridge"), DeviceType::Light);
        assert_eq!(device_type_for_hint("airplay"), DeviceType::Speaker);
        assert_eq!(device_type_for_hint("generic_http"), DeviceType::Unknown);
    }
}
