use parking_lot::Mutex;
use std::sync::Arc;

use application::DeviceRegistry;
use domain::{Device, DeviceCapability, DeviceError, DeviceType, DiscoveryResult, DiscoverySource};
use infrastructure::DiscoveredDeviceAdapter;

fn discovered(name: &str, ip: &str, hint: &str) -> DiscoveryResult {
    DiscoveryResult {
        device_id: format!("mdns:{name}"),
        name: name.to_string(),
        ip_address: Some(ip.to_string()),
        port: 80,
        device_type: hint.to_string(),
        source: DiscoverySource::Mdns,
        properties: Default::default(),
    }
}

#[tokio::test]
async fn test_hue_hint_maps_to_a_dimmable_light() {
    let result = discovered("Lamp", "192.168.1.50", "hue_bridge");
    let adapter = DiscoveredDeviceAdapter::new(&result);

    assert_eq!(adapter.device_type(), DeviceType::Light);
    let capabilities = adapter.capabilities();
    assert_eq!(capabilities.len(), 2);
    assert!(capabilities.contains(&DeviceCapability::OnOff));
    assert!(capabilities.contains(&DeviceCapability::Brightness));
    assert!(adapter.is_online());
    assert_eq!(adapter.info().ip_address.as_deref(), Some("192.168.1.50"));

    // Registration reaches an added observer with exactly this device.
    let registry = DeviceRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let ids = seen.clone();
    registry.on_device_added(Arc::new(move |device| {
        ids.lock().push((device.device_id(), device.name()));
    }));

    assert!(registry.add_device(adapter));
    assert_eq!(
        seen.lock().clone(),
        vec![("mdns:Lamp".to_string(), "Lamp".to_string())]
    );
}

#[tokio::test]
async fn test_speaker_hint_gets_volume_instead_of_brightness() {
    let adapter = DiscoveredDeviceAdapter::new(&discovered("TV", "192.168.1.40", "airplay"));
    assert_eq!(adapter.device_type(), DeviceType::Speaker);
    assert!(adapter.has_capability(DeviceCapability::Volume));
    assert!(!adapter.has_capability(DeviceCapability::Brightness));
}

#[tokio::test]
async fn test_unknown_hint_gets_the_minimal_surface() {
    let adapter = DiscoveredDeviceAdapter::new(&discovered("Thing", "192.168.1.70", "generic_http"));
    assert_eq!(adapter.device_type(), DeviceType::Unknown);
    assert_eq!(adapter.capabilities().len(), 1);
    assert!(adapter.has_capability(DeviceCapability::OnOff));
}

#[tokio::test]
async fn test_placeholder_cannot_actually_switch_anything() {
    let adapter = DiscoveredDeviceAdapter::new(&discovered("Lamp", "192.168.1.50", "hue_bridge"));

    // The guess says OnOff, but there is no transport behind it yet.
    assert!(!adapter.turn_on().await.unwrap());
    assert!(!adapter.set_brightness(50).await.unwrap());

    // Capabilities outside the guess still gate properly.
    let err = adapter.set_volume(10).await.unwrap_err();
    assert!(matches!(err, DeviceError::UnsupportedCapability { .. }));
}

#[tokio::test]
async fn test_two_sources_same_id_keep_the_first_instance() {
    let registry = DeviceRegistry::new();

    let first = DiscoveredDeviceAdapter::new(&discovered("Lamp", "192.168.1.50", "hue_bridge"));
    let second = DiscoveredDeviceAdapter::new(&discovered("Lamp", "192.168.1.99", "hue_bridge"));

    assert!(registry.add_device(first));
    assert!(!registry.add_device(second));
    assert_eq!(registry.device_count(), 1);
    let stored = registry.get_device("mdns:Lamp").unwrap();
    assert_eq!(stored.info().ip_address.as_deref(), Some("192.168.1.50"));
}
