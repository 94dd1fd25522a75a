use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use application::{DeviceRegistry, DiscoveryService, EventBus, UiHandle};
use domain::discovery::{ip_identity, mac_identity};
use domain::{AppEvent, Device, DiscoveryResult};
use infrastructure::DiscoveredDeviceAdapter;

/// Stable identity for a vendor-managed device: hardware address when the
/// manager knows it, IP otherwise.
pub fn device_identity(mac: Option<&str>, ip: Option<&str>) -> Option<String> {
    mac.and_then(mac_identity)
        .or_else(|| ip.map(ip_identity))
}

/// Headless orchestrator standing in for the GUI application object.
///
/// Wires discovery and the vendor managers into the registry, with all
/// registry mutation marshaled onto the UI thread. Dual-discovery overlap
/// is resolved by stable device identity: an identity claimed by a vendor
/// manager suppresses the generic adapter, and a vendor device arriving
/// after its generic twin evicts the twin. Type hints are only consulted
/// when a result exposes no identity at all.
pub struct HubApp {
    registry: Arc<DeviceRegistry>,
    bus: Arc<EventBus>,
    ui: UiHandle,
    /// Hints served by an active vendor manager; fallback suppression only.
    vendor_hints: HashSet<&'static str>,
    /// Identities owned by vendor-managed devices.
    claimed: Mutex<HashSet<String>>,
    /// identity -> generic adapter id, for eviction on vendor arrival.
    generic_by_identity: Mutex<HashMap<String, String>>,
    // Captured by posted jobs and device callbacks; weak so they cannot
    // keep the app alive past shutdown.
    self_ref: Weak<HubApp>,
}

impl HubApp {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        bus: Arc<EventBus>,
        ui: UiHandle,
        vendor_hints: impl IntoIterator<Item = &'static str>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            registry,
            bus,
            ui,
            vendor_hints: vendor_hints.into_iter().collect(),
            claimed: Mutex::new(HashSet::new()),
            generic_by_identity: Mutex::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// Route discovery callbacks onto the UI thread and into the registry.
    pub fn wire_discovery(&self, discovery: &DiscoveryService) {
        let weak = self.self_ref.clone();
        discovery.on_device_found(Arc::new(move |result| {
            let Some(app) = weak.upgrade() else { return };
            let result = result.clone();
            let ui = app.ui.clone();
            ui.post(move || app.handle_discovery_result(&result));
        }));

        let weak = self.self_ref.clone();
        discovery.on_device_lost(Arc::new(move |device_id| {
            let Some(app) = weak.upgrade() else { return };
            let device_id = device_id.to_string();
            let ui = app.ui.clone();
            ui.post(move || app.handle_device_lost(&device_id));
        }));
    }

    /// A vendor manager produced a fully-configured device. Safe to call
    /// from any thread; registration happens on the UI thread.
    pub fn on_vendor_device_found(&self, device: Arc<dyn Device>, identity: Option<String>) {
        let weak = self.self_ref.clone();
        self.ui.post(move || {
            if let Some(app) = weak.upgrade() {
                app.register_vendor_device(device, identity);
            }
        });
    }

    /// UI-thread body of vendor registration.
    pub fn register_vendor_device(&self, device: Arc<dyn Device>, identity: Option<String>) {
        if let Some(identity) = &identity {
            self.claimed.lock().insert(identity.clone());
            let twin = self.generic_by_identity.lock().remove(identity);
            if let Some(twin_id) = twin {
                info!(device_id = %twin_id, "Replacing generic adapter with vendor device");
                self.registry.remove_device(&twin_id);
            }
        }

        let weak = self.self_ref.clone();
        device.set_state_callback(Arc::new(move |changed| {
            if let Some(app) = weak.upgrade() {
                app.on_device_state_changed(changed.device_id());
            }
        }));

        if self.registry.add_device(Arc::clone(&device)) {
            self.bus
                .publish(&AppEvent::device_connected(device.device_id()));
        }
    }

    /// UI-thread handler for a discovery sighting: build the generic
    /// placeholder unless a vendor manager owns (or will own) the device.
    pub fn handle_discovery_result(&self, result: &DiscoveryResult) {
        let identity = result.identity_key();
        match &identity {
            Some(identity) if self.claimed.lock().contains(identity) => {
                debug!(
                    device_id = %result.device_id,
                    "Skipping generic adapter, identity claimed by a vendor manager"
                );
                return;
            }
            None if self.vendor_hints.contains(result.device_type.as_str()) => {
                debug!(
                    device_id = %result.device_id,
                    hint = %result.device_type,
                    "No stable identity; deferring to the vendor manager by hint"
                );
                return;
            }
            _ => {}
        }

        let device = DiscoveredDeviceAdapter::new(result);
        if self.registry.add_device(device) {
            if let Some(identity) = identity {
                self.generic_by_identity
                    .lock()
                    .insert(identity, result.device_id.clone());
            }
        }
    }

    /// UI-thread handler for a discovery loss notice. Loss notices are the
    /// only thing that removes a device; failed refreshes never do.
    pub fn handle_device_lost(&self, device_id: &str) {
        if self.registry.remove_device(device_id).is_some() {
            self.bus.publish(&AppEvent::device_removed(device_id));
            self.generic_by_identity
                .lock()
                .retain(|_, generic_id| generic_id != device_id);
        }
    }

    /// Push-update fan-out: re-render notification on the UI thread plus a
    /// deferred bus event.
    fn on_device_state_changed(&self, device_id: String) {
        let registry = Arc::clone(&self.registry);
        let id = device_id.clone();
        self.ui.post(move || {
            if let Some(device) = registry.get_device(&id) {
                registry.update_device(&device);
            }
        });
        self.bus
            .publish_deferred(AppEvent::device_state_changed(device_id), &self.ui);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::UiQueue;
    use domain::{DiscoverySource, EventType};
    use infrastructure::drivers::bulb::BulbFeatures;
    use infrastructure::{BulbDevice, SimBulbTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn harness() -> (Arc<HubApp>, Arc<DeviceRegistry>, Arc<EventBus>, UiQueue) {
        let registry = Arc::new(DeviceRegistry::new());
        let bus = Arc::new(EventBus::new());
        let ui = UiQueue::new();
        let app = HubApp::new(registry.clone(), bus.clone(), ui.handle(), ["chromecast"]);
        (app, registry, bus, ui)
    }

    fn lamp_result(device_id: &str, mac: Option<&str>) -> DiscoveryResult {
        DiscoveryResult {
            device_id: device_id.to_string(),
            name: "Lamp".to_string(),
            ip_address: Some("192.168.1.60".to_string()),
            port: 38899,
            device_type: "hue_bridge".to_string(),
            source: DiscoverySource::Mdns,
            properties: mac
                .map(|mac| [("mac".to_string(), mac.to_string())].into())
                .unwrap_or_default(),
        }
    }

    fn vendor_bulb() -> Arc<BulbDevice> {
        BulbDevice::new(
            "bulb:a8bb50112233",
            "Desk bulb",
            "192.168.1.60",
            Some("a8bb50112233".to_string()),
            Arc::new(SimBulbTransport::new(BulbFeatures::default())),
        )
    }

    #[test]
    fn test_claimed_identity_suppresses_generic_adapter() {
        let (app, registry, _bus, ui) = harness();

        let bulb = vendor_bulb();
        let identity = device_identity(bulb.mac(), None);
        app.on_vendor_device_found(bulb, identity);
        ui.drain();
        assert_eq!(registry.device_count(), 1);

        // The same physical device then shows up via mDNS.
        app.handle_discovery_result(&lamp_result("mdns:Lamp", Some("A8:BB:50:11:22:33")));
        assert_eq!(registry.device_count(), 1);
        assert!(registry.get_device("mdns:Lamp").is_none());
    }

    #[test]
    fn test_vendor_arrival_evicts_generic_twin() {
        let (app, registry, _bus, ui) = harness();

        app.handle_discovery_result(&lamp_result("mdns:Lamp", Some("A8:BB:50:11:22:33")));
        assert!(registry.get_device("mdns:Lamp").is_some());

        let bulb = vendor_bulb();
        let identity = device_identity(bulb.mac(), None);
        app.on_vendor_device_found(bulb, identity);
        ui.drain();

        assert_eq!(registry.device_count(), 1);
        assert!(registry.get_device("mdns:Lamp").is_none());
        assert!(registry.get_device("bulb:a8bb50112233").is_some());
    }

    #[test]
    fn test_hint_fallback_applies_only_without_identity() {
        let (app, registry, _bus, _ui) = harness();

        // Managed hint, no identity: suppressed.
        let mut unidentified = lamp_result("mdns:TV", None);
        unidentified.ip_address = None;
        unidentified.device_type = "chromecast".to_string();
        app.handle_discovery_result(&unidentified);
        assert_eq!(registry.device_count(), 0);

        // Managed hint but with an identity: the generic adapter stands in
        // until the manager claims it.
        let mut identified = lamp_result("mdns:TV2", None);
        identified.device_type = "chromecast".to_string();
        app.handle_discovery_result(&identified);
        assert_eq!(registry.device_count(), 1);
    }

    #[test]
    fn test_lost_device_leaves_registry_and_fires_event() {
        let (app, registry, bus, _ui) = harness();
        let removals = Arc::new(AtomicUsize::new(0));
        let hits = removals.clone();
        bus.subscribe(
            EventType::DeviceRemoved,
            Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );

        app.handle_discovery_result(&lamp_result("mdns:Lamp", None));
        assert_eq!(registry.device_count(), 1);

        app.handle_device_lost("mdns:Lamp");
        assert_eq!(registry.device_count(), 0);
        assert_eq!(removals.load(Ordering::SeqCst), 1);

        // A loss notice for an unknown device changes nothing.
        app.handle_device_lost("mdns:Ghost");
        assert_eq!(removals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_state_callback_routes_through_ui_queue() {
        let (app, registry, bus, ui) = harness();
        let updates = Arc::new(AtomicUsize::new(0));
        let hits = updates.clone();
        registry.on_device_updated(Arc::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        let events = Arc::new(AtomicUsize::new(0));
        let hits = events.clone();
        bus.subscribe(
            EventType::DeviceStateChanged,
            Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let bulb = vendor_bulb();
        assert!(bulb.connect().await);
        app.on_vendor_device_found(bulb.clone(), None);
        ui.drain();

        // A successful command notifies the registered state callback.
        assert!(bulb.turn_on().await.unwrap());

        // Nothing observable until the UI tick.
        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(events.load(Ordering::SeqCst), 0);
        ui.drain();
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }
}
