use async_trait::async_trait;
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use application::discovery::{BackendFound, BackendLost, DiscoveryBackend, clean_service_name};
use domain::discovery::{DiscoveryResult, DiscoverySource, service_type_hint};

/// IoT service types worth browsing.
const SERVICE_TYPES: [&str; 7] = [
    "_hue._tcp.local.",        // Philips Hue
    "_tradfri._udp.local.",    // IKEA Tradfri
    "_googlecast._tcp.local.", // Google Cast receivers
    "_airplay._tcp.local.",    // Apple AirPlay
    "_esphomelib._tcp.local.", // ESPHome devices
    "_http._tcp.local.",       // Generic HTTP services
    "_homekit._tcp.local.",    // Apple HomeKit
];

/// mDNS/DNS-SD discovery backend.
///
/// Browses the fixed service-type list and converts resolved services to
/// [`DiscoveryResult`]s; protocol internals stay inside `mdns-sd`. Each
/// browse runs its receive loop on a blocking task that exits when the
/// daemon stops the search.
pub struct MdnsBackend {
    service_types: Vec<String>,
    daemon: Mutex<Option<ServiceDaemon>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MdnsBackend {
    pub fn new() -> Self {
        Self::with_service_types(SERVICE_TYPES.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_service_types(service_types: Vec<String>) -> Self {
        Self {
            service_types,
            daemon: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MdnsBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryBackend for MdnsBackend {
    fn name(&self) -> &'static str {
        "mdns"
    }

    async fn start(&self, on_found: BackendFound, on_lost: BackendLost) -> bool {
        if self.daemon.lock().is_some() {
            warn!("mDNS discovery already running");
            return true;
        }

        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Failed to create mDNS daemon: {e}");
                return false;
            }
        };

        let mut tasks = Vec::new();
        for service_type in &self.service_types {
            let receiver = match daemon.browse(service_type) {
                Ok(receiver) => receiver,
                Err(e) => {
                    warn!(service_type = %service_type, "Failed to browse: {e}");
                    continue;
                }
            };
            debug!(service_type = %service_type, "Started browsing");

            let service_type = service_type.clone();
            let on_found = on_found.clone();
            let on_lost = on_lost.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                for event in receiver.iter() {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            on_found(result_from_service(&service_type, &info));
                        }
                        ServiceEvent::ServiceRemoved(_, fullname) => {
                            on_lost(format!("mdns:{fullname}"));
                        }
                        ServiceEvent::SearchStopped(_) => break,
                        _ => {}
                    }
                }
            }));
        }

        if tasks.is_empty() {
            error!("No mDNS service type could be browsed");
            return false;
        }

        info!(
            service_types = self.service_types.len(),
            "mDNS discovery started"
        );
        *self.daemon.lock() = Some(daemon);
        *self.tasks.lock() = tasks;
        true
    }

    async fn stop(&self) {
        let daemon = self.daemon.lock().take();
        let Some(daemon) = daemon else {
            return;
        };

        for service_type in &self.service_types {
            let _ = daemon.stop_browse(service_type);
        }
        if let Err(e) = daemon.shutdown() {
            warn!("Failed to shut down mDNS daemon: {e}");
        }

        // The receive loops end when the daemon closes their channels.
        self.tasks.lock().clear();
        info!("mDNS discovery stopped");
    }
}

fn result_from_service(service_type: &str, info: &ResolvedService) -> DiscoveryResult {
    let fullname = info.get_fullname();
    let ip_address = info
        .get_addresses()
        .iter()
        .next()
        .map(|address| address.to_ip_addr().to_string());

    let properties = info
        .get_properties()
        .iter()
        .map(|property| (property.key().to_string(), property.val_str().to_string()))
        .collect();

    DiscoveryResult {
        device_id: format!("mdns:{fullname}"),
        name: clean_service_name(fullname),
        ip_address,
        port: info.get_port(),
        device_type: service_type_hint(service_type).to_string(),
        source: DiscoverySource::Mdns,
        properties,
    }
}
