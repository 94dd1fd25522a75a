use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
use app::{HubApp, device_identity};

use application::bridge::{ErrorCallback, SuccessCallback};
use application::{AsyncBridge, DeviceRegistry, DiscoveryBackend, DiscoveryService, EventBus, UiQueue};
use domain::Device;
use infrastructure::drivers::bulb::{
    BulbFeatures, BulbFoundCallback, BulbManager, BulbSeed, BulbTransport,
};
use infrastructure::drivers::cast::{CastEndpoint, CastFoundCallback, CastManager, CastTransport};
use infrastructure::drivers::simulated::{SimBulbTransport, SimCastTransport, playing_status};
use infrastructure::{MdnsBackend, SettingsStore};

/// UI tick, roughly one frame.
const TICK: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory (defaults to the platform config dir)
    #[arg(long)]
    config_dir: Option<String>,

    /// Skip network discovery
    #[arg(long)]
    no_discovery: bool,

    /// Seed simulated devices so the hub has something to manage
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,casita_hub=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🏠 Casita Hub Starting...");
    info!("🆔 Process ID: {}", std::process::id());
    let args = Args::parse();

    let store = match &args.config_dir {
        Some(config_dir) => {
            info!("📂 Config directory: {}", config_dir);
            SettingsStore::with_dir(config_dir)
        }
        None => SettingsStore::new("Casita"),
    };
    let settings = store.load();

    // Core services. This thread is the UI thread; the queue is drained by
    // the tick loop below.
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(DeviceRegistry::new());
    let bridge = Arc::new(AsyncBridge::new());
    let ui = UiQueue::new();

    let backends: Vec<Arc<dyn DiscoveryBackend>> =
        if args.no_discovery || !settings.auto_discover {
            info!("Network discovery disabled");
            Vec::new()
        } else {
            vec![Arc::new(MdnsBackend::new())]
        };
    let discovery = DiscoveryService::new(backends, Some(bus.clone()));

    let app = HubApp::new(registry.clone(), bus.clone(), ui.handle(), ["chromecast"]);
    app.wire_discovery(&discovery);

    // Vendor managers hand fully-configured devices back through the app.
    // Transports are simulated until real protocol adapters land behind the
    // same traits.
    let bulb_manager = {
        let app = app.clone();
        let on_found: BulbFoundCallback = Arc::new(move |bulb| {
            let identity = device_identity(bulb.mac(), bulb.info().ip_address.as_deref());
            let device: Arc<dyn Device> = bulb;
            app.on_vendor_device_found(device, identity);
        });
        Arc::new(BulbManager::new(
            on_found,
            Arc::new(|_seed: &BulbSeed| -> Arc<dyn BulbTransport> {
                Arc::new(SimBulbTransport::new(BulbFeatures {
                    rgb: true,
                    color_temp: true,
                }))
            }),
        ))
    };

    let cast_manager = {
        let app = app.clone();
        let on_found: CastFoundCallback = Arc::new(move |cast| {
            let identity = device_identity(None, cast.info().ip_address.as_deref());
            let device: Arc<dyn Device> = cast;
            app.on_vendor_device_found(device, identity);
        });
        Arc::new(CastManager::new(
            on_found,
            Arc::new(|_endpoint: &CastEndpoint| -> Arc<dyn CastTransport> {
                Arc::new(SimCastTransport::with_status(playing_status(
                    "Interstellar",
                    "Hans Zimmer",
                    9874.0,
                )))
            }),
        ))
    };

    // Known devices: configured bulbs, plus demo seeds on request.
    let mut seeds: Vec<BulbSeed> = settings
        .bulb_devices
        .iter()
        .map(|entry| BulbSeed {
            name: entry.name.clone(),
            ip_address: entry.ip.clone(),
            mac: entry.mac.clone(),
        })
        .collect();
    if args.demo && seeds.is_empty() {
        seeds.push(BulbSeed {
            name: Some("Demo bulb".to_string()),
            ip_address: "192.168.1.60".to_string(),
            mac: Some("a8bb50112233".to_string()),
        });
    }
    bulb_manager.set_seeds(seeds);

    if args.demo {
        cast_manager.set_endpoints(vec![CastEndpoint {
            uuid: "demo-cast".to_string(),
            name: "Demo TV".to_string(),
            ip_address: "192.168.1.40".to_string(),
            model: Some("Chromecast".to_string()),
            cast_type: "cast".to_string(),
        }]);
    }

    // Ctrl-C flips the shutdown flag; the tick loop notices.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    bridge.start();

    // All device I/O goes through the bridge, never this thread.
    {
        let discovery = discovery.clone();
        let bulb_manager = bulb_manager.clone();
        let cast_manager = cast_manager.clone();
        bridge.run_async(
            async move {
                discovery.start().await;
                bulb_manager.start().await;
                cast_manager.start().await;
                Ok::<_, Infallible>(())
            },
            None::<SuccessCallback<()>>,
            None::<ErrorCallback<Infallible>>,
        );
    }

    info!("Entering UI loop (ctrl-c to quit)");
    let poll_interval = Duration::from_secs(settings.polling_interval_secs.max(1));
    let mut last_poll = std::time::Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        ui.drain();

        // Periodic state refresh, device I/O on the bridge and re-render
        // notifications back on this thread.
        if settings.polling_enabled && last_poll.elapsed() >= poll_interval {
            last_poll = std::time::Instant::now();
            for device in registry.devices() {
                let device_id = device.device_id();
                let name = device.name();
                let registry = registry.clone();
                bridge.run_async_with_ui_callback(
                    async move { Ok::<_, Infallible>(device.refresh_state().await) },
                    &ui.handle(),
                    Some(Box::new(move |state: domain::DeviceState| {
                        debug!(device = %name, online = state.is_online, "Polled state");
                        if let Some(device) = registry.get_device(&device_id) {
                            registry.update_device(&device);
                        }
                    }) as SuccessCallback<domain::DeviceState>),
                    None::<ErrorCallback<Infallible>>,
                );
            }
        }

        std::thread::sleep(TICK);
    }

    info!("Shutting down");
    {
        let discovery = discovery.clone();
        let bulb_manager = bulb_manager.clone();
        let cast_manager = cast_manager.clone();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        bridge.run_async(
            async move {
                cast_manager.stop().await;
                bulb_manager.stop().await;
                discovery.stop().await;
                Ok::<_, Infallible>(())
            },
            Some(Box::new(move |()| {
                let _ = done_tx.send(());
            }) as SuccessCallback<()>),
            None::<ErrorCallback<Infallible>>,
        );
        if done_rx.recv_timeout(Duration::from_secs(5)).is_err() {
            warn!("Orderly manager shutdown timed out");
        }
    }
    bridge.stop();
    ui.drain();

    // Persist what we know for the next start.
    let records: Vec<serde_json::Value> = registry
        .devices()
        .iter()
        .map(|device| device.to_json())
        .collect();
    if let Err(e) = store.save_devices(&records) {
        warn!("Failed to save devices: {e}");
    }
    if let Err(e) = store.save(&settings) {
        warn!("Failed to save settings: {e}");
    }

    info!("Goodbye");
    Ok(())
}
