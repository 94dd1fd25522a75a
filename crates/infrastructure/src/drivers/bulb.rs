use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use domain::device::validate_percent;
use domain::error::Result;
use domain::{
    Device, DeviceCapability, DeviceCore, DeviceInfo, DeviceState, DeviceType, StateCallback,
};

/// Lowest raw brightness a bulb accepts; below this the firmware clamps.
const NATIVE_BRIGHTNESS_MIN: u8 = 10;
const NATIVE_BRIGHTNESS_MAX: u8 = 255;

/// Raw pilot report from a bulb. Brightness is the bulb's native 10-255.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BulbPilot {
    pub is_on: bool,
    pub brightness: Option<u8>,
    /// Kelvin
    pub color_temp: Option<u16>,
    pub rgb: Option<(u8, u8, u8)>,
}

/// What a bulb model can do, probed once at connect.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BulbFeatures {
    pub rgb: bool,
    pub color_temp: bool,
}

/// One write to a bulb. Unset fields are left alone by the firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PilotCommand {
    pub on: Option<bool>,
    /// Native 10-255
    pub brightness: Option<u8>,
    /// Kelvin
    pub color_temp: Option<u16>,
    pub rgb: Option<(u8, u8, u8)>,
}

impl PilotCommand {
    pub fn power(on: bool) -> Self {
        Self {
            on: Some(on),
            ..Self::default()
        }
    }
}

/// Wire seam around one bulb. The real UDP pilot protocol lives behind
/// this trait; the crate ships a simulated implementation.
#[async_trait]
pub trait BulbTransport: Send + Sync {
    async fn fetch_pilot(&self) -> anyhow::Result<BulbPilot>;
    async fn set_pilot(&self, command: PilotCommand) -> anyhow::Result<()>;
    /// Model capability probe.
    async fn features(&self) -> anyhow::Result<BulbFeatures>;
}

/// Map device-side 0-100 to the bulb's native brightness range.
fn percent_to_native(level: u8) -> u8 {
    let raw = 10.0 + (f64::from(level) / 100.0) * 245.0;
    (raw.round() as u8).clamp(NATIVE_BRIGHTNESS_MIN, NATIVE_BRIGHTNESS_MAX)
}

/// Map the bulb's native brightness back to 0-100.
fn native_to_percent(raw: u8) -> u8 {
    let level = (f64::from(raw) - 10.0) / 245.0 * 100.0;
    (level as u8).min(100)
}

/// Smart bulb adapter.
///
/// Light with OnOff and Brightness; RgbColor and ColorTemp are added at
/// connect when the model probe reports support.
pub struct BulbDevice {
    core: DeviceCore,
    transport: Arc<dyn BulbTransport>,
    mac: Option<String>,
    connected: AtomicBool,
}

impl BulbDevice {
    pub fn new(
        device_id: impl Into<String>,
        name: impl Into<String>,
        ip_address: impl Into<String>,
        mac: Option<String>,
        transport: Arc<dyn BulbTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: DeviceCore::new(
                DeviceInfo::new(device_id, name)
                    .with_ip(ip_address)
                    .with_model("Smart Bulb")
                    .with_manufacturer("WiZ"),
                [DeviceCapability::OnOff, DeviceCapability::Brightness],
            ),
            transport,
            mac,
            connected: AtomicBool::new(false),
        })
    }

    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn apply_pilot(&self, pilot: &BulbPilot) {
        self.core.update_state(|state| {
            state.is_online = true;
            state.is_on = Some(pilot.is_on);
            match pilot.brightness {
                Some(raw) => state.set_brightness(native_to_percent(raw)),
                None => state.set_brightness(if pilot.is_on { 100 } else { 0 }),
            }
            if let Some(kelvin) = pilot.color_temp {
                state.color_temp = Some(kelvin);
            }
            if let Some(rgb) = pilot.rgb {
                state.rgb = Some(rgb);
            }
        });
    }

    /// Send a pilot write; transport failures are absorbed into a `false`
    /// return and an offline flip, leaving the rest of the state untouched.
    async fn write_pilot(&self, command: PilotCommand, action: &str) -> bool {
        match self.transport.set_pilot(command).await {
            Ok(()) => true,
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to {action}: {e}");
                self.core.mark_offline();
                false
            }
        }
    }
}

#[async_trait]
impl Device for BulbDevice {
    fn info(&self) -> DeviceInfo {
        self.core.info()
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Light
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
        if self.is_connected() {
            return true;
        }

        match self.transport.features().await {
            Ok(features) => {
                if features.rgb {
                    self.core.add_capability(DeviceCapability::RgbColor);
                }
                if features.color_temp {
                    self.core.add_capability(DeviceCapability::ColorTemp);
                }
            }
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to probe bulb: {e}");
                self.core.mark_offline();
                return false;
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        self.refresh_state().await;
        info!(
            device_id = %self.core.device_id(),
            name = %self.core.name(),
            "Connected to bulb"
        );
        true
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn refresh_state(&self) -> DeviceState {
        if !self.is_connected() {
            return self.core.state();
        }
        match self.transport.fetch_pilot().await {
            Ok(pilot) => {
                self.apply_pilot(&pilot);
                self.core.state()
            }
            Err(e) => {
                warn!(device_id = %self.core.device_id(), "Failed to refresh state: {e}");
                self.core.mark_offline()
            }
        }
    }

    async fn turn_on(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        if !self.is_connected() {
            return Ok(false);
        }
        if !self.write_pilot(PilotCommand::power(true), "turn on").await {
            return Ok(false);
        }
        self.core.update_state(|state| state.is_on = Some(true));
        debug!(device_id = %self.core.device_id(), "Turned on");
        self.core.notify_state_changed(self);
        Ok(true)
    }

    async fn turn_off(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        if !self.is_connected() {
            return Ok(false);
        }
        if !self.write_pilot(PilotCommand::power(false), "turn off").await {
            return Ok(false);
        }
        self.core.update_state(|state| state.is_on = Some(false));
        debug!(device_id = %self.core.device_id(), "Turned off");
        self.core.notify_state_changed(self);
        Ok(true)
    }

    async fn set_brightness(&self, level: u8) -> Result<bool> {
        self.require_capability(DeviceCapability::Brightness)?;
        validate_percent("brightness", level)?;
        if !self.is_connected() {
            return Ok(false);
        }

        let command = PilotCommand {
            on: Some(true),
            brightness: Some(percent_to_native(level)),
            ..PilotCommand::default()
        };
        if !self.write_pilot(command, "set brightness").await {
            return Ok(false);
        }
        self.core.update_state(|state| {
            state.set_brightness(level);
            state.is_on = Some(level > 0);
        });
        self.core.notify_state_changed(self);
        Ok(true)
    }

    async fn set_color_temp(&self, kelvin: u16) -> Result<bool> {
        self.require_capability(DeviceCapability::ColorTemp)?;
        if !self.is_connected() {
            return Ok(false);
        }

        let command = PilotCommand {
            on: Some(true),
            color_temp: Some(kelvin),
            ..PilotCommand::default()
        };
        if !self.write_pilot(command, "set color temperature").await {
            return Ok(false);
        }
        self.core.update_state(|state| {
            state.color_temp = Some(kelvin);
            state.rgb = None;
            state.is_on = Some(true);
        });
        self.core.notify_state_changed(self);
        Ok(true)
    }

    async fn set_rgb(&self, r: u8, g: u8, b: u8) -> Result<bool> {
        self.require_capability(DeviceCapability::RgbColor)?;
        if !self.is_connected() {
            return Ok(false);
        }

        let command = PilotCommand {
            on: Some(true),
            rgb: Some((r, g, b)),
            ..PilotCommand::default()
        };
        if !self.write_pilot(command, "set color").await {
            return Ok(false);
        }
        self.core.update_state(|state| {
            state.rgb = Some((r, g, b));
            state.is_on = Some(true);
        });
        self.core.notify_state_changed(self);
        Ok(true)
    }
}

/// Configured bulb entry, typically read from settings.
#[derive(Debug, Clone)]
pub struct BulbSeed {
    pub name: Option<String>,
    pub ip_address: String,
    pub mac: Option<String>,
}

pub type BulbFoundCallback = Arc<dyn Fn(Arc<BulbDevice>) + Send + Sync>;
pub type BulbTransportFactory = Arc<dyn Fn(&BulbSeed) -> Arc<dyn BulbTransport> + Send + Sync>;

/// Owns the bulb sessions: builds a device per configured seed, connects
/// it, and hands connected devices to the found callback.
pub struct BulbManager {
    on_device_found: BulbFoundCallback,
    transport_factory: BulbTransportFactory,
    seeds: Mutex<Vec<BulbSeed>>,
    devices: Mutex<HashMap<String, Arc<BulbDevice>>>,
    running: AtomicBool,
}

impl BulbManager {
    pub fn new(on_device_found: BulbFoundCallback, transport_factory: BulbTransportFactory) -> Self {
        Self {
            on_device_found,
            transport_factory,
            seeds: Mutex::new(Vec::new()),
            devices: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn set_seeds(&self, seeds: Vec<BulbSeed>) {
        *self.seeds.lock() = seeds;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn devices(&self) -> Vec<Arc<BulbDevice>> {
        self.devices.lock().values().cloned().collect()
    }

    /// Connect every configured bulb. Returns false only when nothing is
    /// configured; individual connection failures are logged and skipped.
    pub async fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return true;
        }

        let seeds = self.seeds.lock().clone();
        if seeds.is_empty() {
            debug!("No bulbs configured");
        }

        let mut found = 0usize;
        for seed in seeds {
            let device_id = match &seed.mac {
                Some(mac) => format!("bulb:{mac}"),
                None => format!("bulb:{}", seed.ip_address),
            };
            if self.devices.lock().contains_key(&device_id) {
                continue;
            }

            let last_octet = seed
                .ip_address
                .rsplit('.')
                .next()
                .unwrap_or(seed.ip_address.as_str());
            let name = seed
                .name
                .clone()
                .unwrap_or_else(|| format!("Bulb {last_octet}"));

            let transport = (self.transport_factory)(&seed);
            let device = BulbDevice::new(
                device_id.clone(),
                name,
                seed.ip_address.clone(),
                seed.mac.clone(),
                transport,
            );

            if device.connect().await {
                self.devices.lock().insert(device_id, Arc::clone(&device));
                (self.on_device_found)(device);
                found += 1;
            } else {
                warn!(ip = %seed.ip_address, "Failed to initialize bulb");
            }
        }

        info!(found, "Bulb discovery finished");
        true
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let devices: Vec<_> = self.devices.lock().drain().map(|(_, d)| d).collect();
        for device in devices {
            device.disconnect().await;
        }
        info!("Bulb manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_range_conversion() {
        assert_eq!(percent_to_native(0), 10);
        assert_eq!(percent_to_native(100), 255);
        assert_eq!(native_to_percent(10), 0);
        assert_eq!(native_to_percent(255), 100);
        // Round trip stays within one percent of the input.
        for level in [1u8, 25, 50, 75, 99] {
            let back = native_to_percent(percent_to_native(level));
            assert!(back.abs_diff(level) <= 1, "{level} -> {back}");
        }
    }
}
