use async_trait::async_trait;
use std::collections::HashSet;

mod capability;
mod core;
mod device_type;
mod info;
mod state;

pub use capability::DeviceCapability;
pub use self::core::{DeviceCore, StateCallback};
pub use device_type::DeviceType;
pub use info::DeviceInfo;
pub use state::{DeviceState, PlaybackState};

use crate::error::{DeviceError, Result};

/// Uniform lifecycle and control surface over heterogeneous vendor
/// transports.
///
/// Control operations are capability-gated: each checks the corresponding
/// capability before validation or dispatch and fails with
/// [`DeviceError::UnsupportedCapability`] when it is absent. Transport
/// failures never cross this boundary as errors; they surface as an
/// `Ok(false)` return plus an `is_online` flip on the state.
///
/// The provided bodies below guard and report "nothing happened"
/// (`Ok(false)`); adapters that support an operation override it and repeat
/// the guard as the first statement of their own body.
#[async_trait]
pub trait Device: Send + Sync {
    /// Snapshot of identity and metadata.
    fn info(&self) -> DeviceInfo;

    /// Immutable per adapter.
    fn device_type(&self) -> DeviceType;

    /// Snapshot of the current capability set.
    fn capabilities(&self) -> HashSet<DeviceCapability>;

    /// Snapshot of the owned state.
    fn state(&self) -> DeviceState;

    /// User-initiated rename.
    fn rename(&self, name: String);

    /// Register the state-changed callback. One slot per device; last
    /// registration wins.
    fn set_state_callback(&self, callback: StateCallback);

    fn device_id(&self) -> String {
        self.info().device_id
    }

    fn name(&self) -> String {
        self.info().name
    }

    fn is_online(&self) -> bool {
        self.state().is_online
    }

    fn is_on(&self) -> Option<bool> {
        self.state().is_on
    }

    fn has_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn require_capability(&self, capability: DeviceCapability) -> Result<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(DeviceError::UnsupportedCapability {
                device: self.name(),
                capability,
            })
        }
    }

    /// Serializable description of the device for persistence.
    fn to_json(&self) -> serde_json::Value {
        let info = self.info();
        let state = self.state();
        let mut capabilities: Vec<String> =
            self.capabilities().iter().map(|c| c.to_string()).collect();
        capabilities.sort();
        serde_json::json!({
            "id": info.device_id,
            "name": info.name,
            "ip_address": info.ip_address,
            "model": info.model,
            "manufacturer": info.manufacturer,
            "type": self.device_type(),
            "capabilities": capabilities,
            "state": {
                "is_online": state.is_online,
                "is_on": state.is_on,
                "brightness": state.brightness,
                "color_temp": state.color_temp,
                "rgb": state.rgb,
            },
        })
    }

    /// Establish the transport session. Safe to call when already
    /// connected: returns the current success state instead of
    /// re-establishing destructively. Transport errors yield `false`.
    async fn connect(&self) -> bool;

    /// Release transport resources. Safe to call repeatedly.
    async fn disconnect(&self);

    /// Pull the latest state from the device. On transport failure the
    /// last-known state is returned with `is_online` cleared; prior good
    /// data is never discarded.
    async fn refresh_state(&self) -> DeviceState;

    async fn turn_on(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        Ok(false)
    }

    async fn turn_off(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        Ok(false)
    }

    /// Branches on the current `is_on`; unknown counts as off, so the
    /// toggle attempts `turn_on`.
    async fn toggle(&self) -> Result<bool> {
        if self.is_on().unwrap_or(false) {
            self.turn_off().await
        } else {
            self.turn_on().await
        }
    }

    async fn set_brightness(&self, level: u8) -> Result<bool> {
        self.require_capability(DeviceCapability::Brightness)?;
        validate_percent("brightness", level)?;
        Ok(false)
    }

    async fn set_color_temp(&self, _kelvin: u16) -> Result<bool> {
        self.require_capability(DeviceCapability::ColorTemp)?;
        Ok(false)
    }

    /// Components are `u8`, so the documented 0-255 range is enforced by
    /// the type.
    async fn set_rgb(&self, _r: u8, _g: u8, _b: u8) -> Result<bool> {
        self.require_capability(DeviceCapability::RgbColor)?;
        Ok(false)
    }

    async fn set_volume(&self, level: u8) -> Result<bool> {
        self.require_capability(DeviceCapability::Volume)?;
        validate_percent("volume", level)?;
        Ok(false)
    }

    async fn play(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::Playback)?;
        Ok(false)
    }

    async fn pause(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::Playback)?;
        Ok(false)
    }

    async fn stop(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::Playback)?;
        Ok(false)
    }

    /// Seek to an absolute position in seconds.
    async fn seek(&self, _position: f64) -> Result<bool> {
        self.require_capability(DeviceCapability::Seek)?;
        Ok(false)
    }

    /// Seek relative to the current position (negative = backward).
    async fn seek_relative(&self, _offset: f64) -> Result<bool> {
        self.require_capability(DeviceCapability::Seek)?;
        Ok(false)
    }
}

/// Range check shared by the percentage-valued operations. Runs after the
/// capability guard and before any transport dispatch.
pub fn validate_percent(field: &str, level: u8) -> Result<()> {
    if level > 100 {
        return Err(DeviceError::InvalidArgument(format!(
            "{field} must be between 0 and 100, got {level}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal device exercising the provided operation bodies.
    struct BareSwitch {
        core: DeviceCore,
        on_calls: AtomicUsize,
        off_calls: AtomicUsize,
    }

    impl BareSwitch {
        fn new() -> Self {
            Self {
                core: DeviceCore::new(
                    DeviceInfo::new("switch:1", "Desk switch"),
                    [DeviceCapability::OnOff],
                ),
                on_calls: AtomicUsize::new(0),
                off_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Device for BareSwitch {
        fn info(&self) -> DeviceInfo {
            self.core.info()
        }
        fn device_type(&self) -> DeviceType {
            DeviceType::Switch
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

        async fn turn_on(&self) -> Result<bool> {
            self.require_capability(DeviceCapability::OnOff)?;
            self.on_calls.fetch_add(1, Ordering::SeqCst);
            self.core.update_state(|s| s.is_on = Some(true));
            Ok(true)
        }

        async fn turn_off(&self) -> Result<bool> {
            self.require_capability(DeviceCapability::OnOff)?;
            self.off_calls.fetch_add(1, Ordering::SeqCst);
            self.core.update_state(|s| s.is_on = Some(false));
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_gated_operation_fails_without_capability() {
        let device = BareSwitch::new();
        let before = device.state();

        let err = device.set_brightness(50).await.unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedCapability { .. }));
        let err = device.play().await.unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedCapability { .. }));

        // Failed operations leave the state untouched.
        assert_eq!(device.state(), before);
    }

    #[tokio::test]
    async fn test_capability_checked_before_range() {
        // 250 is out of range, but the capability guard fires first.
        let device = BareSwitch::new();
        let err = device.set_brightness(250).await.unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn test_toggle_treats_unknown_as_off() {
        let device = BareSwitch::new();
        assert_eq!(device.is_on(), None);

        assert!(device.toggle().await.unwrap());
        assert_eq!(device.on_calls.load(Ordering::SeqCst), 1);
        assert_eq!(device.off_calls.load(Ordering::SeqCst), 0);

        assert!(device.toggle().await.unwrap());
        assert_eq!(device.on_calls.load(Ordering::SeqCst), 1);
        assert_eq!(device.off_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validate_percent_bounds() {
        assert!(validate_percent("volume", 0).is_ok());
        assert!(validate_percent("volume", 100).is_ok());
        let err = validate_percent("volume", 101).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
    }

    #[test]
    fn test_to_json_carries_identity_and_capabilities() {
        let device = BareSwitch::new();
        let json = device.to_json();
        assert_eq!(json["id"], "switch:1");
        assert_eq!(json["type"], "switch");
        assert_eq!(json["capabilities"][0], "on_off");
    }

    #[test]
    fn test_rename_visible_in_info() {
        let device = BareSwitch::new();
        device.rename("Bench switch".to_string());
        assert_eq!(device.name(), "Bench switch");
    }
}
