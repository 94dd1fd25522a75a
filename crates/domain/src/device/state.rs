use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Playback states for media devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Unknown,
    Idle,
    Playing,
    Paused,
    Buffering,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Mutable snapshot of everything the hub knows about a device.
///
/// Percentage fields are clamped to their documented range before storage;
/// callers go through the setters below rather than assigning raw values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub is_online: bool,
    pub is_on: Option<bool>,
    /// 0-100
    pub brightness: Option<u8>,
    /// Kelvin (2700-6500 typical)
    pub color_temp: Option<u16>,
    /// (R, G, B) each 0-255
    pub rgb: Option<(u8, u8, u8)>,
    /// Celsius
    pub temperature: Option<f64>,
    /// Percentage
    pub humidity: Option<f64>,
    pub power_watts: Option<f64>,
    /// 0-100
    pub volume: Option<u8>,
    #[serde(default)]
    pub playback_state: PlaybackState,
    pub media_title: Option<String>,
    pub media_artist: Option<String>,
    /// Seconds
    pub media_duration: Option<f64>,
    /// Seconds
    pub media_position: Option<f64>,
    /// Device-specific data
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl DeviceState {
    pub fn set_brightness(&mut self, level: u8) {
        self.brightness = Some(level.min(100));
    }

    pub fn set_volume(&mut self, level: u8) {
        self.volume = Some(level.min(100));
    }

    pub fn set_humidity(&mut self, percent: f64) {
        self.humidity = Some(percent.clamp(0.0, 100.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_setters_clamp() {
        let mut state = DeviceState::default();
        state.set_brightness(250);
        state.set_volume(101);
        state.set_humidity(130.0);
        assert_eq!(state.brightness, Some(100));
        assert_eq!(state.volume, Some(100));
        assert_eq!(state.humidity, Some(100.0));

        state.set_humidity(-3.5);
        assert_eq!(state.humidity, Some(0.0));
    }

    #[test]
    fn test_defaults_are_unknown() {
        let state = DeviceState::default();
        assert!(!state.is_online);
        assert_eq!(state.is_on, None);
        assert_eq!(state.playback_state, PlaybackState::Unknown);
        assert!(state.extra.is_empty());
    }
}
