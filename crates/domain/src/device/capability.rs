use serde::{Deserialize, Serialize};
use std::fmt;

/// A named control surface a device may or may not support.
///
/// A device exposes a set of capabilities fixed at construction; the set may
/// grow once when the transport reveals more after connect (e.g. color
/// support detected on the first state refresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCapability {
    OnOff,
    Brightness,
    ColorTemp,
    RgbColor,
    TemperatureSensor,
    HumiditySensor,
    PowerMonitoring,
    Volume,
    Playback,
    Seek,
}

impl fmt::Display for DeviceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OnOff => "on_off",
            Self::Brightness => "brightness",
            Self::ColorTemp => "color_temp",
            Self::RgbColor => "rgb_color",
            Self::TemperatureSensor => "temperature_sensor",
            Self::HumiditySensor => "humidity_sensor",
            Self::PowerMonitoring => "power_monitoring",
            Self::Volume => "volume",
            Self::Playback => "playback",
            Self::Seek => "seek",
        };
        f.write_str(label)
    }
}
