use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

fn default_theme() -> String {
    "dark".to_string()
}
fn default_window_width() -> u32 {
    900
}
fn default_window_height() -> u32 {
    600
}
fn default_true() -> bool {
    true
}
fn default_discovery_interval() -> u64 {
    60
}
fn default_polling_interval() -> u64 {
    5
}

/// Configured bulb entry persisted with the settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulbEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub ip: String,
    #[serde(default)]
    pub mac: Option<String>,
}

/// Application settings with defaults. Unknown fields in the file are
/// ignored; missing fields fall back to the defaults, so an old or
/// hand-edited file still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    // Appearance
    #[serde(default = "default_theme")]
    pub theme: String,

    // Window
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default)]
    pub start_minimized: bool,

    // Discovery
    #[serde(default = "default_true")]
    pub auto_discover: bool,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,

    // Device polling
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_true")]
    pub polling_enabled: bool,

    // Configured bulbs
    #[serde(default)]
    pub bulb_devices: Vec<BulbEntry>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            start_minimized: false,
            auto_discover: true,
            discovery_interval_secs: default_discovery_interval(),
            polling_interval_secs: default_polling_interval(),
            polling_enabled: true,
            bulb_devices: Vec::new(),
        }
    }
}

/// JSON settings persistence under the platform config directory.
///
/// Two flat documents: `settings.json` (typed) and `devices.json` (opaque
/// records, no schema validation beyond best-effort field presence).
/// Corrupt or missing files degrade to defaults with a warning.
pub struct SettingsStore {
    settings_file: PathBuf,
    devices_file: PathBuf,
    cached: Mutex<Option<AppSettings>>,
}

impl SettingsStore {
    pub fn new(app_name: &str) -> Self {
        let config_dir = ProjectDirs::from("", "", app_name)
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_dir(config_dir)
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            settings_file: config_dir.join("settings.json"),
            devices_file: config_dir.join("devices.json"),
            cached: Mutex::new(None),
        }
    }

    /// Load settings from disk, or return defaults. Cached after the first
    /// read.
    pub fn load(&self) -> AppSettings {
        if let Some(settings) = self.cached.lock().clone() {
            return settings;
        }

        let settings = match fs::read_to_string(&self.settings_file) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    info!(path = %self.settings_file.display(), "Settings loaded");
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings, using defaults: {e}");
                    AppSettings::default()
                }
            },
            Err(_) => {
                info!("No settings file found, using defaults");
                AppSettings::default()
            }
        };

        *self.cached.lock() = Some(settings.clone());
        settings
    }

    /// Persist settings, replacing the cached copy.
    pub fn save(&self, settings: &AppSettings) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(settings)?;
        fs::write(&self.settings_file, contents)?;
        *self.cached.lock() = Some(settings.clone());
        info!(path = %self.settings_file.display(), "Settings saved");
        Ok(())
    }

    /// Opaque device records. Missing or corrupt file yields an empty
    /// list.
    pub fn load_devices(&self) -> Vec<serde_json::Value> {
        match fs::read_to_string(&self.devices_file) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Failed to parse devices file, ignoring it: {e}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    pub fn save_devices(&self, devices: &[serde_json::Value]) -> anyhow::Result<()> {
        if let Some(parent) = self.devices_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(devices)?;
        fs::write(&self.devices_file, contents)?;
        Ok(())
    }
}
