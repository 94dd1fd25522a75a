//! Infrastructure layer - external integrations
//!
//! Discovery backends, vendor device adapters and their managers, the
//! simulated transports, and settings persistence.

pub mod discovery;
pub mod drivers;
pub mod settings;

pub use discovery::MdnsBackend;
pub use drivers::bulb::{BulbDevice, BulbManager, BulbTransport};
pub use drivers::cast::{CastDevice, CastManager, CastTransport};
pub use drivers::generic::DiscoveredDeviceAdapter;
pub use drivers::simulated::{SimBulbTransport, SimCastTransport};
pub use settings::{AppSettings, SettingsStore};
