pub mod bulb;
pub mod cast;
pub mod generic;
pub mod simulated;

pub use bulb::{BulbDevice, BulbManager, BulbSeed, BulbTransport};
pub use cast::{CastDevice, CastEndpoint, CastManager, CastTransport};
pub use generic::DiscoveredDeviceAdapter;
pub use simulated::{SimBulbTransport, SimCastTransport};
