//! Application layer - use cases and runtime plumbing
//!
//! Owns the device registry, the pub/sub bus, the async bridge between
//! device I/O and the UI thread, and the discovery service facade.

pub mod bridge;
pub mod bus;
pub mod discovery;
pub mod registry;
pub mod ui;

pub use bridge::AsyncBridge;
pub use bus::{EventBus, Subscriber};
pub use discovery::{DiscoveryBackend, DiscoveryService};
pub use registry::DeviceRegistry;
pub use ui::{UiHandle, UiQueue};
