//! Domain layer - pure device model with no runtime dependencies
//!
//! This crate contains:
//! - The polymorphic [`Device`] contract and the shared [`DeviceCore`] cell
//! - Value objects (DeviceType, DeviceCapability, DeviceState)
//! - Application events
//! - Discovery records
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Capability gating enforced at the contract level
//! - Testable in isolation

pub mod device;
pub mod discovery;
pub mod error;
pub mod event;

// Re-export commonly used types
pub use device::{
    Device, DeviceCapability, DeviceCore, DeviceInfo, DeviceState, DeviceType, PlaybackState,
    StateCallback,
};
pub use discovery::{DiscoveryResult, DiscoverySource};
pub use error::DeviceError;
pub use event::{AppEvent, EventType};
