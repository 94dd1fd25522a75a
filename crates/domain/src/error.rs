use thiserror::Error;

use crate::device::DeviceCapability;

/// Contract-violation errors surfaced by device operations.
///
/// Transport failures never appear here: adapters absorb them into a `false`
/// return plus an `is_online` flip on the device state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("{device} does not support {capability}")]
    UnsupportedCapability {
        device: String,
        capability: DeviceCapability,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
