//! Error types for the MCP2210 bridge transport

use thiserror::Error;

/// Result type for MCP2210 operations
pub type Result<T> = std::result::Result<T, Mcp2210Error>;

/// Errors that can occur when talking to the bridge over USB
#[derive(Debug, Error)]
pub enum Mcp2210Error {
    /// No matching device is attached
    #[error("MCP2210 bridge not found (VID:{vid:04x} PID:{pid:04x}, index {index})")]
    DeviceNotFound {
        /// Vendor id searched for
        vid: u16,
        /// Product id searched for
        pid: u16,
        /// Index among matching devices
        index: usize,
    },

    /// Device enumeration or open failed
    #[error("Failed to open MCP2210 bridge: {0}")]
    OpenFailed(String),

    /// The HID interface could not be claimed
    #[error("Failed to claim interface {interface}: {reason}")]
    ClaimFailed {
        /// Interface number
        interface: u8,
        /// Underlying USB error
        reason: String,
    },

    /// An interrupt transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(#[from] nusb::transfer::TransferError),

    /// A device option could not be parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<nusb::Error> for Mcp2210Error {
    fn from(e: nusb::Error) -> Self {
        Mcp2210Error::OpenFailed(e.to_string())
    }
}

impl From<Mcp2210Error> for mica_gpio_core::Error {
    fn from(e: Mcp2210Error) -> Self {
        mica_gpio_core::Error::TransportFailure(e.to_string())
    }
}
