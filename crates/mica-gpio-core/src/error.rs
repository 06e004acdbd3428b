//! Error types for mica-gpio-core

use thiserror::Error;

/// Result type for GPIO engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the codec, the register protocol and the GPIO context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Channel id outside of 1..=8
    #[error("Invalid channel {0} (valid channels are 1-8)")]
    InvalidChannel(u8),

    /// I/O error while talking to the bridge
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The SPI bus is held by an external owner
    #[error("SPI bus not available (external owner has control over it)")]
    BusUnavailable,

    /// The bridge is still busy with a previous SPI transfer
    #[error("SPI transfer in progress")]
    TransferInProgress,

    /// NVRAM write rejected by password protection or a permanent lock
    #[error("Settings blocked (password mismatch or permanently locked)")]
    SettingsBlocked,

    /// No transport session has been opened yet
    #[error("Device not ready")]
    DeviceNotReady,

    /// No response report arrived within the configured retries
    #[error("Timeout waiting for response report")]
    Timeout,

    /// The bridge answered with a command/status pair we do not understand
    #[error("Unexpected response 0x{status:02X} to command 0x{command:02X}")]
    UnexpectedResponse {
        /// Command code echoed in the response
        command: u8,
        /// Status byte of the response
        status: u8,
    },
}
