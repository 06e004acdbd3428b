//! USB identifiers and session configuration of the bridge

use std::time::Duration;

use crate::error::{Mcp2210Error, Result};

/// USB vendor id of the bridge
pub const MCP2210_USB_VENDOR: u16 = 0x2B9D;
/// USB product id of the bridge
pub const MCP2210_USB_PRODUCT: u16 = 0x8001;

/// HID interface carrying the command reports
pub const HID_INTERFACE: u8 = 0;
/// Interrupt OUT endpoint for command reports
pub const WRITE_EP: u8 = 0x01;
/// Interrupt IN endpoint for response reports
pub const READ_EP: u8 = 0x81;

/// Timeout for sending one command report
pub const USB_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Which device to open and how to talk to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Vendor id to match
    pub vid: u16,
    /// Product id to match
    pub pid: u16,
    /// Index among matching devices
    pub index: usize,
    /// Write timeout for command reports
    pub write_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vid: MCP2210_USB_VENDOR,
            pid: MCP2210_USB_PRODUCT,
            index: 0,
            write_timeout: USB_WRITE_TIMEOUT,
        }
    }
}

impl DeviceConfig {
    /// Default configuration (first device with the bridge's VID/PID)
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a different vendor id
    pub fn with_vid(mut self, vid: u16) -> Self {
        self.vid = vid;
        self
    }

    /// Match a different product id
    pub fn with_pid(mut self, pid: u16) -> Self {
        self.pid = pid;
        self
    }

    /// Open the nth matching device
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Set the command report write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Parse a USB id given as hex, with or without `0x`
pub(crate) fn parse_usb_id(key: &str, value: &str) -> Result<u16> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16)
        .map_err(|_| Mcp2210Error::ConfigError(format!("Invalid {} value: {}", key, value)))
}
