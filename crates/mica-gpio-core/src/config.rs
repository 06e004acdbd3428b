//! Runtime configuration of the GPIO engine

use std::time::Duration;

use crate::settings::{ChipSettings, TransferSettings};

/// Default pause between two polling iterations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Default back-off before retrying to open a missing device
pub const DEFAULT_READY_BACKOFF: Duration = Duration::from_secs(1);
/// Default wait for a single response report
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);
/// Default number of response waits before giving up
pub const DEFAULT_RESPONSE_RETRIES: u32 = 20;

/// Configuration for [`crate::MicaGpio`]
#[derive(Debug, Clone)]
pub struct Config {
    /// Sleep between polling iterations
    pub poll_interval: Duration,
    /// Sleep before retrying to open a device that is not ready
    pub ready_backoff: Duration,
    /// Wait for one response report
    pub response_timeout: Duration,
    /// Response waits before a request fails with [`crate::Error::Timeout`]
    pub response_retries: u32,
    /// Write power-up settings to NVRAM when a session is opened
    pub apply_power_up_settings: bool,
    /// Chip settings written at power-up
    pub chip_settings: ChipSettings,
    /// Transfer settings written at power-up
    pub transfer_settings: TransferSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ready_backoff: DEFAULT_READY_BACKOFF,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            response_retries: DEFAULT_RESPONSE_RETRIES,
            apply_power_up_settings: true,
            chip_settings: ChipSettings::power_up_default(),
            transfer_settings: TransferSettings::power_up_default(),
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the back-off used while the device is not ready
    pub fn with_ready_backoff(mut self, backoff: Duration) -> Self {
        self.ready_backoff = backoff;
        self
    }

    /// Set the per-report response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set how many response waits are attempted
    pub fn with_response_retries(mut self, retries: u32) -> Self {
        self.response_retries = retries;
        self
    }

    /// Enable or disable writing power-up settings on open
    pub fn with_power_up_settings(mut self, apply: bool) -> Self {
        self.apply_power_up_settings = apply;
        self
    }

    /// Set the chip settings written at power-up
    pub fn with_chip_settings(mut self, settings: ChipSettings) -> Self {
        self.chip_settings = settings;
        self
    }

    /// Set the transfer settings written at power-up
    pub fn with_transfer_settings(mut self, settings: TransferSettings) -> Self {
        self.transfer_settings = settings;
        self
    }
}
