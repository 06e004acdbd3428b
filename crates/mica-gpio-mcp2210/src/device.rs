//! Bridge device implementation
//!
//! This module provides the `Mcp2210` struct that moves 64-byte HID reports
//! over the bridge's interrupt endpoints and implements the core
//! `Transport` trait.

use std::time::Duration;

use mica_gpio_core::error::Result as CoreResult;
use mica_gpio_core::{Connector, Report, Transport, REPORT_SIZE};
use nusb::transfer::{Buffer, In, Interrupt, Out, TransferError};
use nusb::{DeviceInfo, Endpoint, MaybeFuture};

use crate::error::{Mcp2210Error, Result};
use crate::protocol::*;

/// USB-to-SPI bridge with an MCP2210-compatible command set
///
/// Opening claims the HID interface (detaching the kernel HID driver where
/// one is bound); dropping the value releases it.
pub struct Mcp2210 {
    /// Interrupt OUT endpoint for command reports
    out_ep: Endpoint<Interrupt, Out>,
    /// Interrupt IN endpoint for response reports
    in_ep: Endpoint<Interrupt, In>,
    config: DeviceConfig,
    info: Mcp2210DeviceInfo,
}

fn matching_devices(config: &DeviceConfig) -> Result<Vec<DeviceInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| Mcp2210Error::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == config.vid && d.product_id() == config.pid)
        .collect();
    Ok(devices)
}

impl Mcp2210 {
    /// Open the first bridge with the default VID/PID
    pub fn open() -> Result<Self> {
        Self::open_with_config(DeviceConfig::default())
    }

    /// Open the nth bridge (0-indexed) with the default VID/PID
    pub fn open_nth(index: usize) -> Result<Self> {
        Self::open_with_config(DeviceConfig::default().with_index(index))
    }

    /// Open a bridge as described by `config`
    pub fn open_with_config(config: DeviceConfig) -> Result<Self> {
        let devices = matching_devices(&config)?;
        let device_info = devices
            .get(config.index)
            .ok_or(Mcp2210Error::DeviceNotFound {
                vid: config.vid,
                pid: config.pid,
                index: config.index,
            })?;
        let info = Mcp2210DeviceInfo::from(device_info);

        log::info!("Opening {}", info);

        let device = device_info.open().wait()?;
        let interface = device
            .detach_and_claim_interface(HID_INTERFACE)
            .wait()
            .map_err(|e| Mcp2210Error::ClaimFailed {
                interface: HID_INTERFACE,
                reason: e.to_string(),
            })?;

        let out_ep = interface
            .endpoint::<Interrupt, Out>(WRITE_EP)
            .map_err(|e| Mcp2210Error::ClaimFailed {
                interface: HID_INTERFACE,
                reason: e.to_string(),
            })?;
        let in_ep = interface
            .endpoint::<Interrupt, In>(READ_EP)
            .map_err(|e| Mcp2210Error::ClaimFailed {
                interface: HID_INTERFACE,
                reason: e.to_string(),
            })?;

        log::debug!(
            "Claimed interface {} (OUT 0x{:02X}, IN 0x{:02X})",
            HID_INTERFACE,
            WRITE_EP,
            READ_EP
        );

        Ok(Self {
            out_ep,
            in_ep,
            config,
            info,
        })
    }

    /// List all attached bridges matching the default VID/PID
    pub fn list_devices() -> Result<Vec<Mcp2210DeviceInfo>> {
        Self::list_devices_with_config(&DeviceConfig::default())
    }

    /// List all attached bridges matching the VID/PID of `config`
    pub fn list_devices_with_config(config: &DeviceConfig) -> Result<Vec<Mcp2210DeviceInfo>> {
        Ok(matching_devices(config)?
            .iter()
            .map(Mcp2210DeviceInfo::from)
            .collect())
    }

    /// Connector that (re)opens the bridge described by `config`
    ///
    /// Suitable for `MicaGpio::open`, which calls it again while the device
    /// is missing.
    pub fn connector(config: DeviceConfig) -> Connector {
        Box::new(move || {
            let device = Mcp2210::open_with_config(config)?;
            Ok(Box::new(device) as Box<dyn Transport>)
        })
    }

    /// Configuration the device was opened with
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Identity of the opened device
    pub fn info(&self) -> &Mcp2210DeviceInfo {
        &self.info
    }
}

impl Transport for Mcp2210 {
    fn write_report(&mut self, report: &Report) -> CoreResult<()> {
        let mut buf = Buffer::new(REPORT_SIZE);
        buf.extend_from_slice(report);

        let completion = self.out_ep.transfer_blocking(buf, self.config.write_timeout);
        completion.into_result().map_err(Mcp2210Error::from)?;

        log::trace!("USB write command 0x{:02X}", report[0]);
        Ok(())
    }

    fn read_report(&mut self, report: &mut Report, timeout: Duration) -> CoreResult<bool> {
        let max_packet_size = self.in_ep.max_packet_size();
        // Request length must be multiple of max packet size
        let request_len = REPORT_SIZE.div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = self.in_ep.transfer_blocking(in_buf, timeout);
        let data = match completion.into_result() {
            Ok(data) => data,
            // Timed out transfers are cancelled
            Err(TransferError::Cancelled) => return Ok(false),
            Err(e) => return Err(Mcp2210Error::from(e).into()),
        };
        if data.is_empty() {
            return Ok(false);
        }

        let received = std::cmp::min(data.len(), REPORT_SIZE);
        report.fill(0);
        report[..received].copy_from_slice(&data[..received]);

        log::trace!("USB read {} bytes", received);
        Ok(true)
    }
}

/// Information about an attached bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mcp2210DeviceInfo {
    /// USB bus identifier
    pub bus: String,
    /// USB device address
    pub address: u8,
    /// Vendor id
    pub vid: u16,
    /// Product id
    pub pid: u16,
    /// Product string, if the device reports one
    pub product: Option<String>,
    /// Serial number, if the device reports one
    pub serial: Option<String>,
}

impl From<&DeviceInfo> for Mcp2210DeviceInfo {
    fn from(d: &DeviceInfo) -> Self {
        Self {
            bus: d.bus_id().to_string(),
            address: d.device_address(),
            vid: d.vendor_id(),
            pid: d.product_id(),
            product: d.product_string().map(str::to_string),
            serial: d.serial_number().map(str::to_string),
        }
    }
}

impl std::fmt::Display for Mcp2210DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x}) at bus {} address {}",
            self.product.as_deref().unwrap_or("MCP2210 bridge"),
            self.vid,
            self.pid,
            self.bus,
            self.address
        )?;
        if let Some(serial) = &self.serial {
            write!(f, ", serial {}", serial)?;
        }
        Ok(())
    }
}

/// Parse device options for the bridge
///
/// Supported options:
/// - `vid=<hex>`: USB vendor id (default: 2b9d)
/// - `pid=<hex>`: USB product id (default: 8001)
/// - `index=<n>`: which matching device to open (default: 0)
/// - `timeout=<ms>`: command report write timeout (default: 1000)
///
/// # Example
///
/// ```ignore
/// let options = [("index", "1"), ("timeout", "500")];
/// let config = parse_options(&options)?;
/// ```
pub fn parse_options(options: &[(&str, &str)]) -> Result<DeviceConfig> {
    let mut config = DeviceConfig::default();

    for (key, value) in options {
        match *key {
            "vid" => config.vid = parse_usb_id(key, value)?,
            "pid" => config.pid = parse_usb_id(key, value)?,
            "index" => {
                config.index = value.parse().map_err(|_| {
                    Mcp2210Error::ConfigError(format!("Invalid index value: {}", value))
                })?;
            }
            "timeout" => {
                let ms: u64 = value.parse().map_err(|_| {
                    Mcp2210Error::ConfigError(format!("Invalid timeout value: {}", value))
                })?;
                config.write_timeout = Duration::from_millis(ms);
                log::debug!("Setting write timeout to {}ms", ms);
            }
            _ => {
                log::warn!("Unknown MCP2210 option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}
