//! mica-gpio-mcp2210 - USB transport for MCP2210-compatible bridges
//!
//! The bridge enumerates as a HID device (VID `0x2b9d`, PID `0x8001`) and
//! exchanges 64-byte reports over one interrupt endpoint pair:
//!
//! - Command reports go to interrupt OUT endpoint `0x01`
//! - Response reports arrive on interrupt IN endpoint `0x81`
//!
//! The report contents (SPI transfers, NVRAM settings) are built by
//! `mica-gpio-core`; this crate only moves them.
//!
//! # Example
//!
//! ```no_run
//! use mica_gpio_core::{Config, MicaGpio};
//! use mica_gpio_mcp2210::{DeviceConfig, Mcp2210};
//!
//! for info in Mcp2210::list_devices()? {
//!     println!("{}", info);
//! }
//!
//! let gpio = MicaGpio::open(Config::default(), Mcp2210::connector(DeviceConfig::new()));
//! println!("ready: {}", gpio.is_ready());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod protocol;

pub use device::{parse_options, Mcp2210, Mcp2210DeviceInfo};
pub use error::{Mcp2210Error, Result};
pub use protocol::{
    DeviceConfig, HID_INTERFACE, MCP2210_USB_PRODUCT, MCP2210_USB_VENDOR, READ_EP, WRITE_EP,
};
