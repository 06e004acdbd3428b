//! mica-gpio-core - 8-channel GPIO engine over a USB-to-SPI bridge
//!
//! The bridge (an MCP2210-style HID device) clocks single-byte frames into a
//! load-switch chip. Outputs are driven through the chip's control register.
//! Inputs have no digital path: they are sensed through the chip's open-load
//! diagnosis current, which a background engine re-arms and polls.
//!
//! # Layers
//!
//! - [`transport`]: moves fixed-size reports to and from the bridge
//! - [`codec`]: SPI transfer and NVRAM settings exchanges with status handling
//! - [`registers`]: load-switch frames, register bitfields, diagnosis decode
//! - [`pins`]: channel ids, directions, states and the pin table
//! - [`MicaGpio`]: the owning context with the polling engine, the
//!   synchronous-read rendezvous and the observer lifecycle
//!
//! # Example
//!
//! ```ignore
//! use mica_gpio_core::{Config, Direction, Event, MicaGpio, State};
//!
//! let gpio = MicaGpio::open(Config::default(), open_bridge);
//! gpio.set_direction(1, Direction::Output);
//! gpio.set_state(1, State::High)?;
//!
//! gpio.set_direction(3, Direction::Input);
//! gpio.set_enable(3, true);
//! gpio.set_observer(Some(Box::new(|event: Event| println!("{:?}", event))));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod codec;
pub mod config;
pub mod error;
mod gpio;
pub mod observer;
pub mod pins;
mod poller;
pub mod protocol;
pub mod registers;
mod rendezvous;
pub mod settings;
pub mod transport;

pub use codec::SpiCodec;
pub use config::Config;
pub use error::{Error, Result};
pub use gpio::{Connector, MicaGpio};
pub use observer::{Event, Observer};
pub use pins::{Channel, Direction, State, CHANNEL_COUNT};
pub use protocol::{Report, REPORT_SIZE};
pub use registers::{ControlRegister, DiagnosisEnable, DiagnosisSnapshot};
pub use settings::{ChipSettings, TransferSettings};
pub use transport::Transport;
