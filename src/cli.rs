//! CLI argument parsing

use crate::devices;
use clap::{Parser, Subcommand};
use mica_gpio_core::State;

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!("Device to use [available: {}]", devices::device_names_short())
}

#[derive(Parser)]
#[command(name = "mica-gpio")]
#[command(
    author,
    version,
    about = "Load-switch GPIO over a USB-to-SPI bridge",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pause between two polling iterations in milliseconds
    #[arg(long, global = true, default_value_t = 5)]
    pub poll_ms: u64,

    /// Do not write the power-up settings to the bridge NVRAM on open
    #[arg(long, global = true)]
    pub no_power_up: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read input channels through a fresh diagnosis measurement
    Get {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Channels to read (1-8)
        #[arg(required = true, value_parser = clap::value_parser!(u8).range(1..=8))]
        channels: Vec<u8>,
    },

    /// Drive an output channel
    Set {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Channel to drive (1-8)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=8))]
        channel: u8,

        /// New state (LOW or HIGH)
        state: State,
    },

    /// Report edges on continuously sensed input channels
    Watch {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Channels to watch (1-8)
        #[arg(required = true, value_parser = clap::value_parser!(u8).range(1..=8))]
        channels: Vec<u8>,

        /// Stop after this many seconds (default: until Enter is pressed)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Show the bridge's NVRAM power-up settings
    Settings {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Write the power-up defaults before showing them
        #[arg(long)]
        write_defaults: bool,
    },

    /// Dump the load-switch control register and the engine's mirrors
    Registers {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,
    },

    /// Exercise one input and one output end to end
    Demo {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Input channel to sense
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=8))]
        input: u8,

        /// Output channel to drive
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=8))]
        output: u8,
    },

    /// List attached bridge devices
    ListDevices,

    /// List supported device backends
    ListBackends,
}
