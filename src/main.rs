//! mica-gpio - Load-switch GPIO over a USB-to-SPI bridge
//!
//! Drives and senses the eight channels of a load-switch chip that sits
//! behind an MCP2210-style USB HID bridge.
//!
//! # Architecture
//!
//! All commands go through a `MicaGpio` context, which works with any
//! bridge backend:
//! - **mcp2210** - the real bridge over USB interrupt endpoints
//! - **dummy** - an in-memory emulator of bridge and load switch
//!
//! Outputs are written to the control register directly. Inputs are sensed
//! through open-load diagnosis, which needs the background polling engine
//! that runs while an observer is registered.

mod cli;
mod commands;
mod devices;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use mica_gpio_core::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = Config::new()
        .with_poll_interval(Duration::from_millis(cli.poll_ms))
        .with_power_up_settings(!cli.no_power_up);

    match cli.command {
        Commands::Get { device, channels } => {
            let gpio = devices::open_gpio(&device, config)?;
            commands::run_get(&gpio, &channels)
        }
        Commands::Set {
            device,
            channel,
            state,
        } => {
            let gpio = devices::open_gpio(&device, config)?;
            commands::run_set(&gpio, channel, state)
        }
        Commands::Watch {
            device,
            channels,
            seconds,
        } => {
            let gpio = devices::open_gpio(&device, config)?;
            commands::run_watch(&gpio, &channels, seconds)
        }
        Commands::Settings {
            device,
            write_defaults,
        } => {
            let gpio = devices::open_gpio(&device, config)?;
            commands::run_settings(&gpio, write_defaults)
        }
        Commands::Registers { device } => {
            let gpio = devices::open_gpio(&device, config)?;
            commands::run_registers(&gpio)
        }
        Commands::Demo {
            device,
            input,
            output,
        } => {
            let gpio = devices::open_gpio(&device, config)?;
            commands::run_demo(&gpio, input, output)
        }
        Commands::ListDevices => commands::list_devices(),
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
    }
}
