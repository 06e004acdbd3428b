//! Device backend registration and dispatch
//!
//! This module provides a centralized registry for the bridge backends, with
//! support for feature-gated inclusion and dynamic help text generation.

use std::error::Error;

use mica_gpio_core::{Config, MicaGpio};

/// Information about a device backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "mcp2210")]
    backends.push(BackendInfo {
        name: "mcp2210",
        aliases: &["usb"],
        description: "USB-to-SPI bridge (VID:2b9d PID:8001) (vid=,pid=,index=,timeout=<ms>)",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory bridge and load-switch emulator (inputs=<hex mask>)",
    });

    backends
}

/// Generate help text listing all available backends
pub fn backend_help() -> String {
    let backends = available_backends();

    if backends.is_empty() {
        return "No device backends available (recompile with backend features enabled)"
            .to_string();
    }

    let mut help = String::from("Available devices:\n");
    for backend in &backends {
        help.push_str(&format!("  {:10} - {}\n", backend.name, backend.description));
        if !backend.aliases.is_empty() {
            help.push_str(&format!("  {:10}   aliases: {}\n", "", backend.aliases.join(", ")));
        }
    }
    help
}

/// Generate a short list of backend names for CLI help
pub fn device_names_short() -> String {
    let backends = available_backends();
    let names: Vec<&str> = backends.iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Resolve a backend name or alias to its canonical name
pub fn find_backend(name: &str) -> Option<&'static str> {
    available_backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
        .map(|b| b.name)
}

/// Parse a device string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_device_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Open a GPIO context on the device described by `device`
///
/// Unlike `MicaGpio::open`, a device that cannot be opened right away is an
/// error here: a command line run has nothing to wait for.
#[allow(unused_variables)]
pub fn open_gpio(device: &str, config: Config) -> Result<MicaGpio, Box<dyn Error>> {
    let (name, options) = parse_device_string(device);

    let canonical_name = match find_backend(name) {
        Some(n) => n,
        None => return Err(unknown_device_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "mcp2210")]
        "mcp2210" => {
            use mica_gpio_core::Transport;
            use mica_gpio_mcp2210::{parse_options, Mcp2210};

            let device_config = parse_options(&options)
                .map_err(|e| format!("Invalid mcp2210 parameters: {}", e))?;

            log::info!("Opening USB-to-SPI bridge...");
            let bridge = Mcp2210::open_with_config(device_config).map_err(|e| {
                format!(
                    "Failed to open bridge: {}\n\
                     Make sure the device is connected and you have permissions.",
                    e
                )
            })?;

            // Hand over the open device first, reopen on later attempts
            let mut opened = Some(bridge);
            let gpio = MicaGpio::open(config, move || {
                let bridge = match opened.take() {
                    Some(bridge) => bridge,
                    None => Mcp2210::open_with_config(device_config)?,
                };
                Ok(Box::new(bridge) as Box<dyn Transport>)
            });
            Ok(gpio)
        }

        #[cfg(feature = "dummy")]
        "dummy" => {
            use mica_gpio_dummy::{DummyBridge, DummyConfig};

            let mut dummy_config = DummyConfig::default();
            for (key, value) in &options {
                match *key {
                    "inputs" => {
                        let digits = value.trim_start_matches("0x");
                        dummy_config.inputs = u8::from_str_radix(digits, 16)
                            .map_err(|_| format!("Invalid dummy inputs value: {}", value))?;
                    }
                    _ => log::warn!("Unknown dummy option: {}={}", key, value),
                }
            }

            log::info!("Opening dummy bridge...");
            Ok(MicaGpio::with_transport(config, DummyBridge::new(dummy_config)))
        }

        _ => Err(unknown_device_error(name)),
    }
}

fn unknown_device_error(name: &str) -> Box<dyn Error> {
    let mut msg = format!("Unknown device: {}\n\n", name);
    msg.push_str(&backend_help());
    msg.push_str("\nUse 'mica-gpio list-backends' for more details");
    msg.into()
}
