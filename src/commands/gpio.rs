//! Single-shot channel access

use std::error::Error;

use mica_gpio_core::{Direction, Event, MicaGpio, State};

/// Read `channels` as inputs
///
/// A synchronous input read needs the polling engine, so a silent observer
/// is registered for the duration of the command.
pub fn run_get(gpio: &MicaGpio, channels: &[u8]) -> Result<(), Box<dyn Error>> {
    for &id in channels {
        gpio.set_direction(id, Direction::Input);
    }
    gpio.set_observer(Some(Box::new(|_event: Event| {})));

    for &id in channels {
        let state = gpio.get_state(id)?;
        println!("Channel {}: {}", id, state);
    }

    gpio.set_observer(None);
    Ok(())
}

/// Configure `channel` as output and drive it
pub fn run_set(gpio: &MicaGpio, channel: u8, state: State) -> Result<(), Box<dyn Error>> {
    gpio.set_direction(channel, Direction::Output);
    gpio.set_state(channel, state)?;
    println!("Channel {} set to {}", channel, gpio.get_state(channel)?);
    Ok(())
}
