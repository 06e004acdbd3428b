//! End-to-end demonstration

use std::error::Error;
use std::thread;
use std::time::Duration;

use mica_gpio_core::{Direction, Event, MicaGpio, State};

/// Sense `input` continuously for a second, read it once synchronously,
/// then pulse `output` high for a second
pub fn run_demo(gpio: &MicaGpio, input: u8, output: u8) -> Result<(), Box<dyn Error>> {
    gpio.set_observer(Some(Box::new(|event: Event| match event {
        Event::Changed { channel, state } => {
            println!("Input {} changed to {}", channel, state)
        }
        other => log::info!("Observer {:?}", other),
    })));

    let direction = gpio.get_direction(input)?;
    println!(
        "Direction of {}: {}",
        input,
        direction.map_or("undefined", |d| d.name())
    );

    gpio.set_direction(input, Direction::Input);
    gpio.set_enable(input, true);
    thread::sleep(Duration::from_secs(1));
    gpio.set_enable(input, false);
    println!("State of {}: {}", input, gpio.get_state(input)?);

    gpio.set_direction(output, Direction::Output);
    gpio.set_state(output, State::High)?;
    println!("Output {} is {}", output, gpio.get_state(output)?);
    thread::sleep(Duration::from_secs(1));
    gpio.set_state(output, State::Low)?;
    println!("Output {} is {}", output, gpio.get_state(output)?);

    gpio.set_observer(None);
    Ok(())
}
