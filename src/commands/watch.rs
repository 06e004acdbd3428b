//! Edge monitoring

use std::error::Error;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use mica_gpio_core::{Direction, Event, MicaGpio};

/// Print every edge of `channels` until `seconds` elapsed or Enter is pressed
pub fn run_watch(
    gpio: &MicaGpio,
    channels: &[u8],
    seconds: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    for &id in channels {
        gpio.set_direction(id, Direction::Input);
        gpio.set_enable(id, true);
    }

    let start = Instant::now();
    gpio.set_observer(Some(Box::new(move |event: Event| match event {
        Event::Attached => println!("Watching for edges..."),
        Event::Changed { channel, state } => println!(
            "[{:>9.3}s] Channel {}: {}",
            start.elapsed().as_secs_f64(),
            channel,
            state
        ),
        Event::Detached => println!("Stopped watching"),
    })));

    match seconds {
        Some(seconds) => thread::sleep(Duration::from_secs(seconds)),
        None => {
            println!("Press Enter to stop");
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
        }
    }

    gpio.set_observer(None);
    Ok(())
}
