//! NVRAM settings display

use std::error::Error;

use mica_gpio_core::MicaGpio;

/// Show the chip and transfer power-up settings
pub fn run_settings(gpio: &MicaGpio, write_defaults: bool) -> Result<(), Box<dyn Error>> {
    if write_defaults {
        let config = gpio.config();
        gpio.set_chip_settings(&config.chip_settings)?;
        gpio.set_transfer_settings(&config.transfer_settings)?;
        println!("Power-up defaults written");
        println!();
    }

    println!("{}", gpio.chip_settings()?);
    println!();
    println!("{}", gpio.transfer_settings()?);
    Ok(())
}
