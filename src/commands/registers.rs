//! Register dump

use std::error::Error;

use mica_gpio_core::{Channel, MicaGpio};

/// Read back the control register and show it next to the mirrors
pub fn run_registers(gpio: &MicaGpio) -> Result<(), Box<dyn Error>> {
    let control = gpio.read_control_register()?;

    println!("Control register: 0x{:04X}", control.bits());
    println!("Control mirror:   0x{:04X}", gpio.control_mirror().bits());
    println!("Diagnosis enable: 0x{:02X}", gpio.diagnosis_enable().bits());
    println!();
    println!("{:<8} {:<6}", "Channel", "Output");
    println!("{}", "-".repeat(15));
    for channel in Channel::all() {
        println!("{:<8} {:<6}", channel.id(), control.state(channel.index()));
    }
    Ok(())
}
