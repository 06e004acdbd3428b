//! List commands implementation

use std::error::Error;

use crate::devices;

/// List attached bridge devices
pub fn list_devices() -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "mcp2210")]
    {
        let bridges = mica_gpio_mcp2210::Mcp2210::list_devices()?;
        if bridges.is_empty() {
            println!("No bridge devices found");
        }
        for (index, info) in bridges.iter().enumerate() {
            println!("  {}: {}", index, info);
        }
    }

    #[cfg(not(feature = "mcp2210"))]
    println!("USB support not compiled in (enable the mcp2210 feature)");

    Ok(())
}

/// List all supported device backends
pub fn list_backends() {
    print!("{}", devices::backend_help());
    println!();
    println!("Options are given as name:key=value,key=value");
}
