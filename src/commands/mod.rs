//! CLI command implementations
//!
//! Every command works on an opened `MicaGpio` context, whatever backend
//! sits behind it.

mod demo;
mod gpio;
mod list;
mod registers;
mod settings;
mod watch;

pub use demo::run_demo;
pub use gpio::{run_get, run_set};
pub use list::{list_backends, list_devices};
pub use registers::run_registers;
pub use settings::run_settings;
pub use watch::run_watch;
