//! Wire constants for the USB-to-SPI bridge and the load-switch chip
//!
//! The bridge speaks the MCP2210 HID command set: every command is a
//! 64-byte report, answered by exactly one 64-byte response report whose
//! first byte echoes the command code and whose second byte is a status.
//!
//! The load-switch chip behind the bridge takes single-byte SPI frames:
//!
//! ```text
//! write:  1 A A A D D D D     A = register address, D = data nibble
//! read:   0 A A A x x 0 B     B = register bank (0 = control, 1 = diagnosis)
//! ```
//!
//! A read is answered on MISO during the *following* frame, which is why
//! register reads are always followed by a null frame.

/// Size of one command or response report
pub const REPORT_SIZE: usize = 64;

/// One fixed-size command or response report
pub type Report = [u8; REPORT_SIZE];

// Bridge command codes
/// Transfer SPI data
pub const CMD_TRANSFER_SPI: u8 = 0x42;
/// Set chip NVRAM parameters
pub const CMD_SET_NVRAM: u8 = 0x60;
/// Get chip NVRAM parameters
pub const CMD_GET_NVRAM: u8 = 0x61;

// NVRAM sub-command codes
/// SPI power-up transfer settings
pub const NVRAM_TRANSFER_SETTINGS: u8 = 0x10;
/// Chip settings power-up default
pub const NVRAM_CHIP_SETTINGS: u8 = 0x20;

// Response status codes
/// Command completed successfully
pub const STATUS_OK: u8 = 0x00;
/// SPI bus not available, an external owner has control over it
pub const STATUS_BUS_UNAVAILABLE: u8 = 0xF7;
/// SPI transfer in progress, data or settings not accepted
pub const STATUS_TRANSFER_IN_PROGRESS: u8 = 0xF8;
/// Blocked access: wrong password or permanently locked settings
pub const STATUS_BLOCKED: u8 = 0xFB;

// SPI engine status (byte 3 of a transfer response)
/// SPI transfer finished, no more data to send
pub const ENGINE_FINISHED: u8 = 0x10;
/// SPI transfer started, no data to receive yet
pub const ENGINE_STARTED: u8 = 0x20;
/// SPI transfer not finished, receive data available
pub const ENGINE_MORE_DATA: u8 = 0x30;

/// Offset of the payload in NVRAM settings reports
pub const NVRAM_PAYLOAD_OFFSET: usize = 4;
/// Offset of the SPI data in transfer reports
pub const SPI_DATA_OFFSET: usize = 4;

// Load-switch frame layout
/// Bit 7 of a frame selects a register write
pub const FRAME_WRITE: u8 = 0x80;
/// Control register bank (read frames, bit 0)
pub const BANK_CONTROL: u8 = 0;
/// Diagnosis register bank (read frames, bit 0)
pub const BANK_DIAGNOSIS: u8 = 1;
/// Null frame used to clock out the answer to the previous frame
pub const FRAME_NULL: u8 = 0x00;

/// First diagnosis current enable register (DCCR0, channels 1-4)
///
/// DCCR1 (channels 5-8) follows at the next address.
pub const ADDR_DCCR: u8 = 4;
/// Command register address
pub const ADDR_COMMAND: u8 = 6;
/// Command register: wake-up
pub const COMMAND_WAKE: u8 = 0x8;

/// Open-load bits of a diagnosis nibble (`0b1010`)
pub const OPEN_LOAD_MASK: u8 = 0b1010;
