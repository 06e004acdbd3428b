//! NVRAM power-up settings of the bridge
//!
//! Both structures are stored packed and little-endian, starting at byte 4
//! of the get/set NVRAM reports.

use std::fmt;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::protocol::{CMD_GET_NVRAM, NVRAM_CHIP_SETTINGS, NVRAM_TRANSFER_SETTINGS};

/// Number of general purpose lines on the bridge (GP0-GP8)
pub const GP_PIN_COUNT: usize = 9;

/// Packed length of [`ChipSettings`] (including the new password)
pub const CHIP_SETTINGS_LEN: usize = 23;
/// Packed length of [`TransferSettings`]
pub const TRANSFER_SETTINGS_LEN: usize = 17;

/// Function assigned to a general purpose line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDesignation {
    /// Plain GPIO
    Gpio = 0x00,
    /// SPI chip select
    ChipSelect = 0x01,
    /// Dedicated function pin
    Dedicated = 0x02,
}

impl PinDesignation {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Gpio),
            0x01 => Some(Self::ChipSelect),
            0x02 => Some(Self::Dedicated),
            _ => None,
        }
    }
}

/// NVRAM chip parameters access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessControl {
    /// Not protected
    #[default]
    NotProtected = 0x00,
    /// Protected by password access
    Password = 0x40,
    /// Permanently locked
    Locked = 0x80,
}

impl AccessControl {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::NotProtected),
            0x40 => Some(Self::Password),
            0x80 => Some(Self::Locked),
            _ => None,
        }
    }
}

bitflags! {
    /// "Other chip settings" byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OtherChipSettings: u8 {
        /// Keep the SPI bus between transfers (clear: bus released)
        const NO_BUS_RELEASE      = 1 << 0;
        /// Interrupt pin counts falling edges
        const COUNT_FALLING_EDGES = 0b001 << 1;
        /// Interrupt pin counts rising edges
        const COUNT_RISING_EDGES  = 0b010 << 1;
        /// Interrupt pin counts low pulses
        const COUNT_LOW_PULSES    = 0b011 << 1;
        /// Interrupt pin counts high pulses
        const COUNT_HIGH_PULSES   = 0b100 << 1;
        /// Remote wake-up enabled
        const REMOTE_WAKE_UP      = 1 << 4;
    }
}

/// Chip settings power-up default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipSettings {
    /// Designation of GP0..GP8
    pub pin_designation: [PinDesignation; GP_PIN_COUNT],
    /// Default GPIO output, bit n = GPn
    pub default_output: u16,
    /// Default GPIO direction, bit n = GPn (1 = input)
    pub default_direction: u16,
    /// Wake-up, interrupt mode and bus release
    pub other: OtherChipSettings,
    /// NVRAM access control
    pub access_control: AccessControl,
    /// New password (only meaningful when writing)
    pub password: [u8; 8],
}

impl ChipSettings {
    /// Defaults written when a session is opened
    ///
    /// All nine lines are handed to the SPI engine as chip selects, outputs
    /// default high, every line defaults to output, remote wake-up enabled,
    /// interrupt pin counting falling edges and the bus released between
    /// transfers.
    pub fn power_up_default() -> Self {
        Self {
            pin_designation: [PinDesignation::ChipSelect; GP_PIN_COUNT],
            default_output: 0x1FF,
            default_direction: 0x000,
            other: OtherChipSettings::REMOTE_WAKE_UP | OtherChipSettings::COUNT_FALLING_EDGES,
            access_control: AccessControl::NotProtected,
            password: [0; 8],
        }
    }

    /// Encode into `payload` (at least [`CHIP_SETTINGS_LEN`] bytes)
    pub fn encode(&self, payload: &mut [u8]) {
        for (dst, pin) in payload[..GP_PIN_COUNT].iter_mut().zip(self.pin_designation) {
            *dst = pin as u8;
        }
        payload[9..11].copy_from_slice(&self.default_output.to_le_bytes());
        payload[11..13].copy_from_slice(&self.default_direction.to_le_bytes());
        payload[13] = self.other.bits();
        payload[14] = self.access_control as u8;
        payload[15..23].copy_from_slice(&self.password);
    }

    /// Decode from a get-chip-settings payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let invalid = |status| Error::UnexpectedResponse {
            command: CMD_GET_NVRAM,
            status,
        };
        if payload.len() < 15 {
            return Err(invalid(NVRAM_CHIP_SETTINGS));
        }

        let mut pin_designation = [PinDesignation::Gpio; GP_PIN_COUNT];
        for (pin, &raw) in pin_designation.iter_mut().zip(&payload[..GP_PIN_COUNT]) {
            *pin = PinDesignation::from_raw(raw).ok_or_else(|| invalid(raw))?;
        }
        let access_control =
            AccessControl::from_raw(payload[14]).ok_or_else(|| invalid(payload[14]))?;

        Ok(Self {
            pin_designation,
            default_output: u16::from_le_bytes([payload[9], payload[10]]),
            default_direction: u16::from_le_bytes([payload[11], payload[12]]),
            other: OtherChipSettings::from_bits_retain(payload[13]),
            access_control,
            // The device never reports the password back
            password: [0; 8],
        })
    }
}

impl fmt::Display for ChipSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chip settings")?;
        write!(f, " GP Pin Designation:")?;
        for pin in &self.pin_designation {
            write!(f, " x{:x}", *pin as u8)?;
        }
        writeln!(f)?;
        writeln!(f, " Default GPIO Output: x{:x}", self.default_output)?;
        writeln!(f, " Default GPIO Direction: x{:x}", self.default_direction)?;
        writeln!(f, " Other Chip Settings: x{:x}", self.other.bits())?;
        write!(
            f,
            " NVRAM Chip Parameters Access Control: x{:x}",
            self.access_control as u8
        )
    }
}

/// SPI power-up transfer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Bit rate in bits per second
    pub bit_rate: u32,
    /// Chip select values while idle, bit n = GPn
    pub idle_chip_select: u16,
    /// Chip select values while a transfer is active, bit n = GPn
    pub active_chip_select: u16,
    /// Chip select to data delay (quanta of 100 µs)
    pub cs_to_data_delay: u16,
    /// Last data byte to chip select de-assert delay (quanta of 100 µs)
    pub data_to_cs_delay: u16,
    /// Delay between subsequent data bytes (quanta of 100 µs)
    pub inter_byte_delay: u16,
    /// Bytes per SPI transaction
    pub bytes_per_transaction: u16,
    /// SPI mode (0-3)
    pub spi_mode: u8,
}

impl TransferSettings {
    /// Defaults written when a session is opened: 5 MHz, all chip selects
    /// idle high, one byte per transaction, SPI mode 1
    pub fn power_up_default() -> Self {
        Self {
            bit_rate: 5_000_000,
            idle_chip_select: 0x1FF,
            active_chip_select: 0x001,
            cs_to_data_delay: 0,
            data_to_cs_delay: 0,
            inter_byte_delay: 0,
            bytes_per_transaction: 1,
            spi_mode: 1,
        }
    }

    /// Encode into `payload` (at least [`TRANSFER_SETTINGS_LEN`] bytes)
    pub fn encode(&self, payload: &mut [u8]) {
        payload[0..4].copy_from_slice(&self.bit_rate.to_le_bytes());
        payload[4..6].copy_from_slice(&self.idle_chip_select.to_le_bytes());
        payload[6..8].copy_from_slice(&self.active_chip_select.to_le_bytes());
        payload[8..10].copy_from_slice(&self.cs_to_data_delay.to_le_bytes());
        payload[10..12].copy_from_slice(&self.data_to_cs_delay.to_le_bytes());
        payload[12..14].copy_from_slice(&self.inter_byte_delay.to_le_bytes());
        payload[14..16].copy_from_slice(&self.bytes_per_transaction.to_le_bytes());
        payload[16] = self.spi_mode;
    }

    /// Decode from a get-transfer-settings payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < TRANSFER_SETTINGS_LEN {
            return Err(Error::UnexpectedResponse {
                command: CMD_GET_NVRAM,
                status: NVRAM_TRANSFER_SETTINGS,
            });
        }
        let word = |at: usize| u16::from_le_bytes([payload[at], payload[at + 1]]);

        Ok(Self {
            bit_rate: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            idle_chip_select: word(4),
            active_chip_select: word(6),
            cs_to_data_delay: word(8),
            data_to_cs_delay: word(10),
            inter_byte_delay: word(12),
            bytes_per_transaction: word(14),
            spi_mode: payload[16],
        })
    }
}

impl fmt::Display for TransferSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transfer settings")?;
        writeln!(f, " Bit rate: {}", self.bit_rate)?;
        writeln!(f, " Idle Chip Select Value: x{:x}", self.idle_chip_select)?;
        writeln!(f, " Active Chip Select Value: x{:x}", self.active_chip_select)?;
        writeln!(
            f,
            " Chip Select to Data Delay (quanta of 100 µs): {}",
            self.cs_to_data_delay
        )?;
        writeln!(
            f,
            " Last Data Byte to CS (De-asserted) delay (quanta of 100 µs): {}",
            self.data_to_cs_delay
        )?;
        writeln!(
            f,
            " Delay Between Subsequent Data Bytes (quanta of 100 µs): {}",
            self.inter_byte_delay
        )?;
        writeln!(
            f,
            " Bytes to Transfer per SPI Transaction: {}",
            self.bytes_per_transaction
        )?;
        write!(f, " SPI Mode: {}", self.spi_mode)
    }
}
