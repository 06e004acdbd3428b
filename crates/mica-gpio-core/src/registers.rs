//! Load-switch register protocol
//!
//! Register mirrors are kept as small bitfield types whose raw values are
//! exactly the bits shifted over the wire:
//!
//! - [`ControlRegister`]: 16 bits, 2 per channel, four 2-channel banks
//! - [`DiagnosisEnable`]: 8 bits, 1 per channel, written as two nibbles
//!   (DCCR0 = channels 1-4, DCCR1 = channels 5-8)
//! - [`DiagnosisSnapshot`]: 8 bits, 1 logical bit per channel, assembled
//!   from four 2-channel diagnosis groups

use crate::codec::SpiCodec;
use crate::error::Result;
use crate::pins::{State, CHANNEL_COUNT};
use crate::protocol::*;

/// Number of 2-channel diagnosis groups (and control banks)
pub const GROUP_COUNT: usize = 4;

/// Single-byte SPI frames understood by the load-switch chip
pub struct Frame;

impl Frame {
    /// Register write frame: `1 AAA DDDD`
    pub const fn write(address: u8, nibble: u8) -> u8 {
        FRAME_WRITE | ((address & 0x7) << 4) | (nibble & 0xF)
    }

    /// Register read frame: `0 AAA 00 0 B`
    pub const fn read(address: u8, bank: u8) -> u8 {
        ((address & 0x7) << 4) | (bank & 0x1)
    }

    /// Command register write (wake-up, stand-by, reset)
    pub const fn command(command: u8) -> u8 {
        Self::write(ADDR_COMMAND, command)
    }
}

/// Mirror of the control register (2 bits per channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlRegister(u16);

impl ControlRegister {
    /// Wrap a raw register value
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Output state of the channel at `index` (0-based)
    ///
    /// A channel is HIGH only if both of its bits are set.
    pub fn state(self, index: usize) -> State {
        let mask = 0b11 << (index * 2);
        if self.0 & mask == mask {
            State::High
        } else {
            State::Low
        }
    }

    /// Copy with the two bits of channel `index` replaced
    pub fn with_state(self, index: usize, state: State) -> Self {
        let shift = index * 2;
        let bits = match state {
            State::High => 0b11,
            State::Low => 0b00,
        };
        Self((self.0 & !(0b11 << shift)) | (bits << shift))
    }

    /// Data nibble of a 2-channel bank
    pub fn bank_nibble(self, bank: usize) -> u8 {
        ((self.0 >> (bank * 4)) & 0xF) as u8
    }
}

/// Mask of channels whose diagnosis current is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosisEnable(u8);

impl DiagnosisEnable {
    /// Wrap a raw mask
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw mask
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether channel `index` is armed
    pub fn is_armed(self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    /// Arm or disarm channel `index`
    pub fn set(&mut self, index: usize, armed: bool) {
        if armed {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    /// Whether any channel of 2-channel group `group` is armed
    pub fn group_armed(self, group: usize) -> bool {
        (self.0 >> (group * 2)) & 0b11 != 0
    }

    /// Nibble written to DCCR0 (`register` 0) or DCCR1 (`register` 1)
    pub fn register_nibble(self, register: usize) -> u8 {
        (self.0 >> (register * 4)) & 0xF
    }
}

/// Decoded diagnosis read, one logical bit per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosisSnapshot(u8);

impl DiagnosisSnapshot {
    /// Wrap a raw snapshot
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw snapshot
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Sensed state of channel `index`
    pub fn state(self, index: usize) -> State {
        State::from(self.0 & (1 << index) != 0)
    }

    /// Merge the 2-bit code of `group` into the snapshot
    pub fn with_group(self, group: usize, code: u8) -> Self {
        let shift = group * 2;
        Self((self.0 & !(0b11 << shift)) | ((code & 0b11) << shift))
    }

    /// 2-bit code of `group`
    pub fn group(self, group: usize) -> u8 {
        (self.0 >> (group * 2)) & 0b11
    }

    /// Indices of channels that differ from `previous`
    pub fn changed_since(self, previous: Self) -> impl Iterator<Item = usize> {
        let diff = self.0 ^ previous.0;
        (0..CHANNEL_COUNT as usize).filter(move |index| diff & (1 << index) != 0)
    }
}

/// Decode the open-load bits of a raw diagnosis nibble
///
/// | open-load bits | code |
/// |----------------|------|
/// | `0b0010`       | 1    |
/// | `0b1000`       | 2    |
/// | `0b1010`       | 3    |
/// | otherwise      | 0    |
///
/// Bit 0 of the code belongs to the lower channel of the group, bit 1 to the
/// upper one.
pub fn decode_open_load(raw: u8) -> u8 {
    match raw & OPEN_LOAD_MASK {
        0b0010 => 1,
        0b1000 => 2,
        0b1010 => 3,
        _ => 0,
    }
}

/// Drive channel `index` and return the updated control register
///
/// Only the two bits of the target channel change; the paired channel of the
/// same bank is re-sent unchanged. The caller stores the returned register
/// only on success.
pub fn write_output(
    codec: &mut SpiCodec<'_>,
    control: ControlRegister,
    index: usize,
    state: State,
) -> Result<ControlRegister> {
    let updated = control.with_state(index, state);
    let bank = index / 2;
    let frame = Frame::write(bank as u8, updated.bank_nibble(bank));

    log::debug!(
        "Control bank {} <- 0x{:X} (frame 0x{:02X})",
        bank,
        updated.bank_nibble(bank),
        frame
    );
    codec.transfer(frame)?;
    Ok(updated)
}

/// Read a register; the answer is clocked out by a trailing null frame
pub fn read_register(codec: &mut SpiCodec<'_>, address: u8, bank: u8) -> Result<u8> {
    codec.transfer(Frame::read(address, bank))?;
    Ok(codec.transfer(FRAME_NULL)?.unwrap_or(0))
}

/// Read the raw diagnosis nibble of 2-channel `group`
pub fn read_diagnosis_group(codec: &mut SpiCodec<'_>, group: usize) -> Result<u8> {
    read_register(codec, group as u8, BANK_DIAGNOSIS)
}

/// Read back the data nibble of control bank `bank`
pub fn read_control_bank(codec: &mut SpiCodec<'_>, bank: usize) -> Result<u8> {
    Ok(read_register(codec, bank as u8, BANK_CONTROL)? & 0xF)
}

/// Write the enable mask to the diagnosis current enable registers
///
/// A register whose nibble is zero is not written at all; the chip clears
/// diagnosis current on the next SPI frame anyway.
pub fn rearm_diagnosis(codec: &mut SpiCodec<'_>, enable: DiagnosisEnable) -> Result<()> {
    for register in 0..2 {
        let nibble = enable.register_nibble(register);
        if nibble != 0 {
            codec.transfer(Frame::write(ADDR_DCCR + register as u8, nibble))?;
        }
    }
    Ok(())
}

/// Take a full diagnosis snapshot, skipping groups with nothing armed
///
/// A group whose read fails keeps its bits from `previous`, so a transient
/// bus error never shows up as an edge. The failure is logged and the
/// remaining groups are still read.
pub fn poll_diagnosis(
    codec: &mut SpiCodec<'_>,
    enable: DiagnosisEnable,
    previous: DiagnosisSnapshot,
) -> DiagnosisSnapshot {
    let mut snapshot = DiagnosisSnapshot::default();
    for group in 0..GROUP_COUNT {
        if !enable.group_armed(group) {
            continue;
        }
        match read_diagnosis_group(codec, group) {
            Ok(raw) => snapshot = snapshot.with_group(group, decode_open_load(raw)),
            Err(e) => {
                log::warn!("Diagnosis read of group {} failed: {}", group, e);
                snapshot = snapshot.with_group(group, previous.group(group));
            }
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::ScriptedTransport;
    use std::time::Duration;

    fn spi_frames(transport: &ScriptedTransport) -> Vec<u8> {
        transport
            .written
            .iter()
            .filter(|report| report[0] == CMD_TRANSFER_SPI && report[1] == 1)
            .map(|report| report[SPI_DATA_OFFSET])
            .collect()
    }

    #[test]
    fn test_frame_layout() {
        assert_eq!(Frame::write(1, 0xC), 0x9C);
        assert_eq!(Frame::write(ADDR_DCCR + 1, 0x3), 0xD3);
        assert_eq!(Frame::read(2, BANK_DIAGNOSIS), 0x21);
        assert_eq!(Frame::read(3, BANK_CONTROL), 0x30);
        assert_eq!(Frame::command(COMMAND_WAKE), 0xE8);
    }

    #[test]
    fn test_decode_table() {
        assert_eq!(decode_open_load(0b0010), 1);
        assert_eq!(decode_open_load(0b1000), 2);
        assert_eq!(decode_open_load(0b1010), 3);
        assert_eq!(decode_open_load(0b0000), 0);
        // Non open-load bits are ignored
        assert_eq!(decode_open_load(0b0111), 1);
        assert_eq!(decode_open_load(0b0101), 0);
    }

    #[test]
    fn test_control_register_pairs() {
        let control = ControlRegister::default()
            .with_state(2, State::High)
            .with_state(3, State::High)
            .with_state(2, State::Low);

        assert_eq!(control.bits(), 0b1100_0000);
        assert_eq!(control.state(2), State::Low);
        assert_eq!(control.state(3), State::High);
        assert_eq!(control.bank_nibble(1), 0b1100);
        // A single bit does not make a channel HIGH
        assert_eq!(ControlRegister::from_bits(0b01).state(0), State::Low);
    }

    #[test]
    fn test_diagnosis_enable_groups() {
        let mut enable = DiagnosisEnable::default();
        enable.set(5, true);
        assert!(enable.group_armed(2));
        assert!(!enable.group_armed(1));
        assert_eq!(enable.register_nibble(0), 0);
        assert_eq!(enable.register_nibble(1), 0b0010);
        enable.set(5, false);
        assert_eq!(enable.bits(), 0);
    }

    #[test]
    fn test_snapshot_changes() {
        let previous = DiagnosisSnapshot::from_bits(0b0000_0101);
        let current = DiagnosisSnapshot::from_bits(0b0000_0110);
        let changed: Vec<_> = current.changed_since(previous).collect();
        assert_eq!(changed, vec![0, 1]);
        assert_eq!(current.state(1), State::High);
        assert_eq!(current.state(0), State::Low);
    }

    #[test]
    fn test_write_output_keeps_paired_channel() {
        let mut transport = ScriptedTransport::default();
        transport.respond_transfer(0);
        let mut codec = SpiCodec::new(&mut transport, Duration::from_millis(1), 1);

        // Channel index 2 is already high, drive index 3 high as well
        let control = ControlRegister::default().with_state(2, State::High);
        let updated = write_output(&mut codec, control, 3, State::High).unwrap();

        assert_eq!(updated.bits(), 0xF0);
        assert_eq!(spi_frames(&transport), vec![Frame::write(1, 0xF)]);
    }

    #[test]
    fn test_write_output_failure_keeps_mirror() {
        let mut transport = ScriptedTransport::default();
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_BUS_UNAVAILABLE]);
        let mut codec = SpiCodec::new(&mut transport, Duration::from_millis(1), 1);

        let control = ControlRegister::default();
        assert!(write_output(&mut codec, control, 0, State::High).is_err());
    }

    #[test]
    fn test_rearm_skips_empty_registers() {
        let mut transport = ScriptedTransport::default();
        transport.respond_transfer(0);
        let mut codec = SpiCodec::new(&mut transport, Duration::from_millis(1), 1);

        rearm_diagnosis(&mut codec, DiagnosisEnable::from_bits(0b0101_0000)).unwrap();
        assert_eq!(spi_frames(&transport), vec![0xD5]);
    }

    #[test]
    fn test_poll_reads_armed_groups_only() {
        let mut transport = ScriptedTransport::default();
        // Group 1: read frame, then null frame answering open-load on the upper channel
        transport.respond_transfer(0);
        transport.respond_transfer(0b1000);
        let mut codec = SpiCodec::new(&mut transport, Duration::from_millis(1), 1);

        let snapshot = poll_diagnosis(
            &mut codec,
            DiagnosisEnable::from_bits(0b0000_1000),
            DiagnosisSnapshot::default(),
        );
        assert_eq!(snapshot.bits(), 0b0000_1000);
        assert_eq!(spi_frames(&transport), vec![Frame::read(1, BANK_DIAGNOSIS), FRAME_NULL]);
    }

    #[test]
    fn test_failed_group_keeps_previous_bits() {
        let mut transport = ScriptedTransport::default();
        // Group 0 is busy, group 1 answers with both channels open
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_BUS_UNAVAILABLE]);
        transport.respond_transfer(0);
        transport.respond_transfer(0b1010);
        let mut codec = SpiCodec::new(&mut transport, Duration::from_millis(1), 1);

        let previous = DiagnosisSnapshot::from_bits(0b0000_0110);
        let snapshot = poll_diagnosis(&mut codec, DiagnosisEnable::from_bits(0x0F), previous);

        assert_eq!(snapshot.group(0), 0b10);
        assert_eq!(snapshot.group(1), 0b11);
        assert_eq!(snapshot.bits(), 0b0000_1110);
    }
}
