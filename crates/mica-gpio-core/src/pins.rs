//! Channel identifiers, logical values and the per-channel state store

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::registers::{ControlRegister, DiagnosisEnable};

/// Number of logical channels
pub const CHANNEL_COUNT: u8 = 8;

/// A validated channel id (1..=8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Validate a 1-based channel id
    pub fn new(id: u8) -> Result<Self> {
        if (1..=CHANNEL_COUNT).contains(&id) {
            Ok(Self(id))
        } else {
            Err(Error::InvalidChannel(id))
        }
    }

    /// The 1-based channel id
    pub fn id(self) -> u8 {
        self.0
    }

    /// 0-based bit index into the register mirrors
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Channel owning 0-based bit `index`
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().and_then(|id| Self::new(id).ok())
    }

    /// Iterate over all channels
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=CHANNEL_COUNT).map(Channel)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sensed through open-load diagnosis
    Input = 0,
    /// Driven through the control register
    Output = 1,
}

impl Direction {
    /// Name used across language boundaries
    pub fn name(self) -> &'static str {
        match self {
            Direction::Input => "INPUT",
            Direction::Output => "OUTPUT",
        }
    }
}

impl TryFrom<i32> for Direction {
    type Error = i32;

    fn try_from(raw: i32) -> std::result::Result<Self, i32> {
        match raw {
            0 => Ok(Direction::Input),
            1 => Ok(Direction::Output),
            other => Err(other),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_uppercase().as_str() {
            "INPUT" | "IN" => Ok(Direction::Input),
            "OUTPUT" | "OUT" => Ok(Direction::Output),
            _ => Err(format!("Invalid direction: {} (expected INPUT or OUTPUT)", s)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical channel value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Logical low
    #[default]
    Low = 0,
    /// Logical high
    High = 1,
}

impl State {
    /// Name used across language boundaries
    pub fn name(self) -> &'static str {
        match self {
            State::Low => "LOW",
            State::High => "HIGH",
        }
    }
}

impl From<bool> for State {
    fn from(high: bool) -> Self {
        if high {
            State::High
        } else {
            State::Low
        }
    }
}

impl TryFrom<i32> for State {
    type Error = i32;

    fn try_from(raw: i32) -> std::result::Result<Self, i32> {
        match raw {
            0 => Ok(State::Low),
            1 => Ok(State::High),
            other => Err(other),
        }
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" | "0" => Ok(State::Low),
            "HIGH" | "1" => Ok(State::High),
            _ => Err(format!("Invalid state: {} (expected LOW or HIGH)", s)),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Pin {
    direction: Option<Direction>,
    continuous: bool,
}

/// Per-channel configuration plus the register mirrors
///
/// The diagnosis enable mask normally equals the set of continuously enabled
/// inputs; a synchronous input read may force one extra channel on for the
/// duration of its rendezvous.
#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pins: [Pin; CHANNEL_COUNT as usize],
    control: ControlRegister,
    enable: DiagnosisEnable,
}

impl PinTable {
    /// Create a table with every direction undefined
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored direction, `None` until first configured
    pub fn direction(&self, channel: Channel) -> Option<Direction> {
        self.pins[channel.index()].direction
    }

    /// Store a direction
    ///
    /// Switching a channel to OUTPUT drops its continuous enable and its
    /// diagnosis arming.
    pub fn set_direction(&mut self, channel: Channel, direction: Direction) {
        let pin = &mut self.pins[channel.index()];
        pin.direction = Some(direction);
        if direction == Direction::Output {
            pin.continuous = false;
            self.enable.set(channel.index(), false);
        }
    }

    /// Live diagnosis arming of an input; false for outputs
    pub fn enable(&self, channel: Channel) -> bool {
        self.direction(channel) == Some(Direction::Input) && self.enable.is_armed(channel.index())
    }

    /// Set the continuous enable of an input; ignored for other channels
    pub fn set_enable(&mut self, channel: Channel, enable: bool) {
        if self.direction(channel) != Some(Direction::Input) {
            return;
        }
        self.pins[channel.index()].continuous = enable;
        self.enable.set(channel.index(), enable);
    }

    /// Whether the channel reports unsolicited edges
    pub fn is_continuous(&self, channel: Channel) -> bool {
        self.pins[channel.index()].continuous
    }

    /// Mask of continuously enabled channels, bit n = channel n + 1
    pub fn continuous_mask(&self) -> u8 {
        Channel::all()
            .filter(|&channel| self.is_continuous(channel))
            .fold(0, |mask, channel| mask | (1 << channel.index()))
    }

    /// Force diagnosis on for a pending synchronous read
    pub fn arm(&mut self, channel: Channel) {
        self.enable.set(channel.index(), true);
    }

    /// Put the arming back to the continuous enable
    pub fn restore(&mut self, channel: Channel) {
        let continuous = self.is_continuous(channel);
        self.enable.set(channel.index(), continuous);
    }

    /// Last confirmed output state
    pub fn output_state(&self, channel: Channel) -> State {
        self.control.state(channel.index())
    }

    /// Control register mirror
    pub fn control(&self) -> ControlRegister {
        self.control
    }

    /// Replace the control register mirror after a confirmed write
    pub fn set_control(&mut self, control: ControlRegister) {
        self.control = control;
    }

    /// Live diagnosis enable mask
    pub fn diagnosis_enable(&self) -> DiagnosisEnable {
        self.enable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: u8) -> Channel {
        Channel::new(id).unwrap()
    }

    #[test]
    fn test_channel_range() {
        assert_eq!(Channel::new(0), Err(Error::InvalidChannel(0)));
        assert_eq!(Channel::new(9), Err(Error::InvalidChannel(9)));
        assert_eq!(ch(1).index(), 0);
        assert_eq!(ch(8).index(), 7);
        assert_eq!(Channel::all().count(), 8);
        assert_eq!(Channel::from_index(2), Some(ch(3)));
        assert_eq!(Channel::from_index(8), None);
    }

    #[test]
    fn test_marshalling() {
        assert_eq!(Direction::try_from(0), Ok(Direction::Input));
        assert_eq!(Direction::try_from(2), Err(2));
        assert_eq!("output".parse::<Direction>(), Ok(Direction::Output));
        assert_eq!(State::try_from(1), Ok(State::High));
        assert_eq!("LOW".parse::<State>(), Ok(State::Low));
        assert!("maybe".parse::<State>().is_err());
        assert_eq!(State::High.name(), "HIGH");
    }

    #[test]
    fn test_direction_starts_undefined() {
        let table = PinTable::new();
        assert!(Channel::all().all(|channel| table.direction(channel).is_none()));
    }

    #[test]
    fn test_enable_requires_input() {
        let mut table = PinTable::new();
        table.set_direction(ch(2), Direction::Output);
        table.set_enable(ch(2), true);
        assert!(!table.enable(ch(2)));
        assert_eq!(table.diagnosis_enable().bits(), 0);

        table.set_direction(ch(3), Direction::Input);
        table.set_enable(ch(3), true);
        assert!(table.enable(ch(3)));
        assert_eq!(table.continuous_mask(), 0b100);
    }

    #[test]
    fn test_switch_to_output_clears_arming() {
        let mut table = PinTable::new();
        table.set_direction(ch(4), Direction::Input);
        table.set_enable(ch(4), true);
        table.set_direction(ch(4), Direction::Output);

        assert!(!table.is_continuous(ch(4)));
        assert_eq!(table.diagnosis_enable().bits(), 0);
    }

    #[test]
    fn test_arm_and_restore() {
        let mut table = PinTable::new();
        table.set_direction(ch(1), Direction::Input);
        table.set_direction(ch(2), Direction::Input);
        table.set_enable(ch(2), true);

        table.arm(ch(1));
        table.arm(ch(2));
        assert_eq!(table.diagnosis_enable().bits(), 0b11);

        table.restore(ch(1));
        table.restore(ch(2));
        assert_eq!(table.diagnosis_enable().bits(), 0b10);
    }
}
