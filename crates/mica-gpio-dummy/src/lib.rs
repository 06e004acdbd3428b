//! mica-gpio-dummy - In-memory bridge and load-switch emulator
//!
//! This crate provides a dummy bridge that answers the HID command reports
//! the way the real USB-to-SPI bridge does and emulates the load-switch chip
//! behind it. It's useful for testing and development without real hardware.
//!
//! [`DummyBridge`] is a cheap handle: clones share one emulated device, so a
//! test can hand one clone to `MicaGpio` and keep another to flip inputs and
//! inspect the registers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mica_gpio_core::error::Result;
use mica_gpio_core::protocol::*;
use mica_gpio_core::settings::{
    ChipSettings, OtherChipSettings, PinDesignation, TransferSettings, CHIP_SETTINGS_LEN,
    GP_PIN_COUNT, TRANSFER_SETTINGS_LEN,
};
use mica_gpio_core::{Report, Transport, REPORT_SIZE};

/// Configuration for the dummy bridge
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Chip settings stored in NVRAM at start
    pub chip_settings: ChipSettings,
    /// Transfer settings stored in NVRAM at start
    pub transfer_settings: TransferSettings,
    /// Sensed level of each input, bit n = channel n + 1
    pub inputs: u8,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            chip_settings: ChipSettings {
                pin_designation: [PinDesignation::Gpio; GP_PIN_COUNT],
                default_output: 0,
                default_direction: 0x1FF,
                other: OtherChipSettings::empty(),
                access_control: Default::default(),
                password: [0; 8],
            },
            transfer_settings: TransferSettings {
                bit_rate: 1_000_000,
                idle_chip_select: 0x1FF,
                active_chip_select: 0,
                cs_to_data_delay: 1,
                data_to_cs_delay: 1,
                inter_byte_delay: 1,
                bytes_per_transaction: 4,
                spi_mode: 0,
            },
            inputs: 0,
        }
    }
}

/// Emulated device state
struct Emulator {
    chip_settings: [u8; CHIP_SETTINGS_LEN],
    transfer_settings: [u8; TRANSFER_SETTINGS_LEN],
    responses: VecDeque<Report>,
    /// MISO byte captured by the last accepted frame, sent on the follow-up
    captured: Option<u8>,
    /// Answer to the last read frame, shifted out by the next frame
    shift_out: u8,
    control: u16,
    dccr: u8,
    awake: bool,
    inputs: u8,
    frames: Vec<u8>,
    bus_owned: bool,
    nvram_locked: bool,
    silent: bool,
}

impl Emulator {
    fn new(config: DummyConfig) -> Self {
        let mut chip_settings = [0u8; CHIP_SETTINGS_LEN];
        config.chip_settings.encode(&mut chip_settings);
        let mut transfer_settings = [0u8; TRANSFER_SETTINGS_LEN];
        config.transfer_settings.encode(&mut transfer_settings);

        Self {
            chip_settings,
            transfer_settings,
            responses: VecDeque::new(),
            captured: None,
            shift_out: 0,
            control: 0,
            dccr: 0,
            awake: false,
            inputs: config.inputs,
            frames: Vec::new(),
            bus_owned: false,
            nvram_locked: false,
            silent: false,
        }
    }

    fn respond(&mut self, bytes: &[u8]) {
        let mut report = [0u8; REPORT_SIZE];
        report[..bytes.len()].copy_from_slice(bytes);
        self.responses.push_back(report);
    }

    /// Raw diagnosis nibble of 2-channel `group`
    fn diagnosis(&self, group: usize) -> u8 {
        if !self.awake {
            return 0;
        }
        let sensed = self.inputs & self.dccr;
        let mut raw = 0;
        if sensed & (1 << (group * 2)) != 0 {
            raw |= 0b0010;
        }
        if sensed & (1 << (group * 2 + 1)) != 0 {
            raw |= 0b1000;
        }
        raw
    }

    /// Clock one frame through the load switch and return its MISO byte
    fn clock(&mut self, frame: u8) -> u8 {
        self.frames.push(frame);
        let miso = std::mem::take(&mut self.shift_out);

        let address = (frame >> 4) & 0x7;
        if frame & FRAME_WRITE != 0 {
            let nibble = frame & 0xF;
            match address {
                0..=3 => {
                    let shift = address * 4;
                    self.control = (self.control & !(0xF << shift)) | (u16::from(nibble) << shift);
                }
                4 | 5 => {
                    let shift = (address - ADDR_DCCR) * 4;
                    self.dccr = (self.dccr & !(0xF << shift)) | (nibble << shift);
                }
                ADDR_COMMAND => {
                    if nibble == COMMAND_WAKE {
                        log::debug!("Dummy load switch woken up");
                        self.awake = true;
                    }
                }
                _ => log::debug!("Dummy load switch: write to unused address {}", address),
            }
        } else {
            let bank = frame & 0x1;
            self.shift_out = match (address, bank) {
                (0..=3, BANK_CONTROL) => ((self.control >> (address * 4)) & 0xF) as u8,
                (0..=3, BANK_DIAGNOSIS) => self.diagnosis(address as usize),
                (4 | 5, BANK_CONTROL) => (self.dccr >> ((address - ADDR_DCCR) * 4)) & 0xF,
                _ => 0,
            };
        }

        log::trace!("Dummy frame 0x{:02X} -> 0x{:02X}", frame, miso);
        miso
    }

    fn handle_transfer(&mut self, command: &Report) {
        if self.bus_owned {
            self.respond(&[CMD_TRANSFER_SPI, STATUS_BUS_UNAVAILABLE]);
            return;
        }

        if command[1] > 0 {
            let miso = self.clock(command[SPI_DATA_OFFSET]);
            self.captured = Some(miso);
            self.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, ENGINE_STARTED]);
            return;
        }

        match self.captured.take() {
            Some(miso) => self.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 1, ENGINE_FINISHED, miso]),
            None => self.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, ENGINE_FINISHED]),
        }
    }

    fn handle_get_nvram(&mut self, sub_command: u8) {
        let payload: Vec<u8> = match sub_command {
            NVRAM_CHIP_SETTINGS => self.chip_settings.to_vec(),
            NVRAM_TRANSFER_SETTINGS => self.transfer_settings.to_vec(),
            _ => {
                self.respond(&[CMD_GET_NVRAM, STATUS_BLOCKED, sub_command]);
                return;
            }
        };
        let mut response = vec![CMD_GET_NVRAM, STATUS_OK, sub_command, 0];
        response.extend_from_slice(&payload);
        self.respond(&response);
    }

    fn handle_set_nvram(&mut self, command: &Report) {
        let sub_command = command[1];
        if self.nvram_locked {
            self.respond(&[CMD_SET_NVRAM, STATUS_BLOCKED, sub_command]);
            return;
        }

        let payload = &command[NVRAM_PAYLOAD_OFFSET..];
        match sub_command {
            NVRAM_CHIP_SETTINGS => self
                .chip_settings
                .copy_from_slice(&payload[..CHIP_SETTINGS_LEN]),
            NVRAM_TRANSFER_SETTINGS => self
                .transfer_settings
                .copy_from_slice(&payload[..TRANSFER_SETTINGS_LEN]),
            _ => {
                self.respond(&[CMD_SET_NVRAM, STATUS_BLOCKED, sub_command]);
                return;
            }
        }
        self.respond(&[CMD_SET_NVRAM, STATUS_OK, sub_command]);
    }

    fn handle(&mut self, command: &Report) {
        if self.silent {
            return;
        }
        match command[0] {
            CMD_TRANSFER_SPI => self.handle_transfer(command),
            CMD_GET_NVRAM => self.handle_get_nvram(command[1]),
            CMD_SET_NVRAM => self.handle_set_nvram(command),
            other => {
                log::debug!("Dummy bridge: unsupported command 0x{:02X}", other);
                self.respond(&[other, 0xFF]);
            }
        }
    }
}

/// Dummy bridge with an emulated load switch behind it
///
/// Inputs are sensed when the corresponding diagnosis current is enabled and
/// the chip has been woken up. Enables are latched until the register is
/// written again.
#[derive(Clone)]
pub struct DummyBridge {
    inner: Arc<Mutex<Emulator>>,
}

impl Default for DummyBridge {
    fn default() -> Self {
        Self::new_default()
    }
}

impl DummyBridge {
    /// Create a new dummy bridge with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Emulator::new(config))),
        }
    }

    /// Create a new dummy bridge with factory NVRAM contents
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    fn emulator(&self) -> MutexGuard<'_, Emulator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the level sensed on channel `id` (1-8)
    pub fn set_input(&self, id: u8, high: bool) {
        if !(1..=8).contains(&id) {
            return;
        }
        let mut emulator = self.emulator();
        let bit = 1 << (id - 1);
        if high {
            emulator.inputs |= bit;
        } else {
            emulator.inputs &= !bit;
        }
    }

    /// Levels of all inputs, bit n = channel n + 1
    pub fn inputs(&self) -> u8 {
        self.emulator().inputs
    }

    /// Raw control register
    pub fn control(&self) -> u16 {
        self.emulator().control
    }

    /// Whether output `id` (1-8) is driven, i.e. both of its control bits are set
    pub fn output(&self, id: u8) -> bool {
        if !(1..=8).contains(&id) {
            return false;
        }
        let mask = 0b11 << ((id - 1) * 2);
        self.control() & mask == mask
    }

    /// Latched diagnosis current enables, bit n = channel n + 1
    pub fn dccr(&self) -> u8 {
        self.emulator().dccr
    }

    /// Whether the wake-up command was received
    pub fn is_awake(&self) -> bool {
        self.emulator().awake
    }

    /// Every frame clocked into the load switch so far
    pub fn frames(&self) -> Vec<u8> {
        self.emulator().frames.clone()
    }

    /// Forget the recorded frames
    pub fn clear_frames(&self) {
        self.emulator().frames.clear();
    }

    /// Chip settings currently stored in NVRAM
    pub fn chip_settings(&self) -> Result<ChipSettings> {
        ChipSettings::decode(&self.emulator().chip_settings)
    }

    /// Transfer settings currently stored in NVRAM
    pub fn transfer_settings(&self) -> Result<TransferSettings> {
        TransferSettings::decode(&self.emulator().transfer_settings)
    }

    /// Pretend an external master owns the SPI bus
    pub fn set_bus_owned(&self, owned: bool) {
        self.emulator().bus_owned = owned;
    }

    /// Reject NVRAM writes as if the settings were locked
    pub fn set_nvram_locked(&self, locked: bool) {
        self.emulator().nvram_locked = locked;
    }

    /// Stop answering command reports
    pub fn set_silent(&self, silent: bool) {
        self.emulator().silent = silent;
    }
}

impl Transport for DummyBridge {
    fn write_report(&mut self, report: &Report) -> Result<()> {
        self.emulator().handle(report);
        Ok(())
    }

    fn read_report(&mut self, report: &mut Report, _timeout: Duration) -> Result<bool> {
        match self.emulator().responses.pop_front() {
            Some(response) => {
                *report = response;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_gpio_core::{Channel, Config, Direction, Error, Event, MicaGpio, Observer, State};
    use std::sync::mpsc::{self, Receiver};
    use std::thread;

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(50);

    fn config() -> Config {
        Config::new()
            .with_poll_interval(Duration::from_millis(1))
            .with_ready_backoff(Duration::from_millis(1))
            .with_response_timeout(Duration::from_millis(1))
            .with_response_retries(3)
    }

    fn open(bridge: &DummyBridge) -> MicaGpio {
        MicaGpio::with_transport(config(), bridge.clone())
    }

    fn recorder() -> (Box<dyn Observer>, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let observer = move |event: Event| {
            let _ = tx.send(event);
        };
        (Box::new(observer), rx)
    }

    fn changed(id: u8, state: State) -> Event {
        Event::Changed {
            channel: Channel::new(id).unwrap(),
            state,
        }
    }

    #[test]
    fn test_power_up_sequence() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);

        assert!(gpio.is_ready());
        assert!(bridge.is_awake());
        assert_eq!(bridge.frames(), vec![0xE8]);
        assert_eq!(bridge.chip_settings().unwrap(), ChipSettings::power_up_default());
        assert_eq!(
            bridge.transfer_settings().unwrap(),
            TransferSettings::power_up_default()
        );
    }

    #[test]
    fn test_power_up_with_locked_nvram() {
        let bridge = DummyBridge::new_default();
        bridge.set_nvram_locked(true);
        let gpio = open(&bridge);

        // Still usable, the failed writes are only logged
        assert!(gpio.is_ready());
        assert!(bridge.is_awake());
        assert_eq!(
            bridge.chip_settings().unwrap(),
            DummyConfig::default().chip_settings
        );
        assert_eq!(
            gpio.set_transfer_settings(&TransferSettings::power_up_default()),
            Err(Error::SettingsBlocked)
        );
    }

    #[test]
    fn test_power_up_settings_disabled() {
        let bridge = DummyBridge::new_default();
        let config = config().with_power_up_settings(false);
        let gpio = MicaGpio::with_transport(config, bridge.clone());

        assert!(gpio.is_ready());
        assert!(bridge.is_awake());
        assert_eq!(
            gpio.transfer_settings().unwrap(),
            DummyConfig::default().transfer_settings
        );
    }

    #[test]
    fn test_settings_access() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);

        let mut settings = gpio.chip_settings().unwrap();
        assert_eq!(settings, ChipSettings::power_up_default());

        settings.default_output = 0x00F;
        gpio.set_chip_settings(&settings).unwrap();
        assert_eq!(bridge.chip_settings().unwrap().default_output, 0x00F);
    }

    #[test]
    fn test_late_device() {
        let bridge = DummyBridge::new_default();
        let mut device = Some(bridge.clone());
        let mut attempts = 0;
        let gpio = MicaGpio::open(config(), move || {
            attempts += 1;
            if attempts == 1 {
                return Err(Error::DeviceNotReady);
            }
            device
                .take()
                .map(|bridge| Box::new(bridge) as Box<dyn Transport>)
                .ok_or(Error::DeviceNotReady)
        });
        assert!(!gpio.is_ready());

        gpio.set_direction(1, Direction::Output);
        gpio.set_state(1, State::High).unwrap();
        assert!(gpio.is_ready());
        assert!(bridge.output(1));
    }

    #[test]
    fn test_output_round_trip() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);

        gpio.set_direction(2, Direction::Output);
        gpio.set_state(2, State::High).unwrap();
        assert_eq!(gpio.get_state(2), Ok(State::High));
        assert_eq!(bridge.control(), 0b1100);
        assert_eq!(gpio.read_control_register().unwrap().bits(), 0b1100);

        gpio.set_state(2, State::Low).unwrap();
        assert_eq!(gpio.get_state(2), Ok(State::Low));
        assert_eq!(bridge.control(), 0);
    }

    #[test]
    fn test_paired_outputs() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        gpio.set_direction(3, Direction::Output);
        gpio.set_direction(4, Direction::Output);

        gpio.set_state(3, State::High).unwrap();
        gpio.set_state(4, State::High).unwrap();
        gpio.set_state(3, State::Low).unwrap();

        assert!(!bridge.output(3));
        assert!(bridge.output(4));
        assert_eq!(bridge.control(), 0b1100_0000);
        assert_eq!(gpio.control_mirror().bits(), 0b1100_0000);
    }

    #[test]
    fn test_failed_write_keeps_mirror() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        gpio.set_direction(1, Direction::Output);

        bridge.set_bus_owned(true);
        assert_eq!(gpio.set_state(1, State::High), Err(Error::BusUnavailable));
        assert_eq!(gpio.get_state(1), Ok(State::Low));
        assert_eq!(gpio.control_mirror().bits(), 0);

        bridge.set_bus_owned(false);
        gpio.set_state(1, State::High).unwrap();
        assert_eq!(gpio.get_state(1), Ok(State::High));
    }

    #[test]
    fn test_silent_bridge_times_out() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        gpio.set_direction(7, Direction::Output);

        bridge.set_silent(true);
        assert_eq!(gpio.set_state(7, State::High), Err(Error::Timeout));
        assert_eq!(gpio.get_state(7), Ok(State::Low));
    }

    #[test]
    fn test_enable_ignored_for_output() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);

        gpio.set_direction(6, Direction::Output);
        gpio.set_enable(6, true);
        assert!(!gpio.get_enable(6));
        assert_eq!(gpio.diagnosis_enable().bits(), 0);
        // Writes to an input are ignored as well
        gpio.set_direction(5, Direction::Input);
        assert_eq!(gpio.set_state(5, State::High), Ok(()));
        assert_eq!(bridge.control(), 0);
    }

    #[test]
    fn test_input_low_without_observer() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        bridge.set_input(1, true);

        gpio.set_direction(1, Direction::Input);
        gpio.set_enable(1, true);
        assert!(gpio.get_enable(1));
        assert_eq!(gpio.get_state(1), Ok(State::Low));
        // Nothing beyond the wake-up frame reached the chip
        assert_eq!(bridge.frames(), vec![0xE8]);
    }

    #[test]
    fn test_edge_detection() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        gpio.set_direction(3, Direction::Input);
        gpio.set_enable(3, true);
        gpio.set_direction(4, Direction::Input);

        let (observer, events) = recorder();
        assert!(gpio.set_observer(Some(observer)).is_none());
        assert!(gpio.is_observing());
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Attached));

        bridge.set_input(4, true);
        bridge.set_input(3, true);
        assert_eq!(events.recv_timeout(WAIT), Ok(changed(3, State::High)));
        assert!(events.recv_timeout(QUIET).is_err());

        bridge.set_input(3, false);
        assert_eq!(events.recv_timeout(WAIT), Ok(changed(3, State::Low)));
        assert!(events.recv_timeout(QUIET).is_err());

        assert!(gpio.set_observer(None).is_some());
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Detached));
        assert!(!gpio.is_observing());

        // Only DCCR0 carries an armed channel, DCCR1 is never written
        let frames = bridge.frames();
        assert!(frames.contains(&0xC4));
        assert!(!frames.iter().any(|&frame| frame & 0xF0 == 0xD0));
    }

    #[test]
    fn test_bus_error_reports_no_edge() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        gpio.set_direction(3, Direction::Input);
        gpio.set_enable(3, true);
        bridge.set_input(3, true);

        let (observer, events) = recorder();
        gpio.set_observer(Some(observer));
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Attached));
        assert_eq!(events.recv_timeout(WAIT), Ok(changed(3, State::High)));

        // The engine keeps polling through failed reads
        bridge.set_bus_owned(true);
        thread::sleep(Duration::from_millis(30));
        bridge.set_bus_owned(false);
        assert!(events.recv_timeout(QUIET).is_err());

        bridge.set_input(3, false);
        assert_eq!(events.recv_timeout(WAIT), Ok(changed(3, State::Low)));

        gpio.set_observer(None);
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Detached));
    }

    #[test]
    fn test_rendezvous_freshness() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        gpio.set_direction(5, Direction::Input);
        bridge.set_input(5, true);

        let (observer, events) = recorder();
        gpio.set_observer(Some(observer));
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Attached));

        // Not continuously armed, so only a fresh measurement can see it
        assert_eq!(gpio.get_state(5), Ok(State::High));
        assert!(!gpio.get_enable(5));
        assert_eq!(gpio.diagnosis_enable().bits(), 0);

        bridge.set_input(5, false);
        assert_eq!(gpio.get_state(5), Ok(State::Low));

        // Synchronous reads never produce edge notifications
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_readers() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);
        for id in [1, 2, 7] {
            gpio.set_direction(id, Direction::Input);
        }
        bridge.set_input(2, true);
        bridge.set_input(7, true);

        let (observer, events) = recorder();
        gpio.set_observer(Some(observer));
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Attached));

        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    assert_eq!(gpio.get_state(1), Ok(State::Low));
                    assert_eq!(gpio.get_state(2), Ok(State::High));
                    assert_eq!(gpio.get_state(7), Ok(State::High));
                });
            }
        });
        assert_eq!(gpio.diagnosis_enable().bits(), 0);
    }

    #[test]
    fn test_observer_replacement_ordering() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);

        let (tx, rx) = mpsc::channel();
        let tagged = |tag: char| {
            let tx = tx.clone();
            Box::new(move |event: Event| {
                let _ = tx.send((tag, event));
            }) as Box<dyn Observer>
        };

        gpio.set_observer(Some(tagged('a')));
        assert_eq!(rx.recv_timeout(WAIT), Ok(('a', Event::Attached)));

        let previous = gpio.set_observer(Some(tagged('b')));
        assert!(previous.is_some());
        assert_eq!(rx.recv_timeout(WAIT), Ok(('a', Event::Detached)));
        assert_eq!(rx.recv_timeout(WAIT), Ok(('b', Event::Attached)));

        gpio.set_observer(None);
        assert_eq!(rx.recv_timeout(WAIT), Ok(('b', Event::Detached)));
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_drop_detaches_observer() {
        let bridge = DummyBridge::new_default();
        let gpio = open(&bridge);

        let (observer, events) = recorder();
        gpio.set_observer(Some(observer));
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Attached));

        drop(gpio);
        assert_eq!(events.recv_timeout(WAIT), Ok(Event::Detached));
    }

    #[test]
    fn test_emulated_diagnosis_needs_arming() {
        let mut bridge = DummyBridge::new_default();
        bridge.set_input(1, true);

        let mut codec = mica_gpio_core::SpiCodec::new(&mut bridge, Duration::ZERO, 1);
        codec.transfer(0xE8).unwrap();
        codec.transfer(BANK_DIAGNOSIS).unwrap();
        assert_eq!(codec.transfer(FRAME_NULL).unwrap(), Some(0));

        codec.transfer(0xC1).unwrap();
        codec.transfer(BANK_DIAGNOSIS).unwrap();
        assert_eq!(codec.transfer(FRAME_NULL).unwrap(), Some(0b0010));
    }
}
