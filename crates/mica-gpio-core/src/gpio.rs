//! The owning GPIO context
//!
//! [`MicaGpio`] collects everything the engine shares between threads: the
//! transport session, the pin table with its register mirrors and the
//! polling engine registration. Lock order is session before pins; the
//! engine slot is only held around state transitions, never across a join
//! or a rendezvous wait.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::codec::SpiCodec;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::pins::{Channel, Direction, PinTable, State, CHANNEL_COUNT};
use crate::poller::Poller;
use crate::protocol::COMMAND_WAKE;
use crate::registers::{
    self, ControlRegister, DiagnosisEnable, DiagnosisSnapshot, Frame, GROUP_COUNT,
};
use crate::settings::{ChipSettings, TransferSettings};
use crate::transport::Transport;

/// Opens a transport session on demand
pub type Connector = Box<dyn FnMut() -> Result<Box<dyn Transport>> + Send>;

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the engine thread
pub(crate) struct Shared {
    pub(crate) config: Config,
    connector: Mutex<Connector>,
    session: Mutex<Option<Box<dyn Transport>>>,
    pins: Mutex<PinTable>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        relock(&self.session)
    }

    fn pins(&self) -> MutexGuard<'_, PinTable> {
        relock(&self.pins)
    }

    fn is_ready(&self) -> bool {
        self.session().is_some()
    }

    /// Open the session unless one exists
    fn connect(&self) -> Result<()> {
        let mut session = self.session();
        if session.is_some() {
            return Ok(());
        }

        let mut connector = relock(&self.connector);
        let mut transport = (*connector)()?;
        log::info!("Bridge session opened");
        self.power_up(transport.as_mut());
        *session = Some(transport);
        Ok(())
    }

    /// Wake the load switch and store the power-up defaults
    ///
    /// Failures are logged; the session stays usable for what does work.
    fn power_up(&self, transport: &mut dyn Transport) {
        let mut codec = SpiCodec::with_config(transport, &self.config);

        if let Err(e) = codec.transfer(Frame::command(COMMAND_WAKE)) {
            log::warn!("Failed to wake load switch: {}", e);
        }
        if !self.config.apply_power_up_settings {
            return;
        }
        match codec.set_chip_settings(&self.config.chip_settings) {
            Ok(()) => log::info!("Chip power-up settings written"),
            Err(e) => log::warn!("Failed to write chip settings: {}", e),
        }
        match codec.set_transfer_settings(&self.config.transfer_settings) {
            Ok(()) => log::info!("Transfer power-up settings written"),
            Err(e) => log::warn!("Failed to write transfer settings: {}", e),
        }
    }

    /// Run `f` with a codec on the open session
    fn with_codec<T>(&self, f: impl FnOnce(&mut SpiCodec<'_>) -> Result<T>) -> Result<T> {
        let mut session = self.session();
        let transport = session.as_mut().ok_or(Error::DeviceNotReady)?;
        let mut codec = SpiCodec::with_config(transport.as_mut(), &self.config);
        f(&mut codec)
    }

    /// One engine measurement: re-arm with the live mask, then poll
    ///
    /// Groups that cannot be read, or every group while there is no session,
    /// keep their bits from `previous`.
    pub(crate) fn measure(&self, previous: DiagnosisSnapshot) -> DiagnosisSnapshot {
        let measured = self.with_codec(|codec| {
            let enable = self.pins().diagnosis_enable();
            if let Err(e) = registers::rearm_diagnosis(codec, enable) {
                log::warn!("Diagnosis re-arm failed: {}", e);
            }
            Ok(registers::poll_diagnosis(codec, enable, previous))
        });
        measured.unwrap_or(previous)
    }

    pub(crate) fn continuous_mask(&self) -> u8 {
        self.pins().continuous_mask()
    }
}

/// 8-channel GPIO context over one bridge device
///
/// Created explicitly and torn down on drop, which stops a running engine.
pub struct MicaGpio {
    shared: Arc<Shared>,
    engine: Mutex<Option<Poller>>,
    registration: Mutex<()>,
}

impl MicaGpio {
    /// Create a context and try to open the device once
    ///
    /// A device that cannot be opened yet is not an error: the context
    /// starts "not ready" and later calls back off and retry.
    pub fn open<C>(config: Config, connector: C) -> Self
    where
        C: FnMut() -> Result<Box<dyn Transport>> + Send + 'static,
    {
        let gpio = Self {
            shared: Arc::new(Shared {
                config,
                connector: Mutex::new(Box::new(connector)),
                session: Mutex::new(None),
                pins: Mutex::new(PinTable::new()),
            }),
            engine: Mutex::new(None),
            registration: Mutex::new(()),
        };
        if let Err(e) = gpio.shared.connect() {
            log::warn!("Bridge not ready: {}", e);
        }
        gpio
    }

    /// Create a context over an already opened transport
    pub fn with_transport<T>(config: Config, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let mut transport: Option<Box<dyn Transport>> = Some(Box::new(transport));
        Self::open(config, move || transport.take().ok_or(Error::DeviceNotReady))
    }

    fn engine(&self) -> MutexGuard<'_, Option<Poller>> {
        relock(&self.engine)
    }

    /// Configuration the context was created with
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Whether a transport session is open
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// Whether an observer is registered (engine running)
    pub fn is_observing(&self) -> bool {
        self.engine().is_some()
    }

    /// Back off once and retry opening if there is no session yet
    fn wait_ready(&self) {
        if self.shared.is_ready() {
            return;
        }
        log::debug!(
            "Bridge not ready, retrying in {:?}",
            self.shared.config.ready_backoff
        );
        thread::sleep(self.shared.config.ready_backoff);
        if let Err(e) = self.shared.connect() {
            log::warn!("Bridge still not ready: {}", e);
        }
    }

    /// Number of channels, always 8
    pub fn get_channel_count(&self) -> u8 {
        CHANNEL_COUNT
    }

    /// Stored direction of channel `id`, `None` until configured
    pub fn get_direction(&self, id: u8) -> Result<Option<Direction>> {
        let channel = Channel::new(id)?;
        Ok(self.shared.pins().direction(channel))
    }

    /// Configure the direction of channel `id`; invalid ids are ignored
    ///
    /// Switching to OUTPUT also drops the channel's continuous enable.
    pub fn set_direction(&self, id: u8, direction: Direction) {
        if let Ok(channel) = Channel::new(id) {
            log::debug!("Channel {} direction {}", channel, direction);
            self.shared.pins().set_direction(channel, direction);
        }
    }

    /// Diagnosis arming of channel `id`; false for outputs and invalid ids
    pub fn get_enable(&self, id: u8) -> bool {
        Channel::new(id)
            .map(|channel| self.shared.pins().enable(channel))
            .unwrap_or(false)
    }

    /// Continuously sense input `id`; ignored unless it is a valid INPUT
    pub fn set_enable(&self, id: u8, enable: bool) {
        if let Ok(channel) = Channel::new(id) {
            self.shared.pins().set_enable(channel, enable);
        }
    }

    /// Logical state of channel `id`
    ///
    /// An OUTPUT reports its mirror without touching the hardware. An INPUT
    /// is measured through the running engine and may block for up to two
    /// polling iterations; with no engine running it reads LOW. A channel
    /// without a direction reads LOW.
    pub fn get_state(&self, id: u8) -> Result<State> {
        let channel = Channel::new(id)?;
        let direction = self.shared.pins().direction(channel);
        match direction {
            Some(Direction::Output) => Ok(self.shared.pins().output_state(channel)),
            Some(Direction::Input) => Ok(self.read_input(channel)),
            None => Ok(State::Low),
        }
    }

    fn read_input(&self, channel: Channel) -> State {
        self.wait_ready();

        let (rendezvous, on_engine) = match self.engine().as_ref() {
            Some(poller) => (poller.rendezvous(), poller.is_current_thread()),
            None => return State::Low,
        };

        // Inside a callback the engine cannot tick for us
        if on_engine {
            return rendezvous.latest().state(channel.index());
        }

        log::debug!("Synchronous read of channel {}", channel);
        let snapshot = rendezvous.acquire(
            || self.shared.pins().arm(channel),
            || self.shared.pins().restore(channel),
        );
        match snapshot {
            Some(snapshot) => snapshot.state(channel.index()),
            None => {
                log::debug!("Engine stopped during read of channel {}", channel);
                State::Low
            }
        }
    }

    /// Drive output `id`
    ///
    /// Invalid ids and channels that are not OUTPUT are ignored. The mirror
    /// only changes once the bridge accepted the frame.
    pub fn set_state(&self, id: u8, state: State) -> Result<()> {
        let Ok(channel) = Channel::new(id) else {
            return Ok(());
        };
        if self.shared.pins().direction(channel) != Some(Direction::Output) {
            return Ok(());
        }

        self.wait_ready();
        self.shared.with_codec(|codec| {
            let control = self.shared.pins().control();
            let updated = registers::write_output(codec, control, channel.index(), state)?;
            self.shared.pins().set_control(updated);
            Ok(())
        })
    }

    /// Register `observer`, replacing (and stopping) the current one
    ///
    /// The previous engine is joined before the new one starts, so the old
    /// observer has seen its detach event before the new one sees attach.
    /// Passing `None` only stops the engine. Returns the previous observer.
    ///
    /// Must not be called from inside [`Observer::notify`].
    pub fn set_observer(&self, observer: Option<Box<dyn Observer>>) -> Option<Box<dyn Observer>> {
        let _registration = relock(&self.registration);
        self.wait_ready();

        let current = self.engine().take();
        let previous = current.and_then(Poller::stop);

        if let Some(observer) = observer {
            match Poller::start(Arc::clone(&self.shared), observer) {
                Ok(poller) => *self.engine() = Some(poller),
                Err(e) => log::error!("Failed to start polling engine: {}", e),
            }
        }
        previous
    }

    /// Live diagnosis enable mask
    pub fn diagnosis_enable(&self) -> DiagnosisEnable {
        self.shared.pins().diagnosis_enable()
    }

    /// Control register mirror
    pub fn control_mirror(&self) -> ControlRegister {
        self.shared.pins().control()
    }

    /// Read the control register back from the load switch
    pub fn read_control_register(&self) -> Result<ControlRegister> {
        self.wait_ready();
        self.shared.with_codec(|codec| {
            let mut bits = 0u16;
            for bank in 0..GROUP_COUNT {
                bits |= u16::from(registers::read_control_bank(codec, bank)?) << (bank * 4);
            }
            Ok(ControlRegister::from_bits(bits))
        })
    }

    /// Read the chip settings power-up default from the bridge
    pub fn chip_settings(&self) -> Result<ChipSettings> {
        self.wait_ready();
        self.shared.with_codec(|codec| codec.get_chip_settings())
    }

    /// Store new chip settings power-up defaults
    pub fn set_chip_settings(&self, settings: &ChipSettings) -> Result<()> {
        self.wait_ready();
        self.shared.with_codec(|codec| codec.set_chip_settings(settings))
    }

    /// Read the SPI transfer power-up settings from the bridge
    pub fn transfer_settings(&self) -> Result<TransferSettings> {
        self.wait_ready();
        self.shared.with_codec(|codec| codec.get_transfer_settings())
    }

    /// Store new SPI transfer power-up settings
    pub fn set_transfer_settings(&self, settings: &TransferSettings) -> Result<()> {
        self.wait_ready();
        self.shared.with_codec(|codec| codec.set_transfer_settings(settings))
    }
}

impl Drop for MicaGpio {
    fn drop(&mut self) {
        let engine = self.engine().take();
        if let Some(poller) = engine {
            poller.stop();
        }
    }
}
