//! SPI command codec for the bridge
//!
//! Wraps single-byte SPI frames and NVRAM settings exchanges into command
//! reports, waits (bounded) for the matching response reports and turns the
//! bridge's status codes into [`Error`] values.

use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::*;
use crate::settings::{ChipSettings, TransferSettings, CHIP_SETTINGS_LEN, TRANSFER_SETTINGS_LEN};
use crate::transport::Transport;

/// Upper bound on follow-up frames within one SPI transfer
const MAX_CONTINUATIONS: usize = 16;

/// SPI engine state reported with an accepted transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// No more data, the transfer is complete
    Finished,
    /// Transfer started but nothing to receive yet; echo an empty frame
    Started,
    /// Transfer not finished, more data to receive; send an empty frame
    MoreData,
}

impl Continuation {
    /// Interpret the engine status byte of a transfer response
    pub fn from_status(status: u8) -> Option<Self> {
        match status {
            ENGINE_FINISHED => Some(Self::Finished),
            ENGINE_STARTED => Some(Self::Started),
            ENGINE_MORE_DATA => Some(Self::MoreData),
            _ => None,
        }
    }
}

/// Request/response codec over a [`Transport`]
pub struct SpiCodec<'a> {
    transport: &'a mut dyn Transport,
    timeout: Duration,
    retries: u32,
}

impl<'a> SpiCodec<'a> {
    /// Create a codec with explicit response bounds
    pub fn new(transport: &'a mut dyn Transport, timeout: Duration, retries: u32) -> Self {
        Self {
            transport,
            timeout,
            retries,
        }
    }

    /// Create a codec using the response bounds of `config`
    pub fn with_config(transport: &'a mut dyn Transport, config: &Config) -> Self {
        Self::new(transport, config.response_timeout, config.response_retries)
    }

    /// Wait for the next response report
    fn receive(&mut self) -> Result<Report> {
        let mut response = [0u8; REPORT_SIZE];
        for _ in 0..self.retries.max(1) {
            if self.transport.read_report(&mut response, self.timeout)? {
                log::trace!(
                    "Response {:02X} {:02X} {:02X} {:02X} {:02X}",
                    response[0],
                    response[1],
                    response[2],
                    response[3],
                    response[4]
                );
                return Ok(response);
            }
        }
        Err(Error::Timeout)
    }

    /// Send a command report and wait for its response
    fn exchange(&mut self, command: &Report) -> Result<Report> {
        self.transport.write_report(command)?;
        self.receive()
    }

    /// Clock one frame through the SPI bus
    ///
    /// Returns the byte captured on MISO, if the bridge reported one.
    pub fn transfer(&mut self, frame: u8) -> Result<Option<u8>> {
        let mut command = [0u8; REPORT_SIZE];
        command[0] = CMD_TRANSFER_SPI;
        command[1] = 1;
        command[SPI_DATA_OFFSET] = frame;

        let mut response = self.exchange(&command)?;
        let mut received = None;

        for _ in 0..MAX_CONTINUATIONS {
            if response[0] != CMD_TRANSFER_SPI {
                return Err(Error::UnexpectedResponse {
                    command: response[0],
                    status: response[1],
                });
            }
            match response[1] {
                STATUS_OK => {}
                STATUS_BUS_UNAVAILABLE => return Err(Error::BusUnavailable),
                STATUS_TRANSFER_IN_PROGRESS => return Err(Error::TransferInProgress),
                status => {
                    return Err(Error::UnexpectedResponse {
                        command: CMD_TRANSFER_SPI,
                        status,
                    })
                }
            }

            if response[2] == 1 {
                received = Some(response[SPI_DATA_OFFSET]);
            }

            match Continuation::from_status(response[3]) {
                Some(Continuation::Finished) => return Ok(received),
                Some(Continuation::Started) | Some(Continuation::MoreData) => {
                    let mut follow_up = [0u8; REPORT_SIZE];
                    follow_up[0] = CMD_TRANSFER_SPI;
                    response = self.exchange(&follow_up)?;
                }
                None => {
                    return Err(Error::UnexpectedResponse {
                        command: CMD_TRANSFER_SPI,
                        status: response[3],
                    })
                }
            }
        }

        log::warn!("SPI transfer of frame 0x{:02X} did not finish", frame);
        Err(Error::Timeout)
    }

    /// Read an NVRAM block and return the response report
    fn get_nvram(&mut self, sub_command: u8) -> Result<Report> {
        let mut command = [0u8; REPORT_SIZE];
        command[0] = CMD_GET_NVRAM;
        command[1] = sub_command;

        let response = self.exchange(&command)?;
        if response[0] == CMD_GET_NVRAM && response[1] == STATUS_OK && response[2] == sub_command
        {
            return Ok(response);
        }
        Err(Error::UnexpectedResponse {
            command: response[0],
            status: response[1],
        })
    }

    /// Write an NVRAM block
    fn set_nvram(&mut self, sub_command: u8, payload: &[u8]) -> Result<()> {
        let mut command = [0u8; REPORT_SIZE];
        command[0] = CMD_SET_NVRAM;
        command[1] = sub_command;
        command[NVRAM_PAYLOAD_OFFSET..NVRAM_PAYLOAD_OFFSET + payload.len()]
            .copy_from_slice(payload);

        let response = self.exchange(&command)?;
        if response[0] != CMD_SET_NVRAM {
            return Err(Error::UnexpectedResponse {
                command: response[0],
                status: response[1],
            });
        }
        match response[1] {
            STATUS_OK if response[2] == sub_command => Ok(()),
            STATUS_BLOCKED => Err(Error::SettingsBlocked),
            STATUS_TRANSFER_IN_PROGRESS => Err(Error::TransferInProgress),
            status => Err(Error::UnexpectedResponse {
                command: CMD_SET_NVRAM,
                status,
            }),
        }
    }

    /// Get the chip settings power-up default
    pub fn get_chip_settings(&mut self) -> Result<ChipSettings> {
        let response = self.get_nvram(NVRAM_CHIP_SETTINGS)?;
        ChipSettings::decode(&response[NVRAM_PAYLOAD_OFFSET..])
    }

    /// Set the chip settings power-up default
    pub fn set_chip_settings(&mut self, settings: &ChipSettings) -> Result<()> {
        let mut payload = [0u8; CHIP_SETTINGS_LEN];
        settings.encode(&mut payload);
        log::debug!("Writing chip settings: other=0x{:02X}", settings.other.bits());
        self.set_nvram(NVRAM_CHIP_SETTINGS, &payload)
    }

    /// Get the SPI power-up transfer settings
    pub fn get_transfer_settings(&mut self) -> Result<TransferSettings> {
        let response = self.get_nvram(NVRAM_TRANSFER_SETTINGS)?;
        TransferSettings::decode(&response[NVRAM_PAYLOAD_OFFSET..])
    }

    /// Set the SPI power-up transfer settings
    pub fn set_transfer_settings(&mut self, settings: &TransferSettings) -> Result<()> {
        let mut payload = [0u8; TRANSFER_SETTINGS_LEN];
        settings.encode(&mut payload);
        log::debug!(
            "Writing transfer settings: {} bit/s, mode {}",
            settings.bit_rate,
            settings.spi_mode
        );
        self.set_nvram(NVRAM_TRANSFER_SETTINGS, &payload)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::settings::PinDesignation;
    use std::collections::VecDeque;

    /// Transport replaying canned responses and recording every command
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub responses: VecDeque<Report>,
        pub written: Vec<Report>,
    }

    impl ScriptedTransport {
        pub fn respond(&mut self, bytes: &[u8]) {
            let mut report = [0u8; REPORT_SIZE];
            report[..bytes.len()].copy_from_slice(bytes);
            self.responses.push_back(report);
        }

        /// Queue the two responses of an accepted single-byte transfer
        pub fn respond_transfer(&mut self, miso: u8) {
            self.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, ENGINE_STARTED]);
            self.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 1, ENGINE_FINISHED, miso]);
        }
    }

    impl Transport for ScriptedTransport {
        fn write_report(&mut self, report: &Report) -> Result<()> {
            self.written.push(*report);
            Ok(())
        }

        fn read_report(&mut self, report: &mut Report, _timeout: Duration) -> Result<bool> {
            match self.responses.pop_front() {
                Some(response) => {
                    *report = response;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn codec(transport: &mut ScriptedTransport) -> SpiCodec<'_> {
        SpiCodec::new(transport, Duration::from_millis(1), 3)
    }

    #[test]
    fn test_transfer_frame_layout() {
        let mut transport = ScriptedTransport::default();
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, ENGINE_FINISHED]);

        assert_eq!(codec(&mut transport).transfer(0xA5), Ok(None));
        assert_eq!(transport.written.len(), 1);
        assert_eq!(&transport.written[0][..5], &[0x42, 1, 0, 0, 0xA5]);
    }

    #[test]
    fn test_transfer_started_sends_empty_follow_up() {
        let mut transport = ScriptedTransport::default();
        transport.respond_transfer(0x0A);

        assert_eq!(codec(&mut transport).transfer(0x11), Ok(Some(0x0A)));
        assert_eq!(transport.written.len(), 2);
        assert_eq!(&transport.written[1][..5], &[0x42, 0, 0, 0, 0]);
    }

    #[test]
    fn test_transfer_more_data_continues() {
        let mut transport = ScriptedTransport::default();
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, ENGINE_MORE_DATA]);
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 1, ENGINE_MORE_DATA, 0x01]);
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, ENGINE_FINISHED]);

        // The last captured byte survives a final response without data
        assert_eq!(codec(&mut transport).transfer(0x11), Ok(Some(0x01)));
        assert_eq!(transport.written.len(), 3);
    }

    #[test]
    fn test_transfer_failures() {
        let mut transport = ScriptedTransport::default();
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_BUS_UNAVAILABLE]);
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_TRANSFER_IN_PROGRESS]);
        transport.respond(&[CMD_TRANSFER_SPI, STATUS_OK, 0, 0x55]);

        let mut codec = codec(&mut transport);
        assert_eq!(codec.transfer(0), Err(Error::BusUnavailable));
        assert_eq!(codec.transfer(0), Err(Error::TransferInProgress));
        assert_eq!(
            codec.transfer(0),
            Err(Error::UnexpectedResponse {
                command: CMD_TRANSFER_SPI,
                status: 0x55
            })
        );
    }

    #[test]
    fn test_silent_device_times_out() {
        let mut transport = ScriptedTransport::default();
        assert_eq!(codec(&mut transport).transfer(0x80), Err(Error::Timeout));
    }

    #[test]
    fn test_set_chip_settings_blocked() {
        let mut transport = ScriptedTransport::default();
        transport.respond(&[CMD_SET_NVRAM, STATUS_BLOCKED]);

        let result = codec(&mut transport).set_chip_settings(&ChipSettings::power_up_default());
        assert_eq!(result, Err(Error::SettingsBlocked));
        assert_eq!(&transport.written[0][..4], &[0x60, 0x20, 0, 0]);
        assert_eq!(transport.written[0][4], PinDesignation::ChipSelect as u8);
    }

    #[test]
    fn test_set_transfer_settings_in_progress() {
        let mut transport = ScriptedTransport::default();
        transport.respond(&[CMD_SET_NVRAM, STATUS_TRANSFER_IN_PROGRESS]);

        let result =
            codec(&mut transport).set_transfer_settings(&TransferSettings::power_up_default());
        assert_eq!(result, Err(Error::TransferInProgress));
    }

    #[test]
    fn test_get_transfer_settings() {
        let mut payload = [0u8; TRANSFER_SETTINGS_LEN];
        TransferSettings::power_up_default().encode(&mut payload);
        let mut response = vec![CMD_GET_NVRAM, STATUS_OK, NVRAM_TRANSFER_SETTINGS, 0];
        response.extend_from_slice(&payload);

        let mut transport = ScriptedTransport::default();
        transport.respond(&response);

        let settings = codec(&mut transport).get_transfer_settings().unwrap();
        assert_eq!(settings, TransferSettings::power_up_default());
        assert_eq!(&transport.written[0][..2], &[0x61, 0x10]);
    }
}
