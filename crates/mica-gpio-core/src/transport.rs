//! Transport contract between the GPIO engine and the physical bridge
//!
//! A transport only moves opaque fixed-size reports. Framing, retries and
//! interpretation of the response codes live in [`crate::codec`].

use std::time::Duration;

use crate::error::Result;
use crate::protocol::Report;

/// A report-oriented link to the bridge device
///
/// Implementations own the device session: opening happens in their
/// constructor and the device is released when the transport is dropped.
pub trait Transport: Send {
    /// Send one command report
    fn write_report(&mut self, report: &Report) -> Result<()>;

    /// Wait up to `timeout` for one response report
    ///
    /// Returns `Ok(false)` if no report arrived in time; the caller decides
    /// whether to retry.
    fn read_report(&mut self, report: &mut Report, timeout: Duration) -> Result<bool>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_report(&mut self, report: &Report) -> Result<()> {
        (**self).write_report(report)
    }

    fn read_report(&mut self, report: &mut Report, timeout: Duration) -> Result<bool> {
        (**self).read_report(report, timeout)
    }
}
