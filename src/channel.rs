//! The serial link to the module.
//!
//! [`Port`] is the seam between the protocol code and the operating system.
//! [`SerialChannel`] implements it over the `serialport` crate; tests use a
//! scripted mock.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use embassy_time::{Duration, Instant};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::clock::Clock;
use crate::config::SerialConfig;
use crate::error::Error;
use crate::module_timing;

/// A reopenable byte stream to the module.
///
/// A port is owned by exactly one session; reopening replaces the underlying
/// handle in place.
pub trait Port {
    fn is_open(&self) -> bool;

    fn open(&mut self) -> Result<(), Error>;

    /// Drop the underlying handle. Closing a closed port does nothing.
    fn close(&mut self);

    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> Result<usize, Error>;

    /// Read into `buf`, returning `Ok(0)` if the read timed out.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Whether the device node is currently present on the system.
    fn is_present(&mut self) -> bool;
}

/// Poll until the device node appears or `timeout` elapses.
pub fn discover<P, C>(port: &mut P, clock: &mut C, timeout: Duration) -> bool
where
    P: Port + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now();
    loop {
        if port.is_present() {
            return true;
        }
        let elapsed = clock.elapsed(start);
        if elapsed >= timeout {
            warn!("Device not found after {} ms", elapsed.as_millis());
            return false;
        }
        clock.sleep(module_timing::discovery_poll().min(timeout - elapsed));
    }
}

/// Time left of `budget` since `start`.
pub(crate) fn remaining<C>(clock: &mut C, start: Instant, budget: Duration) -> Duration
where
    C: Clock + ?Sized,
{
    budget
        .checked_sub(clock.elapsed(start))
        .unwrap_or(Duration::from_ticks(0))
}

pub struct SerialChannel {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Create a closed channel.
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    /// Create and open a channel.
    pub fn open_with(config: SerialConfig) -> Result<Self, Error> {
        let mut channel = Self::new(config);
        channel.open()?;
        Ok(channel)
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, Error> {
        self.port.as_mut().ok_or(Error::ChannelNotOpen)
    }
}

impl core::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("path", &self.config.path)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl Port for SerialChannel {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<(), Error> {
        if self.port.is_some() {
            return Ok(());
        }

        let timeout = core::time::Duration::from_millis(self.config.read_timeout_ms);
        let port = serialport::new(self.config.path.as_str(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| {
                error!("Failed to open {}: {}", self.config.path, e);
                Error::from(e)
            })?;

        info!("Opened {} at {} baud", self.config.path, self.config.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.config.path);
        }
    }

    fn bytes_to_read(&mut self) -> Result<usize, Error> {
        let n = self.port()?.bytes_to_read()?;
        Ok(n as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        let port = self.port()?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(())
    }

    fn is_present(&mut self) -> bool {
        self.config.is_discoverable() && Path::new(&self.config.path).exists()
    }
}
