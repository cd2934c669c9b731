//! Blocking wait for unsolicited result codes.

use core::ops::Deref;

use embassy_time::Duration;

use crate::channel::{self, Port};
use crate::clock::Clock;
use crate::error::Error;
use crate::module_timing;
use crate::response;

const LF: u8 = b'\n';

/// Complete lines collected by [`UrcWaiter::wait`], exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrcBuffer(Vec<u8>);

impl UrcBuffer {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// The buffer decoded lossily as UTF-8, for logging and text matching.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        response::find(&self.0, pattern.as_bytes()).is_some()
    }
}

impl Deref for UrcBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for UrcBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

pub struct UrcWaiter<'a, P: ?Sized, C: ?Sized> {
    port: &'a mut P,
    clock: &'a mut C,
}

impl<'a, P, C> UrcWaiter<'a, P, C>
where
    P: Port + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(port: &'a mut P, clock: &'a mut C) -> Self {
        Self { port, clock }
    }

    /// Collect complete lines until `timeout` elapses.
    ///
    /// Returns as soon as a line containing `pattern` arrives, with that line
    /// included. If the port faults, it is closed and the device node is
    /// polled for the rest of the budget. With `return_on_disconnect` the
    /// lines collected so far are returned right away; otherwise the port is
    /// reopened and waiting continues.
    ///
    /// Running out of time, or failing to get the port back, is not an
    /// error: the caller gets whatever was collected, which may be nothing.
    pub fn wait(
        &mut self,
        timeout: Duration,
        pattern: Option<&str>,
        return_on_disconnect: bool,
    ) -> Result<UrcBuffer, Error> {
        if !self.port.is_open() {
            error!("Serial port is not open");
            return Err(Error::ChannelNotOpen);
        }

        debug!("Waiting {} ms for URC", timeout.as_millis());
        let start = self.clock.now();
        let mut collected = Vec::new();
        let mut line = Vec::new();

        while self.clock.elapsed(start) < timeout {
            match self.collect(&mut line, &mut collected, pattern) {
                Ok(true) => return Ok(UrcBuffer(collected)),
                Ok(false) => {}
                Err(e) => {
                    warn!("Channel fault while waiting for URC: {}", e);
                    self.port.close();
                    // A line cut by the fault never completes
                    line.clear();

                    let budget = channel::remaining(&mut *self.clock, start, timeout);
                    let found = channel::discover(&mut *self.port, &mut *self.clock, budget);
                    if return_on_disconnect {
                        info!("Channel lost, returning {} bytes", collected.len());
                        return Ok(UrcBuffer(collected));
                    }
                    if !found {
                        error!("Device did not come back");
                        return Ok(UrcBuffer(collected));
                    }
                    if let Err(e) = self.port.open() {
                        error!("Failed to reopen channel: {}", e);
                        return Ok(UrcBuffer(collected));
                    }
                    info!("Channel reopened");
                }
            }
            self.clock.sleep(module_timing::urc_poll());
        }

        debug!("Finished waiting for URC");
        Ok(UrcBuffer(collected))
    }

    /// Drain available bytes, moving each completed line into `collected`.
    ///
    /// Returns whether a completed line matched `pattern`.
    fn collect(
        &mut self,
        line: &mut Vec<u8>,
        collected: &mut Vec<u8>,
        pattern: Option<&str>,
    ) -> Result<bool, Error> {
        let mut byte = [0u8; 1];
        while self.port.bytes_to_read()? > 0 {
            if self.port.read(&mut byte)? == 0 {
                break;
            }
            line.push(byte[0]);
            if byte[0] != LF {
                continue;
            }

            debug!("<< {}", String::from_utf8_lossy(line).trim());
            let matched =
                pattern.is_some_and(|p| response::find(line, p.as_bytes()).is_some());
            collected.append(line);
            if matched {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
