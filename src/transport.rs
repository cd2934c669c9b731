//! Command/response correlation over the serial channel.
//!
//! One [`Transport::send`] call is one transaction: the command line goes
//! out, then the reply is collected according to [`SendOptions`] before the
//! call returns. There is no pipelining; the next command is only written
//! once the previous reply has been drained.

use embassy_time::Duration;

use crate::channel::Port;
use crate::clock::Clock;
use crate::error::{Error, GenericError};
use crate::module_timing;
use crate::response;

const LF: u8 = b'\n';
const CRLF: &[u8] = b"\r\n";

/// How to collect the reply to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions<'p> {
    /// Raw bytes written after the reply, e.g. the data of a socket send.
    pub payload: Option<&'p [u8]>,
    /// Sleep between writing the command and reading the reply.
    pub delay: Duration,
    /// Time to wait for the first byte of the reply.
    pub timeout: Duration,
    /// Read until the reply contains `OK` or `ERROR` instead of until idle.
    pub wait_for_terminal: bool,
    /// Overall bound on waiting for `OK` or `ERROR`.
    pub deadline: Duration,
}

impl Default for SendOptions<'_> {
    fn default() -> Self {
        Self {
            payload: None,
            delay: Duration::from_ticks(0),
            timeout: module_timing::reply_timeout(),
            wait_for_terminal: false,
            deadline: module_timing::terminal_deadline(),
        }
    }
}

impl<'p> SendOptions<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a final result code, giving up after the default deadline.
    pub fn terminated() -> Self {
        Self::default().wait_for_terminal()
    }

    pub fn with_payload(mut self, payload: &'p [u8]) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn wait_for_terminal(mut self) -> Self {
        self.wait_for_terminal = true;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Borrowed view of a session's port and clock for issuing commands.
pub struct Transport<'a, P: ?Sized, C: ?Sized> {
    port: &'a mut P,
    clock: &'a mut C,
}

impl<'a, P, C> Transport<'a, P, C>
where
    P: Port + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(port: &'a mut P, clock: &'a mut C) -> Self {
        Self { port, clock }
    }

    /// Write `command` followed by CRLF and collect the reply.
    ///
    /// The reply is returned exactly as received, decoded lossily as UTF-8.
    /// In idle mode this is whatever arrived by the time the port went quiet,
    /// which may be an incomplete reply.
    pub fn send(&mut self, command: &str, options: &SendOptions<'_>) -> Result<String, Error> {
        if !self.port.is_open() {
            error!("Serial port is not open");
            return Err(Error::ChannelNotOpen);
        }

        debug!(">> {}", command);
        let mut line = Vec::with_capacity(command.len() + CRLF.len());
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(CRLF);
        self.port.write_all(&line)?;

        if options.delay.as_ticks() > 0 {
            self.clock.sleep(options.delay);
        }

        let reply = if options.wait_for_terminal {
            self.read_until_terminated(options.deadline)?
        } else {
            self.read_until_idle(options.timeout)?
        };

        if let Some(payload) = options.payload {
            debug!("More data: {} bytes", payload.len());
            self.clock.sleep(module_timing::payload_settle());
            self.port.write_all(payload)?;
            self.clock.sleep(module_timing::payload_settle());
        }

        let reply = String::from_utf8_lossy(&reply).into_owned();
        debug!("<< {}", reply.trim());
        Ok(reply)
    }

    /// Wait up to `timeout` for the first byte, then drain what is available.
    fn read_until_idle(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        let start = self.clock.now();
        while self.port.bytes_to_read()? == 0 && self.clock.elapsed(start) < timeout {
            self.clock.sleep(module_timing::first_byte_poll());
        }

        let mut reply = Vec::new();
        while self.port.bytes_to_read()? > 0 {
            self.read_line(&mut reply)?;
        }
        Ok(reply)
    }

    fn read_until_terminated(&mut self, deadline: Duration) -> Result<Vec<u8>, Error> {
        let start = self.clock.now();
        let mut reply = Vec::new();
        loop {
            // Holds even while unrelated lines keep arriving
            if self.clock.elapsed(start) >= deadline {
                warn!(
                    "No final result code after {} ms: {:?}",
                    deadline.as_millis(),
                    String::from_utf8_lossy(&reply)
                );
                return Err(Error::Generic(GenericError::Timeout));
            }

            if self.port.bytes_to_read()? > 0 {
                self.read_line(&mut reply)?;
                if response::is_terminated(&reply) {
                    return Ok(reply);
                }
            } else {
                self.clock.sleep(module_timing::first_byte_poll());
            }
        }
    }

    /// Append bytes up to and including the next LF, or until a read times out.
    fn read_line(&mut self, reply: &mut Vec<u8>) -> Result<(), Error> {
        let mut byte = [0u8; 1];
        while self.port.read(&mut byte)? == 1 {
            reply.push(byte[0]);
            if byte[0] == LF {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helpers::{init_logger, MockClock, MockPort};

    #[test]
    fn writes_command_line() {
        init_logger();
        let mut port = MockPort::new();
        port.reply("\r\nOK\r\n");
        let mut clock = MockClock::new();

        let reply = Transport::new(&mut port, &mut clock)
            .send("ATE0", &SendOptions::new())
            .unwrap();

        assert_eq!(reply, "\r\nOK\r\n");
        assert_eq!(port.written(), ["ATE0\r\n"]);
    }

    #[test]
    fn closed_port() {
        let mut port = MockPort::new();
        port.close();
        let mut clock = MockClock::new();

        assert_eq!(
            Transport::new(&mut port, &mut clock).send("AT", &SendOptions::new()),
            Err(Error::ChannelNotOpen)
        );
        assert!(port.written().is_empty());
    }

    #[test]
    fn idle_mode_gives_up_after_timeout() {
        let mut port = MockPort::new();
        let mut clock = MockClock::new();

        let options = SendOptions::new().with_timeout(Duration::from_millis(100));
        let reply = Transport::new(&mut port, &mut clock)
            .send("AT+CSQ", &options)
            .unwrap();

        assert_eq!(reply, "");
        assert_eq!(clock.elapsed_ms(), 100);
    }

    #[test]
    fn idle_mode_returns_partial_reply() {
        let mut port = MockPort::new();
        port.reply("\r\n+CSQ: 17,99\r\n");
        let mut clock = MockClock::new();

        let reply = Transport::new(&mut port, &mut clock)
            .send("AT+CSQ", &SendOptions::new())
            .unwrap();

        // The trailing OK never arrived; idle mode does not wait for it
        assert_eq!(reply, "\r\n+CSQ: 17,99\r\n");
    }

    #[test]
    fn delay_precedes_read() {
        let mut port = MockPort::new();
        port.reply("\r\nOK\r\n");
        let mut clock = MockClock::new();

        let options = SendOptions::new().with_delay(Duration::from_secs(2));
        Transport::new(&mut port, &mut clock)
            .send("AT+CPSMS=0", &options)
            .unwrap();

        assert_eq!(clock.elapsed_ms(), 2000);
    }

    #[test]
    fn terminal_mode_reads_until_ok() {
        let mut port = MockPort::new();
        port.reply("AT+CIMI\r\n");
        port.script_data("\r\n310170123456789\r\n");
        port.script_silence();
        port.script_data("\r\nOK\r\n");
        port.script_data("\r\n+CTZV: 1\r\n");
        let mut clock = MockClock::new();

        let reply = Transport::new(&mut port, &mut clock)
            .send("AT+CIMI", &SendOptions::terminated())
            .unwrap();

        assert_eq!(reply, "AT+CIMI\r\n\r\n310170123456789\r\n\r\nOK\r\n");
        // Bytes after the final result code stay in the port
        assert_eq!(port.pending(), b"\r\n+CTZV: 1\r\n");
    }

    #[test]
    fn terminal_mode_accepts_error() {
        let mut port = MockPort::new();
        port.reply("\r\n+CME ERROR: 10\r\n");
        let mut clock = MockClock::new();

        let reply = Transport::new(&mut port, &mut clock)
            .send("AT+CIMI", &SendOptions::terminated())
            .unwrap();
        assert!(reply.contains("ERROR"));
    }

    #[test]
    fn terminal_mode_has_deadline() {
        let mut port = MockPort::new();
        port.reply("\r\n+COPS: 0\r\n");
        let mut clock = MockClock::new();

        let options = SendOptions::terminated().with_deadline(Duration::from_secs(3));
        assert_eq!(
            Transport::new(&mut port, &mut clock).send("AT+COPS?", &options),
            Err(Error::Generic(GenericError::Timeout))
        );
        assert_eq!(clock.elapsed_ms(), 3000);
    }

    #[test]
    fn terminal_mode_deadline_holds_while_lines_keep_coming() {
        let mut port = MockPort::new();
        for _ in 0..1000 {
            port.script_data("+CTZV: 1\r\n");
        }
        let mut clock = MockClock::new();
        clock.step = Duration::from_millis(100);

        let options = SendOptions::terminated().with_deadline(Duration::from_secs(3));
        assert_eq!(
            Transport::new(&mut port, &mut clock).send("AT+COPS?", &options),
            Err(Error::Generic(GenericError::Timeout))
        );
        // Gave up long before the port ran dry
        assert!(port.pending().len() > 900 * "+CTZV: 1\r\n".len());
    }

    #[test]
    fn trailing_payload_is_written_after_settling() {
        let mut port = MockPort::new();
        port.reply("\r\n> ");
        let mut clock = MockClock::new();

        let options = SendOptions::new().with_payload(b"GET / HTTP/1.1\r\n\r\n");
        let reply = Transport::new(&mut port, &mut clock)
            .send("AT+QISEND=0,18", &options)
            .unwrap();

        assert_eq!(reply, "\r\n> ");
        assert_eq!(
            port.written(),
            ["AT+QISEND=0,18\r\n", "GET / HTTP/1.1\r\n\r\n"]
        );
        assert_eq!(clock.elapsed_ms(), 2000);
    }

    #[test]
    fn read_fault_is_an_error() {
        let mut port = MockPort::new();
        port.script_fault();
        let mut clock = MockClock::new();

        assert!(matches!(
            Transport::new(&mut port, &mut clock).send("AT", &SendOptions::new()),
            Err(Error::Io(_))
        ));
    }
}
