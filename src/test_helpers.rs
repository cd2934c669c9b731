use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Once;

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use env_logger::Env;

use crate::channel::Port;
use crate::clock::Clock;
use crate::error::Error;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("trace"))
            .is_test(true)
            .init();
    });
}

/// What the port does the next time its receive queue runs dry.
#[derive(Debug)]
enum Event {
    Data(Vec<u8>),
    /// One poll with nothing to read.
    Silence,
    /// One failing poll, as when the device is unplugged.
    Fault,
}

/// Scripted [`Port`].
///
/// Each CRLF terminated write releases the next queued reply into the
/// receive queue. Independently, each time the receive queue is empty when
/// polled, the next scripted [`Event`] is released.
#[derive(Debug)]
pub struct MockPort {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    script: VecDeque<Event>,
    written: Vec<String>,
    open: bool,
    polls: usize,

    /// Times the port was opened after construction.
    pub opened: usize,
    pub present: bool,
    /// Become present once polled this many times.
    pub present_after_polls: Option<usize>,
    pub fail_open: bool,
}

impl MockPort {
    /// An open, present port with nothing to read.
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            replies: VecDeque::new(),
            script: VecDeque::new(),
            written: Vec::new(),
            open: true,
            polls: 0,
            opened: 0,
            present: true,
            present_after_polls: None,
            fail_open: false,
        }
    }

    pub fn reply(&mut self, reply: &str) {
        self.replies.push_back(reply.as_bytes().to_vec());
    }

    pub fn script_data(&mut self, data: impl AsRef<[u8]>) {
        self.script.push_back(Event::Data(data.as_ref().to_vec()));
    }

    pub fn script_silence(&mut self) {
        self.script.push_back(Event::Silence);
    }

    pub fn script_fault(&mut self) {
        self.script.push_back(Event::Fault);
    }

    /// Everything written so far, one entry per write.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    /// Bytes not yet read, including scripted data not yet released.
    pub fn pending(&self) -> Vec<u8> {
        let mut pending: Vec<u8> = self.rx.iter().copied().collect();
        for event in &self.script {
            if let Event::Data(data) = event {
                pending.extend_from_slice(data);
            }
        }
        pending
    }
}

impl Port for MockPort {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), Error> {
        if self.fail_open {
            return Err(Error::DeviceNotFound);
        }
        if !self.open {
            self.open = true;
            self.opened += 1;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn bytes_to_read(&mut self) -> Result<usize, Error> {
        if !self.open {
            return Err(Error::ChannelNotOpen);
        }
        if self.rx.is_empty() {
            match self.script.pop_front() {
                Some(Event::Data(data)) => self.rx.extend(data),
                Some(Event::Fault) => return Err(Error::Io(ErrorKind::BrokenPipe)),
                Some(Event::Silence) | None => {}
            }
        }
        Ok(self.rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if !self.open {
            return Err(Error::ChannelNotOpen);
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        if !self.open {
            return Err(Error::ChannelNotOpen);
        }
        self.written.push(String::from_utf8_lossy(buf).into_owned());
        if buf.ends_with(b"\r\n") {
            if let Some(reply) = self.replies.pop_front() {
                self.rx.extend(reply);
            }
        }
        Ok(())
    }

    fn is_present(&mut self) -> bool {
        self.polls += 1;
        match self.present_after_polls {
            Some(n) if self.polls > n => true,
            _ => self.present,
        }
    }
}

/// Virtual clock; every delay advances it instantly.
#[derive(Debug)]
pub struct MockClock {
    start: Instant,
    now: Instant,
    /// Added on every reading of the clock, as if work took time.
    pub step: Duration,
}

impl MockClock {
    pub fn new() -> Self {
        let start = Instant::from_secs(1_000);
        Self {
            start,
            now: start,
            step: Duration::from_ticks(0),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.now.duration_since(self.start).as_millis()
    }
}

impl DelayNs for MockClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now += Duration::from_micros(u64::from(ns).div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.now += Duration::from_micros(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += Duration::from_millis(u64::from(ms));
    }
}

impl Clock for MockClock {
    fn now(&mut self) -> Instant {
        self.now += self.step;
        self.now
    }
}
