//! 3GPP PSM timer bitfields
//!
//! `AT+CPSMS` carries the requested periodic TAU (T3412 extended) and Active
//! Time (T3324) as one byte each, written as a quoted 8 character bit-string.
//! The top 3 bits select a unit, the bottom 5 bits hold a multiplier `0..=31`.
//!
//! Encoding is lossy: a duration is rounded down to a whole number of units of
//! the finest unit able to represent it, so `185` seconds of TAU is sent as
//! `6 x 30 s = 180 s`.

use core::fmt::Write;
use heapless::String;
use serde::{Deserialize, Serialize};

const UNIT_MASK: u8 = 0b1110_0000;
const VALUE_MASK: u8 = 0b0001_1111;
const MAX_MULTIPLIER: u32 = 31;

/// Unit code marking a timer as deactivated, in both tables.
pub const DEACTIVATED: u8 = 0b111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The duration is not representable by any unit of the table.
    InvalidDuration,
    /// The unit code is not defined for the table.
    UnknownUnit(u8),
    /// A bit-string parameter was not exactly 8 binary digits.
    InvalidBits,
}

impl core::fmt::Display for TimerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidDuration => write!(f, "duration not representable by timer"),
            Self::UnknownUnit(code) => write!(f, "unknown timer unit code {:03b}", code),
            Self::InvalidBits => write!(f, "timer bit-string is not 8 binary digits"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    /// Requested periodic TAU, T3412 extended.
    Tau,
    /// Requested Active Time, T3324.
    ActiveTime,
}

impl TimerKind {
    pub fn table(self) -> &'static TimerTable {
        match self {
            Self::Tau => &TAU,
            Self::ActiveTime => &ACTIVE_TIME,
        }
    }
}

/// Mapping from 3 bit unit codes to unit length in seconds.
///
/// Entries are ordered by increasing unit length, which is the order
/// [`TimerTable::encode`] tries them in.
#[derive(Debug, PartialEq, Eq)]
pub struct TimerTable {
    units: &'static [(u8, u32)],
}

/// Periodic TAU units, 3GPP TS 24.008 table 10.5.163a.
pub static TAU: TimerTable = TimerTable {
    units: &[
        (0b011, 2),
        (0b100, 30),
        (0b101, 60),
        (0b000, 10 * 60),
        (0b001, 60 * 60),
        (0b010, 10 * 60 * 60),
    ],
};

/// Active Time units, 3GPP TS 24.008 table 10.5.172.
pub static ACTIVE_TIME: TimerTable = TimerTable {
    units: &[(0b000, 2), (0b001, 60), (0b010, 6 * 60)],
};

impl TimerTable {
    fn unit(&self, code: u8) -> Option<u32> {
        self.units
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, secs)| *secs)
    }

    /// Encode `seconds` with the finest unit giving a multiplier in `1..=31`.
    pub fn encode(&self, seconds: u32) -> Result<u8, TimerError> {
        let (code, multiplier) = self
            .units
            .iter()
            .map(|(code, unit)| (*code, seconds / unit))
            .find(|(_, multiplier)| (1..=MAX_MULTIPLIER).contains(multiplier))
            .ok_or(TimerError::InvalidDuration)?;

        Ok(code << 5 | multiplier as u8)
    }

    /// Decode a timer byte into seconds.
    ///
    /// Returns `Ok(None)` if the unit code marks the timer as deactivated.
    pub fn decode(&self, byte: u8) -> Result<Option<u32>, TimerError> {
        let code = (byte & UNIT_MASK) >> 5;
        let multiplier = u32::from(byte & VALUE_MASK);

        match self.unit(code) {
            Some(unit) => Ok(Some(unit * multiplier)),
            None if code == DEACTIVATED => Ok(None),
            None => Err(TimerError::UnknownUnit(code)),
        }
    }

    /// Largest duration accepted by [`TimerTable::encode`].
    pub fn max_seconds(&self) -> u32 {
        self.units
            .iter()
            .map(|(_, unit)| unit * (MAX_MULTIPLIER + 1) - 1)
            .max()
            .unwrap_or(0)
    }
}

pub fn encode_tau(seconds: u32) -> Result<u8, TimerError> {
    TAU.encode(seconds)
}

pub fn encode_active_time(seconds: u32) -> Result<u8, TimerError> {
    ACTIVE_TIME.encode(seconds)
}

pub fn decode(byte: u8, table: &TimerTable) -> Result<Option<u32>, TimerError> {
    table.decode(byte)
}

/// Format a timer byte the way AT commands expect it: `"%08b"`.
pub fn to_bits(byte: u8) -> String<8> {
    let mut s = String::new();
    // 8 digits always fit
    write!(s, "{:08b}", byte).ok();
    s
}

/// Parse an 8 digit bit-string parameter, with or without surrounding quotes.
pub fn from_bits(bits: &str) -> Result<u8, TimerError> {
    let bits = bits.trim().trim_matches('"');
    if bits.len() != 8 || !bits.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(TimerError::InvalidBits);
    }
    u8::from_str_radix(bits, 2).map_err(|_| TimerError::InvalidBits)
}
