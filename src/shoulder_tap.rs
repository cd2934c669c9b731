//! Shoulder-tap wake packets
//!
//! A shoulder-tap is a small UDP datagram sent by the network side to prompt a
//! sleeping device to check in. Only the `Udp0` scheme is supported:
//!
//! ```text
//! STX | type "01" | sequence (4 hex) | length (2 hex) | payload | ETX
//! ```

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::hex;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Type field of the `Udp0` scheme.
pub const UDP0: &[u8; 2] = b"01";

/// Port the shoulder-tap service delivers to unless configured otherwise.
pub const DEFAULT_PORT: u16 = 23747;

pub const MAX_PAYLOAD_LEN: usize = 255;

const SEQUENCE_LEN: usize = 4;
const LENGTH_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sequence,
    PayloadLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Packet empty or not starting with STX.
    MalformedHeader,
    /// Type field other than `Udp0`; carries the offending bytes.
    UnsupportedType(Vec<u8, 2>),
    Truncated(Field),
    InvalidHex(Field),
    TruncatedPayload { expected: usize, actual: usize },
    /// Byte after the payload was not ETX (`None` if the packet ended).
    MissingTerminator(Option<u8>),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MalformedHeader => write!(f, "first byte was not STX"),
            Self::UnsupportedType(t) => write!(f, "unsupported shoulder-tap type {:02x?}", t),
            Self::Truncated(field) => write!(f, "not enough bytes for {:?}", field),
            Self::InvalidHex(field) => write!(f, "{:?} is not hexadecimal", field),
            Self::TruncatedPayload { expected, actual } => {
                write!(f, "expected {} payload bytes, got {}", expected, actual)
            }
            Self::MissingTerminator(b) => write!(f, "final byte was not ETX: {:02x?}", b),
        }
    }
}

/// A decoded `Udp0` shoulder-tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoulderTap {
    sequence: u16,
    payload: Option<Vec<u8, MAX_PAYLOAD_LEN>>,
    imsi: String,
}

impl ShoulderTap {
    /// Decode `packet`, attributing it to the device identified by `imsi`.
    pub fn parse(packet: &[u8], imsi: &str) -> Result<Self, Error> {
        trace!("Shoulder-tap packet: {:02x?}", packet);
        let mut reader = Reader { buf: packet };

        if reader.take(1) != Some(&[STX][..]) {
            return Err(Error::MalformedHeader);
        }

        let kind = &reader.buf[..reader.buf.len().min(UDP0.len())];
        if kind != UDP0 {
            return Err(Error::UnsupportedType(
                Vec::from_slice(kind).unwrap_or_default(),
            ));
        }
        reader.take(UDP0.len());

        let sequence = reader.hex_field(SEQUENCE_LEN, Field::Sequence)?;
        let length = usize::from(reader.hex_field(LENGTH_LEN, Field::PayloadLength)?);

        let payload = reader.take(length).ok_or(Error::TruncatedPayload {
            expected: length,
            actual: reader.buf.len(),
        })?;

        match reader.take(1) {
            Some([ETX]) => {}
            Some([b]) => return Err(Error::MissingTerminator(Some(*b))),
            _ => return Err(Error::MissingTerminator(None)),
        }

        let payload = match payload {
            [] => None,
            // length is at most 0xff
            p => Vec::from_slice(p).ok(),
        };

        Ok(Self {
            sequence,
            payload,
            imsi: imsi.into(),
        })
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn imsi(&self) -> &str {
        &self.imsi
    }

    /// `{imsi}-{sequence}`, with the sequence zero-padded to 5 digits.
    pub fn request_id(&self) -> String {
        format!("{}-{:05}", self.imsi, self.sequence)
    }
}

/// Parse a packet, logging and discarding it if it is malformed.
pub fn parse_shoulder_tap(packet: &[u8], imsi: &str) -> Option<ShoulderTap> {
    ShoulderTap::parse(packet, imsi)
        .map_err(|e| warn!("Dropping shoulder-tap: {}", e))
        .ok()
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Consume exactly `n` bytes, or nothing if fewer remain.
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.buf.len() < n {
            return None;
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Some(head)
    }

    fn hex_field(&mut self, n: usize, field: Field) -> Result<u16, Error> {
        let bytes = self.take(n).ok_or(Error::Truncated(field))?;
        hex::field_to_u16(bytes).map_err(|_| Error::InvalidHex(field))
    }
}
