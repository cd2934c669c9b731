//! Extraction of UDP datagrams delivered in-band as unsolicited result codes
//!
//! Modules configured for "direct push" report each received datagram as a
//! header line followed by the raw payload:
//!
//! ```text
//! +QIURC: "recv",<connection id>,<length>,"<remote ip>",<remote port>\r\n
//! <length raw bytes>\r\n
//! ```
//!
//! A buffer captured by [`crate::waiter::UrcWaiter`] may interleave any number
//! of these with unrelated URCs such as `+CTZV: 1`.

use no_std_net::IpAddr;

use crate::response;

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The fields following a receive header did not match
    /// `<id>,<length>,"<ip>",<port>`.
    FieldParseFailure,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FieldParseFailure => write!(f, "malformed receive URC fields"),
        }
    }
}

/// Recoverable problems met while scanning a buffer.
///
/// These never abort a scan; they are recorded in [`Deframed::issues`] so
/// callers can tell a clean empty result from a damaged one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A line not starting with the receive header; carries its start offset.
    HeaderMismatch { offset: usize },
    /// A receive header without a terminating CR, at the end of the buffer.
    IncompleteHeader { offset: usize },
    /// The buffer ended before the declared payload length. The frame is dropped.
    LengthInconsistency { declared: usize, available: usize },
    /// The payload was not followed by CRLF. The frame is kept.
    MissingTrailer { offset: usize },
}

/// One datagram extracted from a receive URC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDeliveryFrame {
    pub connection_id: u8,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub payload: Vec<u8>,
}

impl UdpDeliveryFrame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of scanning one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deframed {
    pub frames: Vec<UdpDeliveryFrame>,
    pub issues: Vec<Inconsistency>,
}

impl Deframed {
    pub fn payloads(self) -> Vec<Vec<u8>> {
        self.frames.into_iter().map(|f| f.payload).collect()
    }
}

struct Fields {
    connection_id: u8,
    length: usize,
    remote_ip: IpAddr,
    remote_port: u16,
}

impl Fields {
    fn parse(line: &[u8]) -> Result<Self, Error> {
        let line = core::str::from_utf8(line).map_err(|_| Error::FieldParseFailure)?;
        let mut fields = line.split(',');
        let mut next = || fields.next().ok_or(Error::FieldParseFailure);

        let connection_id = next()?.parse().map_err(|_| Error::FieldParseFailure)?;
        let length = next()?.parse().map_err(|_| Error::FieldParseFailure)?;

        let ip = next()?;
        let unquoted = response::unquote(ip);
        if unquoted.len() + 2 != ip.len() {
            return Err(Error::FieldParseFailure);
        }
        let remote_ip = unquoted.parse().map_err(|_| Error::FieldParseFailure)?;

        let remote_port = next()?.parse().map_err(|_| Error::FieldParseFailure)?;

        if fields.next().is_some() {
            return Err(Error::FieldParseFailure);
        }

        Ok(Self {
            connection_id,
            length,
            remote_ip,
            remote_port,
        })
    }
}

/// Scanner for one vendor's receive-URC header literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrcDeframer {
    header: &'static [u8],
}

impl UrcDeframer {
    pub const fn new(header: &'static str) -> Self {
        Self {
            header: header.as_bytes(),
        }
    }

    pub fn header(&self) -> &'static [u8] {
        self.header
    }

    /// Extract every receive URC in `buf`, in order.
    ///
    /// Malformed header fields abort the scan without returning the frames
    /// found so far. Everything else is recorded as an [`Inconsistency`].
    pub fn deframe(&self, buf: &[u8]) -> Result<Deframed, Error> {
        let mut out = Deframed::default();
        let mut pos = 0;

        while pos < buf.len() {
            let rest = &buf[pos..];

            if !rest.starts_with(self.header) {
                let end = rest
                    .iter()
                    .position(|&b| b == LF)
                    .map_or(buf.len(), |i| pos + i + 1);
                let line = &buf[pos..end];
                if !line.iter().all(u8::is_ascii_whitespace) {
                    warn!(
                        "Unrecognized URC: {:?}",
                        String::from_utf8_lossy(line).trim_end()
                    );
                    out.issues.push(Inconsistency::HeaderMismatch { offset: pos });
                }
                pos = end;
                continue;
            }

            let fields_start = pos + self.header.len();
            let Some(cr) = buf[fields_start..].iter().position(|&b| b == CR) else {
                error!("Receive URC cut off before end of header at {}", pos);
                out.issues.push(Inconsistency::IncompleteHeader { offset: pos });
                break;
            };
            let fields_end = fields_start + cr;

            let fields = Fields::parse(&buf[fields_start..fields_end]).map_err(|e| {
                error!(
                    "Failed to parse receive URC fields: {:?}",
                    String::from_utf8_lossy(&buf[fields_start..fields_end])
                );
                e
            })?;

            // Header line ends in CRLF; tolerate a bare CR
            pos = fields_end + 1;
            if buf.get(pos) == Some(&LF) {
                pos += 1;
            }

            let available = buf.len() - pos;
            if available < fields.length {
                warn!(
                    "Dropping receive URC: declared {} bytes, only {} available",
                    fields.length,
                    available
                );
                out.issues.push(Inconsistency::LengthInconsistency {
                    declared: fields.length,
                    available,
                });
                break;
            }

            let payload = buf[pos..pos + fields.length].to_vec();
            pos += fields.length;

            if buf[pos..].starts_with(CRLF) {
                pos += CRLF.len();
            } else {
                warn!("Receive URC payload not followed by CRLF at {}", pos);
                out.issues.push(Inconsistency::MissingTrailer { offset: pos });
            }

            trace!(
                "Receive URC from {}:{} with {} bytes",
                fields.remote_ip,
                fields.remote_port,
                payload.len()
            );
            out.frames.push(UdpDeliveryFrame {
                connection_id: fields.connection_id,
                remote_ip: fields.remote_ip,
                remote_port: fields.remote_port,
                payload,
            });
        }

        Ok(out)
    }

    /// Payloads of [`UrcDeframer::deframe`], or an empty list if the buffer
    /// could not be scanned.
    pub fn payloads(&self, buf: &[u8]) -> Vec<Vec<u8>> {
        self.deframe(buf).map(Deframed::payloads).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Vendor;

    fn deframer() -> UrcDeframer {
        Vendor::Quectel.profile().deframer().unwrap()
    }

    fn urc(payload: &[u8]) -> Vec<u8> {
        urc_from(payload, "1.1.1.1", 65534)
    }

    fn urc_from(payload: &[u8], ip: &str, port: u16) -> Vec<u8> {
        let mut urc = format!("+QIURC: \"recv\",1,{},\"{}\",{}\r\n", payload.len(), ip, port)
            .into_bytes();
        urc.extend_from_slice(payload);
        urc.extend_from_slice(b"\r\n");
        urc
    }

    #[test]
    fn single_frame() {
        let out = deframer().deframe(&urc(b"payload 1")).unwrap();
        assert!(out.issues.is_empty());
        assert_eq!(out.frames.len(), 1);

        let frame = &out.frames[0];
        assert_eq!(frame.connection_id, 1);
        assert_eq!(frame.remote_ip, "1.1.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(frame.remote_port, 65534);
        assert_eq!(frame.payload, b"payload 1");
    }

    #[test]
    fn multiple_frames() {
        let expected: [&[u8]; 3] = [b"payload 1", b"second payload", b"this is the third payload"];
        let buf: Vec<u8> = expected.iter().flat_map(|p| urc(p)).collect();

        assert_eq!(deframer().payloads(&buf), expected);
    }

    #[test]
    fn payloads_containing_newlines() {
        let expected: [&[u8]; 3] = [b"payload\n1", b"second pay\r\nload", b"\r\n"];
        let buf: Vec<u8> = expected.iter().flat_map(|p| urc(p)).collect();

        assert_eq!(deframer().payloads(&buf), expected);
    }

    #[test]
    fn interleaved_unrelated_urcs() {
        let expected: [&[u8]; 3] = [b"payload\n1", b"second pay\nload", b"this is the third payload"];
        let mut buf = Vec::new();
        for p in expected {
            buf.extend(urc(p));
            buf.extend_from_slice(b"+CTZV: 1\r\n");
        }

        let out = deframer().deframe(&buf).unwrap();
        assert_eq!(out.issues.len(), 3);
        assert!(out
            .issues
            .iter()
            .all(|i| matches!(i, Inconsistency::HeaderMismatch { .. })));
        assert_eq!(out.payloads(), expected);
    }

    #[test]
    fn blank_lines_are_not_reported() {
        let mut buf = b"\r\n".to_vec();
        buf.extend(urc(b"x"));
        buf.extend_from_slice(b"\r\n\r\n");

        let out = deframer().deframe(&buf).unwrap();
        assert!(out.issues.is_empty());
        assert_eq!(out.payloads(), [b"x"]);
    }

    #[test]
    fn header_without_payload() {
        let full = urc(b"Hello, world!");
        let lf = full.iter().position(|&b| b == b'\n').unwrap();

        let out = deframer().deframe(&full[..=lf]).unwrap();
        assert!(out.frames.is_empty());
        assert_eq!(
            out.issues,
            [Inconsistency::LengthInconsistency {
                declared: 13,
                available: 0
            }]
        );
    }

    #[test]
    fn interrupted_payload_is_dropped() {
        let full = urc(b"0123456789");
        let lf = full.iter().position(|&b| b == b'\n').unwrap();

        let out = deframer().deframe(&full[..lf + 1 + 5]).unwrap();
        assert!(out.frames.is_empty());
        assert_eq!(
            out.issues,
            [Inconsistency::LengthInconsistency {
                declared: 10,
                available: 5
            }]
        );
    }

    #[test]
    fn earlier_frames_survive_a_truncated_one() {
        let mut buf = urc(b"first");
        let second = urc(b"0123456789");
        buf.extend_from_slice(&second[..second.len() - 4]);

        let out = deframer().deframe(&buf).unwrap();
        assert_eq!(out.payloads(), [b"first"]);
    }

    #[test]
    fn header_cut_off_before_cr() {
        let mut buf = urc(b"first");
        buf.extend_from_slice(b"+QIURC: \"recv\",1,5,\"1.1");

        let out = deframer().deframe(&buf).unwrap();
        assert_eq!(out.frames.len(), 1);
        assert!(matches!(
            out.issues[..],
            [Inconsistency::IncompleteHeader { .. }]
        ));
    }

    #[test]
    fn missing_trailer_keeps_payload() {
        let mut buf = b"+QIURC: \"recv\",1,3,\"10.0.0.1\",5000\r\nabc".to_vec();
        buf.extend(urc(b"next"));

        let out = deframer().deframe(&buf).unwrap();
        assert_eq!(out.payloads(), [&b"abc"[..], &b"next"[..]]);
    }

    #[test]
    fn malformed_fields_abort_the_buffer() {
        let mut buf = urc(b"first");
        buf.extend_from_slice(b"+QIURC: \"recv\",1,five,\"1.1.1.1\",65534\r\nfive!\r\n");
        assert_eq!(deframer().deframe(&buf), Err(Error::FieldParseFailure));
        assert!(deframer().payloads(&buf).is_empty());

        for bad in [
            &b"+QIURC: \"recv\",1,3,1.1.1.1,80\r\nabc\r\n"[..],
            b"+QIURC: \"recv\",1,3,\"not-an-ip\",80\r\nabc\r\n",
            b"+QIURC: \"recv\",1,3,\"1.1.1.1\"\r\nabc\r\n",
            b"+QIURC: \"recv\",1,3,\"1.1.1.1\",80,9\r\nabc\r\n",
            b"+QIURC: \"recv\",1,3,\"1.1.1.1\",70000\r\nabc\r\n",
        ] {
            assert_eq!(deframer().deframe(bad), Err(Error::FieldParseFailure));
        }
    }

    #[test]
    fn binary_payload() {
        let payload = b"\x0201000100\x03";
        let buf = urc_from(payload, "35.212.147.4", 23747);
        let out = deframer().deframe(&buf).unwrap();
        assert_eq!(out.frames[0].remote_port, 23747);
        assert_eq!(out.frames[0].payload, payload);
    }
}
