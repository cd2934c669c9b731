//! eDRX cycle length and paging time window codes, as used by `AT+CEDRXS`
//! and reported by `AT+CEDRXRDP`.

use core::fmt::Write;
use embassy_time::Duration;
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::response;

/// Access technology reported by `+CEDRXRDP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTechnology {
    /// eDRX not used
    NotUsed = 0,
    Gsm = 2,
    Utran = 3,
    LteCatM1 = 4,
    LteCatNb1 = 5,
}

impl AccessTechnology {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NotUsed),
            2 => Some(Self::Gsm),
            3 => Some(Self::Utran),
            4 => Some(Self::LteCatM1),
            5 => Some(Self::LteCatNb1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdrxError {
    UnknownCode(u8),
    /// `+CEDRXRDP` reply with missing or non-numeric fields.
    Malformed,
}

impl core::fmt::Display for EdrxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownCode(code) => write!(f, "unknown eDRX code {:04b}", code),
            Self::Malformed => write!(f, "malformed eDRX report"),
        }
    }
}

/// eDRX cycle lengths in milliseconds, indexed by their 4 bit code.
const CYCLE_MS: [u64; 16] = [
    5_120, 10_240, 20_480, 40_960, 61_440, 81_920, 102_400, 122_880, 143_360, 163_840, 327_680,
    655_360, 1_310_720, 2_621_440, 5_242_880, 10_485_760,
];

/// Lower bound, in whole seconds, of the requested cycle selecting each code.
const CYCLE_THRESHOLD_S: [u32; 16] = [
    0, 10, 20, 40, 60, 80, 100, 120, 140, 160, 320, 640, 1280, 2560, 5120, 10240,
];

/// Paging time window step, in milliseconds.
const PTW_STEP_MS: u64 = 1_280;

/// Pick the cycle code for a requested cycle length in seconds.
///
/// The chosen cycle is the one whose threshold bucket contains `seconds`;
/// anything above 10240 s selects the longest cycle.
pub fn encode_cycle(seconds: u32) -> u8 {
    CYCLE_THRESHOLD_S
        .iter()
        .rposition(|threshold| seconds >= *threshold)
        .unwrap_or(0) as u8
}

pub fn decode_cycle(code: u8) -> Result<Duration, EdrxError> {
    CYCLE_MS
        .get(usize::from(code))
        .map(|ms| Duration::from_millis(*ms))
        .ok_or(EdrxError::UnknownCode(code))
}

pub fn decode_paging_window(code: u8) -> Result<Duration, EdrxError> {
    if code > 0b1111 {
        return Err(EdrxError::UnknownCode(code));
    }
    Ok(Duration::from_millis(PTW_STEP_MS * (u64::from(code) + 1)))
}

/// Format a 4 bit code as the quoted AT parameter expects it: `"%04b"`.
pub fn to_bits(code: u8) -> String<4> {
    let mut s = String::new();
    write!(s, "{:04b}", code & 0b1111).ok();
    s
}

fn from_bits(field: &str) -> Result<u8, EdrxError> {
    let bits = response::unquote(field);
    if bits.len() != 4 {
        return Err(EdrxError::Malformed);
    }
    u8::from_str_radix(bits, 2).map_err(|_| EdrxError::Malformed)
}

/// Build the command requesting eDRX on LTE-M with the given cycle length.
pub fn set_edrx_command(seconds: u32) -> String<24> {
    let mut cmd = String::new();
    write!(cmd, "AT+CEDRXS=2,4,\"{}\"", to_bits(encode_cycle(seconds))).ok();
    cmd
}

pub const DISABLE_EDRX_COMMAND: &str = "AT+CEDRXS=0";
pub const READ_EDRX_COMMAND: &str = "AT+CEDRXRDP";

/// Dynamic eDRX parameters as reported by `+CEDRXRDP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdrxSettings {
    pub act: AccessTechnology,
    pub requested_cycle: Option<Duration>,
    pub network_cycle: Option<Duration>,
    pub paging_window: Option<Duration>,
}

impl EdrxSettings {
    /// Parse a `+CEDRXRDP: <AcT>[,"cycle"[,"nw cycle"[,"ptw"]]]` reply.
    pub fn parse(reply: &str) -> Result<Self, EdrxError> {
        let values = response::values(reply, "+CEDRXRDP:");
        let act = values
            .first()
            .and_then(|v| response::unquote(v).parse::<u8>().ok())
            .ok_or(EdrxError::Malformed)?;
        let act = AccessTechnology::from_code(act).ok_or(EdrxError::UnknownCode(act))?;

        if act == AccessTechnology::NotUsed {
            return Ok(Self {
                act,
                requested_cycle: None,
                network_cycle: None,
                paging_window: None,
            });
        }

        let field = |i: usize| -> Result<Option<u8>, EdrxError> {
            values.get(i).map(|v| from_bits(v)).transpose()
        };

        Ok(Self {
            act,
            requested_cycle: field(1)?.map(decode_cycle).transpose()?,
            network_cycle: field(2)?.map(decode_cycle).transpose()?,
            paging_window: field(3)?.map(decode_paging_window).transpose()?,
        })
    }

    pub fn enabled(&self) -> bool {
        self.act != AccessTechnology::NotUsed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cycle_thresholds() {
        assert_eq!(encode_cycle(0), 0b0000);
        assert_eq!(encode_cycle(9), 0b0000);
        assert_eq!(encode_cycle(10), 0b0001);
        assert_eq!(encode_cycle(159), 0b1000);
        assert_eq!(encode_cycle(160), 0b1001);
        assert_eq!(encode_cycle(319), 0b1001);
        assert_eq!(encode_cycle(600), 0b1010);
        assert_eq!(encode_cycle(10240), 0b1111);
        assert_eq!(encode_cycle(u32::MAX), 0b1111);
    }

    #[test]
    fn cycle_and_window_durations() {
        assert_eq!(decode_cycle(0), Ok(Duration::from_millis(5_120)));
        assert_eq!(decode_cycle(0b1010), Ok(Duration::from_millis(327_680)));
        assert_eq!(decode_cycle(16), Err(EdrxError::UnknownCode(16)));
        assert_eq!(decode_paging_window(0), Ok(Duration::from_millis(1_280)));
        assert_eq!(decode_paging_window(0b1111), Ok(Duration::from_millis(20_480)));
    }

    #[test]
    fn command() {
        assert_eq!(set_edrx_command(82).as_str(), "AT+CEDRXS=2,4,\"0101\"");
    }

    #[test]
    fn parse_report() {
        let reply = "\r\n+CEDRXRDP: 4,\"0101\",\"0010\",\"0011\"\r\n\r\nOK\r\n";
        let settings = EdrxSettings::parse(reply).unwrap();
        assert!(settings.enabled());
        assert_eq!(settings.act, AccessTechnology::LteCatM1);
        assert_eq!(settings.requested_cycle, Some(Duration::from_millis(81_920)));
        assert_eq!(settings.network_cycle, Some(Duration::from_millis(20_480)));
        assert_eq!(settings.paging_window, Some(Duration::from_millis(5_120)));
    }

    #[test]
    fn parse_disabled_and_garbage() {
        let settings = EdrxSettings::parse("\r\n+CEDRXRDP: 0\r\n\r\nOK\r\n").unwrap();
        assert!(!settings.enabled());
        assert_eq!(settings.requested_cycle, None);

        assert_eq!(
            EdrxSettings::parse("\r\nERROR\r\n"),
            Err(EdrxError::Malformed)
        );
        assert_eq!(
            EdrxSettings::parse("+CEDRXRDP: 4,\"01x1\"\r\nOK\r\n"),
            Err(EdrxError::Malformed)
        );
    }
}
