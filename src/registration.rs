use embassy_time::{Duration, Instant};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::response;

pub const READ_REGISTRATION_COMMAND: &str = "AT+CREG?";
pub const READ_OPERATOR_COMMAND: &str = "AT+COPS?";
pub const SIGNAL_QUALITY_COMMAND: &str = "AT+CSQ";

/// `<rssi>` and `<ber>` value meaning "not known or not detectable".
const CSQ_UNKNOWN: u8 = 99;

#[derive(Debug, Clone, Default)]
pub struct CellularRegistrationStatus {
    status: Status,
    updated: Option<Instant>,
    started: Option<Instant>,
}

impl CellularRegistrationStatus {
    pub const fn new() -> Self {
        Self {
            status: Status::None,
            updated: None,
            started: None,
        }
    }

    /// How long the current status has been held at `ts`.
    pub fn duration(&self, ts: Instant) -> Duration {
        self.started
            .and_then(|started| ts.checked_duration_since(started))
            .unwrap_or_else(|| Duration::from_millis(0))
    }

    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    pub fn updated(&self) -> Option<Instant> {
        self.updated
    }

    pub fn reset(&mut self) {
        self.status = Status::None;
        self.updated = None;
        self.started = None;
    }

    pub fn get_status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, stat: Status, ts: Instant) {
        if self.status != stat {
            debug!("Registration status {:?} -> {:?}", self.status, stat);
            self.status = stat;
            self.started = Some(ts);
        }
        self.updated = Some(ts);
    }

    pub fn registered(&self) -> bool {
        self.status.registered()
    }

    /// Whether the status has been confirmed at least once since it changed.
    pub fn sticky(&self) -> bool {
        self.updated.is_some() && self.updated != self.started
    }
}

/// 3GPP `<stat>` of `+CREG`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    None,
    NotRegistering,
    Home,
    Searching,
    Denied,
    /// Reported as "unknown", typically out of coverage.
    OutOfCoverage,
    Roaming,
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistering,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::OutOfCoverage,
            5 => Self::Roaming,
            _ => Self::None,
        }
    }
}

impl Status {
    pub fn registered(self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::None => "invalid value",
            Self::NotRegistering => "not registered",
            Self::Home => "registered, home network",
            Self::Searching => "not registered, scanning",
            Self::Denied => "registration denied",
            Self::OutOfCoverage => "unknown",
            Self::Roaming => "registered, roaming",
        };
        f.write_str(s)
    }
}

/// Current operator selection, from `+COPS: <mode>[,<format>,<oper>[,<AcT>]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub mode: u8,
    pub format: Option<u8>,
    pub name: Option<String>,
    pub act: Option<u8>,
}

impl Operator {
    fn parse(values: &[&str]) -> Option<Self> {
        let mode = values.first()?.parse().ok()?;
        Some(Self {
            mode,
            format: values.get(1).and_then(|v| v.parse().ok()),
            name: values.get(2).map(|v| response::unquote(v).into()),
            act: values.get(3).and_then(|v| v.parse().ok()),
        })
    }
}

/// Snapshot of registration, operator and signal quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub status: Status,
    pub operator: Option<Operator>,
    /// Received signal strength; `None` if the module could not measure it.
    pub rssi_dbm: Option<i16>,
    pub ber: Option<u8>,
}

impl NetworkInfo {
    /// Build from the replies to `AT+CREG?`, `AT+COPS?` and `AT+CSQ`.
    pub fn parse(creg: &str, cops: &str, csq: &str) -> Result<Self, Error> {
        let values = response::values(creg, "+CREG:");
        let status = values
            .get(1)
            .and_then(|v| v.parse::<u8>().ok())
            .map(Status::from)
            .ok_or(Error::UnexpectedResponse)?;

        let operator = Operator::parse(&response::values(cops, "+COPS:"));

        let values = response::values(csq, "+CSQ:");
        let rssi_dbm = values
            .first()
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|csq| *csq != CSQ_UNKNOWN)
            .map(rssi_dbm);
        let ber = values
            .get(1)
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|ber| *ber != CSQ_UNKNOWN);

        Ok(Self {
            status,
            operator,
            rssi_dbm,
            ber,
        })
    }
}

/// Convert a `+CSQ` `<rssi>` index to dBm.
pub fn rssi_dbm(csq: u8) -> i16 {
    -113 + 2 * i16::from(csq)
}
