use std::io::ErrorKind;

use crate::{edrx::EdrxError, shoulder_tap, timer::TimerError, urc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericError {
    Timeout,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // Channel errors
    ChannelNotOpen,
    Io(ErrorKind),
    DeviceNotFound,

    // Codec and parser errors
    Timer(TimerError),
    Edrx(EdrxError),
    Urc(urc::Error),
    ShoulderTap(shoulder_tap::Error),

    /// The module answered, but not with what the command calls for.
    UnexpectedResponse,

    // Generic shared errors
    Generic(GenericError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ChannelNotOpen => write!(f, "serial channel is not open"),
            Self::Io(kind) => write!(f, "serial I/O error: {}", kind),
            Self::DeviceNotFound => write!(f, "serial device not found"),
            Self::Timer(e) => write!(f, "timer: {}", e),
            Self::Edrx(e) => write!(f, "eDRX: {}", e),
            Self::Urc(e) => write!(f, "URC: {}", e),
            Self::ShoulderTap(e) => write!(f, "shoulder-tap: {}", e),
            Self::UnexpectedResponse => write!(f, "unexpected response"),
            Self::Generic(GenericError::Timeout) => write!(f, "timed out"),
            Self::Generic(GenericError::Unsupported) => write!(f, "not supported by module"),
        }
    }
}

impl std::error::Error for Error {}

impl From<GenericError> for Error {
    fn from(e: GenericError) -> Self {
        Self::Generic(e)
    }
}

impl From<TimerError> for Error {
    fn from(e: TimerError) -> Self {
        Self::Timer(e)
    }
}

impl From<EdrxError> for Error {
    fn from(e: EdrxError) -> Self {
        Self::Edrx(e)
    }
}

impl From<urc::Error> for Error {
    fn from(e: urc::Error) -> Self {
        Self::Urc(e)
    }
}

impl From<shoulder_tap::Error> for Error {
    fn from(e: shoulder_tap::Error) -> Self {
        Self::ShoulderTap(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::NotFound => Self::DeviceNotFound,
            kind => Self::Io(kind),
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => Self::DeviceNotFound,
            serialport::ErrorKind::Io(ErrorKind::NotFound) => Self::DeviceNotFound,
            serialport::ErrorKind::Io(kind) => Self::Io(kind),
            _ => Self::Io(ErrorKind::Other),
        }
    }
}
