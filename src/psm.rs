//! Power Saving Mode settings
//!
//! The network grants PSM timers that may differ from the ones requested with
//! `AT+CPSMS`. The granted values come from a vendor specific query whose
//! field layout and number format are described by [`VendorProfile`].

use core::fmt::Write;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::config::{TimerFormat, VendorProfile};
use crate::error::Error;
use crate::response;
use crate::timer::{self, TimerKind};

pub const READ_PSM_COMMAND: &str = "AT+CPSMS?";
pub const DISABLE_PSM_COMMAND: &str = "AT+CPSMS=0";

const CPSMS_PREFIX: &str = "+CPSMS:";
const CPSMS_TAU_INDEX: usize = 3;
const CPSMS_ACTIVE_TIME_INDEX: usize = 4;

/// PSM state as granted by the network and as requested by the device.
///
/// Timer values are in seconds; `None` means not reported or deactivated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsmSettings {
    pub enabled_network: bool,
    pub tau_network: Option<u32>,
    pub active_time_network: Option<u32>,
    pub enabled_request: Option<bool>,
    pub tau_request: Option<u32>,
    pub active_time_request: Option<u32>,
}

impl PsmSettings {
    /// Parse the reply to [`VendorProfile::psm_query`].
    pub fn parse_network(reply: &str, profile: &VendorProfile) -> Result<Self, Error> {
        let values = response::values(reply, profile.psm_prefix);
        let enabled_network = flag(values.first())?;

        let mut settings = Self {
            enabled_network,
            ..Self::default()
        };

        if enabled_network {
            let offset = profile.psm_offset;
            let field = |i: usize| values.get(i).ok_or(Error::UnexpectedResponse);
            settings.tau_network =
                timer_value(field(1 + offset)?, profile.psm_format, TimerKind::Tau)?;
            settings.active_time_network =
                timer_value(field(2 + offset)?, profile.psm_format, TimerKind::ActiveTime)?;
        }

        Ok(settings)
    }

    /// Fill in the requested values from the reply to `AT+CPSMS?`.
    pub fn parse_request(&mut self, reply: &str) -> Result<(), Error> {
        let values = response::values(reply, CPSMS_PREFIX);
        let enabled = flag(values.first())?;
        self.enabled_request = Some(enabled);

        if enabled {
            let field = |i: usize| values.get(i).ok_or(Error::UnexpectedResponse);
            self.tau_request =
                timer_value(field(CPSMS_TAU_INDEX)?, TimerFormat::Bits, TimerKind::Tau)?;
            self.active_time_request = timer_value(
                field(CPSMS_ACTIVE_TIME_INDEX)?,
                TimerFormat::Bits,
                TimerKind::ActiveTime,
            )?;
        }

        Ok(())
    }
}

fn flag(value: Option<&&str>) -> Result<bool, Error> {
    value
        .and_then(|v| v.parse::<u8>().ok())
        .map(|v| v > 0)
        .ok_or(Error::UnexpectedResponse)
}

fn timer_value(
    field: &str,
    format: TimerFormat,
    kind: TimerKind,
) -> Result<Option<u32>, Error> {
    match format {
        TimerFormat::Seconds => response::unquote(field)
            .parse()
            .map(Some)
            .map_err(|_| Error::UnexpectedResponse),
        TimerFormat::Bits => Ok(kind.table().decode(timer::from_bits(field)?)?),
    }
}

/// Build the command requesting PSM with the given timers.
///
/// Both durations are quantized, see [`crate::timer`].
pub fn set_psm_command(tau_seconds: u32, active_seconds: u32) -> Result<String<40>, Error> {
    let tau = timer::encode_tau(tau_seconds)?;
    let active = timer::encode_active_time(active_seconds)?;
    let mut cmd = String::new();
    write!(
        cmd,
        "AT+CPSMS=1,,,\"{}\",\"{}\"",
        timer::to_bits(tau),
        timer::to_bits(active)
    )
    .ok();
    Ok(cmd)
}
