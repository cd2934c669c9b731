use core::str::FromStr;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::urc::UrcDeframer;

/// Baud rate every supported module ships with.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Device node prefixes of serial-over-USB and serial-over-UART ports.
pub const DEFAULT_DISCOVERY_PREFIXES: [&str; 3] = ["/dev/ttyA", "/dev/ttyS", "/dev/ttyUSB"];

/// Settings of the serial link to the module.
///
/// Framing is always 8N1 without flow control; only the device node, baud
/// rate and read timeout vary between deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_discovery_prefixes")]
    pub discovery_prefixes: Vec<String>,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    crate::module_timing::read_timeout().as_millis()
}

fn default_discovery_prefixes() -> Vec<String> {
    DEFAULT_DISCOVERY_PREFIXES.map(String::from).to_vec()
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            discovery_prefixes: default_discovery_prefixes(),
        }
    }

    /// Config for a short port name such as `USB0` or `S1`, resolved under `/dev/tty`.
    pub fn from_port_name(name: &str) -> Self {
        Self::new(format!("/dev/tty{}", name))
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis();
        self
    }

    pub fn with_discovery_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discovery_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Whether the configured path lies under one of the discovery prefixes.
    pub fn is_discoverable(&self) -> bool {
        self.discovery_prefixes
            .iter()
            .any(|prefix| self.path.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Quectel,
    Telit,
    Ublox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVendor;

impl core::fmt::Display for UnknownVendor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown vendor, expected one of quectel, telit, ublox")
    }
}

impl FromStr for Vendor {
    type Err = UnknownVendor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quectel" => Ok(Self::Quectel),
            "telit" => Ok(Self::Telit),
            "ublox" | "u-blox" => Ok(Self::Ublox),
            _ => Err(UnknownVendor),
        }
    }
}

impl Vendor {
    pub fn profile(self) -> &'static VendorProfile {
        match self {
            Self::Quectel => &QUECTEL,
            Self::Telit => &TELIT,
            Self::Ublox => &UBLOX,
        }
    }
}

/// Encoding of the timer values in a vendor PSM query reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFormat {
    /// Plain decimal seconds.
    Seconds,
    /// 8 digit timer bitfields, see [`crate::timer`].
    Bits,
}

/// Commands that bring up a packet data context and a UDP socket whose
/// datagrams are pushed as receive URCs.
#[derive(Debug)]
pub struct UdpListenerProfile {
    /// Builds the context configuration command for an APN.
    pub configure_context: fn(&str) -> String,
    pub context_query: &'static str,
    /// Prefix of the reply to [`UdpListenerProfile::context_query`].
    pub context_prefix: &'static str,
    /// Index of the quoted local address in the context query reply.
    pub context_address_index: usize,
    pub activate_context: &'static str,
    /// Builds the command opening the listening socket on a local port.
    pub open_socket: fn(u16) -> String,
    pub socket_query: &'static str,
    /// Present in the socket query reply once the socket is listening.
    pub socket_marker: &'static str,
}

/// Everything that differs between vendors, as data.
#[derive(Debug)]
pub struct VendorProfile {
    pub vendor: Vendor,
    /// Prefix of the URC carrying received UDP datagrams in-band, if any.
    pub recv_urc_header: Option<&'static str>,
    /// How to open the socket delivering those URCs.
    pub udp_listener: Option<&'static UdpListenerProfile>,
    /// Command querying the PSM state the network granted.
    pub psm_query: &'static str,
    /// Prefix of the reply to [`VendorProfile::psm_query`].
    pub psm_prefix: &'static str,
    /// Index of the "PSM enabled" field; TAU and Active Time follow it.
    pub psm_offset: usize,
    pub psm_format: TimerFormat,
    /// Sent before `AT+CPSMS=1,...`
    pub psm_enable_prelude: &'static [&'static str],
    /// Sent after `AT+CPSMS=1,...`
    pub psm_enable_extra: &'static [&'static str],
    /// Sent after `AT+CPSMS=0`
    pub psm_disable_extra: &'static [&'static str],
    /// Reboot required for PSM settings to take effect.
    pub psm_reboot: Option<&'static str>,
}

impl VendorProfile {
    pub fn deframer(&self) -> Option<UrcDeframer> {
        self.recv_urc_header.map(UrcDeframer::new)
    }
}

fn quectel_context(apn: &str) -> String {
    format!("AT+QICSGP=1,1,\"{}\",\"\",\"\",0", apn)
}

fn quectel_udp_service(port: u16) -> String {
    format!("AT+QIOPEN=1,1,\"UDP SERVICE\",\"127.0.0.1\",0,{},1", port)
}

static QUECTEL_UDP_LISTENER: UdpListenerProfile = UdpListenerProfile {
    configure_context: quectel_context,
    context_query: "AT+QIACT?",
    context_prefix: "+QIACT:",
    context_address_index: 3,
    activate_context: "AT+QIACT=1",
    open_socket: quectel_udp_service,
    socket_query: "AT+QISTATE=1,1",
    socket_marker: "UDP",
};

pub static QUECTEL: VendorProfile = VendorProfile {
    vendor: Vendor::Quectel,
    recv_urc_header: Some("+QIURC: \"recv\","),
    udp_listener: Some(&QUECTEL_UDP_LISTENER),
    psm_query: "AT+QPSMS?",
    psm_prefix: "+QPSMS:",
    psm_offset: 2,
    psm_format: TimerFormat::Seconds,
    psm_enable_prelude: &[],
    psm_enable_extra: &["AT+QCFG=\"psm/urc\",1"],
    psm_disable_extra: &["AT+QCFG=\"psm/urc\",0"],
    psm_reboot: None,
};

pub static TELIT: VendorProfile = VendorProfile {
    vendor: Vendor::Telit,
    recv_urc_header: None,
    udp_listener: None,
    psm_query: "AT#CPSMS?",
    psm_prefix: "#CPSMS:",
    psm_offset: 0,
    psm_format: TimerFormat::Seconds,
    psm_enable_prelude: &[],
    psm_enable_extra: &[],
    psm_disable_extra: &[],
    psm_reboot: None,
};

pub static UBLOX: VendorProfile = VendorProfile {
    vendor: Vendor::Ublox,
    recv_urc_header: None,
    udp_listener: None,
    psm_query: "AT+UCPSMS?",
    psm_prefix: "+UCPSMS:",
    psm_offset: 2,
    psm_format: TimerFormat::Bits,
    psm_enable_prelude: &["AT+CMEE=2", "AT+CFUN=0"],
    psm_enable_extra: &["AT+CGEREP=1,1", "AT+UPSV=4"],
    psm_disable_extra: &["AT+UPSV=0"],
    psm_reboot: Some("AT+CFUN=15"),
};
