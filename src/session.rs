//! A modem session: one port, one clock, one vendor.
//!
//! [`Session`] owns everything a conversation with the module needs, so there
//! is no process wide state. Vendor differences come from the static
//! [`VendorProfile`] picked at construction.

use std::collections::VecDeque;

use embassy_time::Duration;
use no_std_net::IpAddr;

use crate::channel::{self, Port};
use crate::clock::Clock;
use crate::config::{UdpListenerProfile, Vendor, VendorProfile};
use crate::edrx::{self, EdrxSettings};
use crate::error::{Error, GenericError};
use crate::module_timing;
use crate::psm::{self, PsmSettings};
use crate::registration::{self, CellularRegistrationStatus, NetworkInfo};
use crate::response;
use crate::shoulder_tap::{parse_shoulder_tap, ShoulderTap};
use crate::timer::TimerKind;
use crate::transport::{SendOptions, Transport};
use crate::urc::UdpDeliveryFrame;
use crate::waiter::{UrcBuffer, UrcWaiter};

/// The operations everything above the transport is written against.
pub trait Modem {
    fn send(&mut self, command: &str, options: &SendOptions<'_>) -> Result<String, Error>;

    fn await_event(
        &mut self,
        timeout: Duration,
        pattern: Option<&str>,
        return_on_disconnect: bool,
    ) -> Result<UrcBuffer, Error>;

    fn encode_timer(&self, kind: TimerKind, seconds: u32) -> Result<u8, Error> {
        Ok(kind.table().encode(seconds)?)
    }
}

pub struct Session<P, C> {
    port: P,
    clock: C,
    profile: &'static VendorProfile,
    apn: Option<String>,
    ip: Option<IpAddr>,
    imsi: Option<String>,
    registration: CellularRegistrationStatus,
}

impl<P, C> Modem for Session<P, C>
where
    P: Port,
    C: Clock,
{
    fn send(&mut self, command: &str, options: &SendOptions<'_>) -> Result<String, Error> {
        self.transport().send(command, options)
    }

    fn await_event(
        &mut self,
        timeout: Duration,
        pattern: Option<&str>,
        return_on_disconnect: bool,
    ) -> Result<UrcBuffer, Error> {
        self.waiter().wait(timeout, pattern, return_on_disconnect)
    }
}

impl<P, C> Session<P, C>
where
    P: Port,
    C: Clock,
{
    pub fn new(port: P, clock: C, vendor: Vendor) -> Self {
        Self {
            port,
            clock,
            profile: vendor.profile(),
            apn: None,
            ip: None,
            imsi: None,
            registration: CellularRegistrationStatus::new(),
        }
    }

    pub fn with_apn(mut self, apn: impl Into<String>) -> Self {
        self.apn = Some(apn.into());
        self
    }

    pub fn vendor(&self) -> Vendor {
        self.profile.vendor
    }

    pub fn profile(&self) -> &'static VendorProfile {
        self.profile
    }

    pub fn apn(&self) -> Option<&str> {
        self.apn.as_deref()
    }

    /// Address assigned to the packet data context, as of the last query.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn registration(&self) -> &CellularRegistrationStatus {
        &self.registration
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_parts(self) -> (P, C) {
        (self.port, self.clock)
    }

    pub fn transport(&mut self) -> Transport<'_, P, C> {
        Transport::new(&mut self.port, &mut self.clock)
    }

    pub fn waiter(&mut self) -> UrcWaiter<'_, P, C> {
        UrcWaiter::new(&mut self.port, &mut self.clock)
    }

    /// Send a command, wait for its final result code and require `OK`.
    pub fn command(&mut self, command: &str) -> Result<String, Error> {
        self.command_with(command, SendOptions::terminated())
    }

    fn command_with(&mut self, command: &str, options: SendOptions<'_>) -> Result<String, Error> {
        let reply = self.send(command, &options)?;
        if response::find(reply.as_bytes(), response::ERROR.as_bytes()).is_some() {
            warn!("{} failed: {}", command, reply.trim());
            return Err(Error::UnexpectedResponse);
        }
        Ok(reply)
    }

    /// Open the port if needed, turn off echo and set up the PDP context.
    pub fn init(&mut self) -> Result<(), Error> {
        if !self.port.is_open() {
            self.port.open()?;
        }
        self.command("ATE0")?;

        if let Some(apn) = self.apn.clone() {
            self.command(&format!("AT+CGDCONT=1,\"IP\",\"{}\"", apn))?;
        }

        info!("Session established with {:?} module", self.profile.vendor);
        Ok(())
    }

    /// The SIM's IMSI, queried once and then cached.
    pub fn imsi(&mut self) -> Result<String, Error> {
        if let Some(imsi) = &self.imsi {
            return Ok(imsi.clone());
        }

        let reply = self.command("AT+CIMI")?;
        let imsi = response::first_line(&reply)
            .filter(|l| !l.is_empty() && l.bytes().all(|b| b.is_ascii_digit()))
            .ok_or(Error::UnexpectedResponse)?
            .to_string();
        self.imsi = Some(imsi.clone());
        Ok(imsi)
    }

    pub fn network_info(&mut self) -> Result<NetworkInfo, Error> {
        let creg = self.command(registration::READ_REGISTRATION_COMMAND)?;
        let cops = self.command(registration::READ_OPERATOR_COMMAND)?;
        let csq = self.command(registration::SIGNAL_QUALITY_COMMAND)?;
        let info = NetworkInfo::parse(&creg, &cops, &csq)?;

        let now = self.clock.now();
        self.registration.set_status(info.status, now);
        Ok(info)
    }

    /// Query the address of the packet data context and remember it.
    pub fn packet_address(&mut self) -> Result<Option<IpAddr>, Error> {
        let reply = self.command("AT+CGPADDR=1")?;
        self.ip = response::values(&reply, "+CGPADDR:")
            .get(1)
            .and_then(|v| response::unquote(v).parse().ok());
        Ok(self.ip)
    }

    /// PSM timers granted by the network, plus the requested ones if PSM is on.
    pub fn psm_info(&mut self) -> Result<PsmSettings, Error> {
        let options = SendOptions::terminated().with_delay(Duration::from_secs(1));
        let reply = self.command_with(self.profile.psm_query, options)?;
        let mut settings = PsmSettings::parse_network(&reply, self.profile)?;

        if settings.enabled_network {
            let reply = self.command(psm::READ_PSM_COMMAND)?;
            settings.parse_request(&reply)?;
        }
        Ok(settings)
    }

    /// Request PSM with the given timers, quantized as described in [`crate::timer`].
    ///
    /// Modules that need a reboot for the setting to take effect are rebooted,
    /// and the port is reopened once the device node is back.
    pub fn enable_psm(&mut self, tau_seconds: u32, active_seconds: u32) -> Result<(), Error> {
        let cmd = psm::set_psm_command(tau_seconds, active_seconds)?;

        for extra in self.profile.psm_enable_prelude {
            self.command(extra)?;
        }
        self.command(&cmd)?;
        for extra in self.profile.psm_enable_extra {
            self.command(extra)?;
        }

        if let Some(reboot) = self.profile.psm_reboot {
            self.reboot(reboot)?;
            self.command(registration::READ_OPERATOR_COMMAND)?;
        }

        info!(
            "PSM is enabled with TAU: {} s and AT: {} s",
            tau_seconds,
            active_seconds
        );
        Ok(())
    }

    pub fn disable_psm(&mut self) -> Result<(), Error> {
        let options = SendOptions::terminated().with_delay(Duration::from_secs(2));
        self.command_with(psm::DISABLE_PSM_COMMAND, options)?;
        for extra in self.profile.psm_disable_extra {
            self.command(extra)?;
        }
        info!("PSM is disabled");
        Ok(())
    }

    pub fn edrx_info(&mut self) -> Result<EdrxSettings, Error> {
        let reply = self.command(edrx::READ_EDRX_COMMAND)?;
        Ok(EdrxSettings::parse(&reply)?)
    }

    /// Request eDRX with the cycle length bucket containing `cycle_seconds`.
    pub fn enable_edrx(&mut self, cycle_seconds: u32) -> Result<(), Error> {
        self.command(&edrx::set_edrx_command(cycle_seconds))?;
        info!("eDRX is enabled with cycle of {} s", cycle_seconds);
        Ok(())
    }

    pub fn disable_edrx(&mut self) -> Result<(), Error> {
        self.command(edrx::DISABLE_EDRX_COMMAND)?;
        info!("eDRX is disabled");
        Ok(())
    }

    /// Close the port, wait for the device node and open it again.
    pub fn reconnect(&mut self, timeout: Duration) -> Result<(), Error> {
        self.port.close();
        if !channel::discover(&mut self.port, &mut self.clock, timeout) {
            return Err(Error::DeviceNotFound);
        }
        self.port.open()?;
        info!("Port reopened");
        Ok(())
    }

    fn reboot(&mut self, command: &str) -> Result<(), Error> {
        self.send(command, &SendOptions::new())?;
        info!("Rebooting module");
        self.port.close();
        self.clock.sleep(module_timing::reboot_time());
        self.reconnect(module_timing::reboot_time())
    }

    /// Activate the packet data context and open a UDP socket on `local_port`
    /// whose datagrams the module pushes as receive URCs.
    ///
    /// An already active context or already open socket is reused.
    pub fn open_udp_listener(&mut self, local_port: u16) -> Result<(), Error> {
        let listener = self
            .profile
            .udp_listener
            .ok_or(Error::Generic(GenericError::Unsupported))?;

        if let Some(apn) = self.apn.clone() {
            self.command(&(listener.configure_context)(&apn))?;
        }

        if self.active_context(listener)?.is_none() {
            self.command(listener.activate_context)?;
            if self.active_context(listener)?.is_none() {
                error!("Packet data context did not come up");
                return Err(Error::UnexpectedResponse);
            }
        }

        // Fails harmlessly if the socket is already open; the state query decides
        let open = (listener.open_socket)(local_port);
        self.send(
            &open,
            &SendOptions::terminated().with_delay(Duration::from_secs(1)),
        )?;

        if !self.socket_listening(listener, Duration::from_ticks(0))?
            && !self.socket_listening(listener, Duration::from_secs(1))?
        {
            error!("UDP socket on port {} is not open", local_port);
            return Err(Error::UnexpectedResponse);
        }

        info!("Listening for datagrams on port {}", local_port);
        Ok(())
    }

    /// Local address of the active packet data context, if any.
    fn active_context(
        &mut self,
        listener: &UdpListenerProfile,
    ) -> Result<Option<IpAddr>, Error> {
        let reply = self.command(listener.context_query)?;
        let ip = response::values(&reply, listener.context_prefix)
            .get(listener.context_address_index)
            .and_then(|v| response::unquote(v).parse().ok());
        if ip.is_some() {
            debug!("Packet session active: {:?}", ip);
            self.ip = ip;
        }
        Ok(ip)
    }

    fn socket_listening(
        &mut self,
        listener: &UdpListenerProfile,
        delay: Duration,
    ) -> Result<bool, Error> {
        let options = SendOptions::terminated().with_delay(delay);
        let reply = self.send(listener.socket_query, &options)?;
        Ok(reply.contains(listener.socket_marker))
    }

    /// Extract the datagrams the module pushed in-band into `buf`.
    pub fn udp_frames(&self, buf: &UrcBuffer) -> Result<Vec<UdpDeliveryFrame>, Error> {
        let deframer = self
            .profile
            .deframer()
            .ok_or(Error::Generic(GenericError::Unsupported))?;
        Ok(deframer.deframe(buf)?.frames)
    }

    /// Wait up to `wait` for datagrams pushed by the module.
    ///
    /// The module must already have a listening UDP socket, see
    /// [`Session::open_udp_listener`].
    pub fn listen_once(&mut self, wait: Duration) -> Result<Vec<UdpDeliveryFrame>, Error> {
        if self.profile.recv_urc_header.is_none() {
            return Err(Error::Generic(GenericError::Unsupported));
        }
        let buf = self.await_event(wait, None, true)?;
        self.udp_frames(&buf)
    }

    /// Endless stream of shoulder-taps received on `local_port`, listening
    /// `wait` at a time.
    ///
    /// Opens the listening socket first. Fails up front if the vendor cannot
    /// push datagrams in-band or the socket cannot be opened.
    pub fn shoulder_taps(
        &mut self,
        local_port: u16,
        wait: Duration,
    ) -> Result<ShoulderTaps<'_, P, C>, Error> {
        if self.profile.recv_urc_header.is_none() {
            return Err(Error::Generic(GenericError::Unsupported));
        }

        let imsi = self.imsi().unwrap_or_else(|e| {
            warn!("IMSI not found, is the module powered up? {}", e);
            String::new()
        });
        self.open_udp_listener(local_port)?;

        Ok(ShoulderTaps {
            session: self,
            imsi,
            local_port,
            wait,
            pending: VecDeque::new(),
        })
    }
}

/// Iterator returned by [`Session::shoulder_taps`].
///
/// Never ends. Malformed frames and packets are logged and skipped. A lost
/// port is reopened, and the listening socket with it, before listening
/// again; failed attempts are retried once per discovery poll interval.
pub struct ShoulderTaps<'a, P, C> {
    session: &'a mut Session<P, C>,
    imsi: String,
    local_port: u16,
    wait: Duration,
    pending: VecDeque<ShoulderTap>,
}

impl<P, C> ShoulderTaps<'_, P, C>
where
    P: Port,
    C: Clock,
{
    pub fn imsi(&self) -> &str {
        &self.imsi
    }

    fn listen(&mut self) {
        if !self.session.port.is_open() {
            if let Err(e) = self.reopen() {
                warn!("Failed to reopen port: {}", e);
                self.session.clock.sleep(module_timing::discovery_poll());
                return;
            }
        }

        match self.session.listen_once(self.wait) {
            Ok(frames) => {
                for frame in frames {
                    debug!("Got payload: {:02x?}", frame.payload);
                    if let Some(tap) = parse_shoulder_tap(&frame.payload, &self.imsi) {
                        self.pending.push_back(tap);
                    }
                }
            }
            Err(e) => warn!("Failed to retrieve URCs: {}", e),
        }
    }

    fn reopen(&mut self) -> Result<(), Error> {
        self.session.reconnect(self.wait)?;
        self.session.open_udp_listener(self.local_port)
    }
}

impl<P, C> Iterator for ShoulderTaps<'_, P, C>
where
    P: Port,
    C: Clock,
{
    type Item = ShoulderTap;

    fn next(&mut self) -> Option<ShoulderTap> {
        loop {
            if let Some(tap) = self.pending.pop_front() {
                return Some(tap);
            }
            self.listen();
        }
    }
}
