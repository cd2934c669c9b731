//! Host-side driver for Quectel, Telit and u-blox cellular modules attached
//! over a serial AT interface.
//!
//! The building blocks are usable on their own: [`transport::Transport`] for
//! command/response exchanges, [`waiter::UrcWaiter`] for unsolicited result
//! codes, [`urc::UrcDeframer`] for datagrams delivered in-band,
//! [`shoulder_tap`] for wake packets and [`timer`] / [`edrx`] for the 3GPP
//! power saving encodings. [`session::Session`] ties them together for one
//! module.

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod channel;
pub mod clock;
pub mod config;
pub mod edrx;
pub mod error;
mod hex;
mod module_timing;
pub mod psm;
pub mod registration;
pub mod response;
pub mod session;
pub mod shoulder_tap;
pub mod timer;
pub mod transport;
pub mod urc;
pub mod waiter;

#[cfg(test)]
mod test_helpers;

pub use channel::{Port, SerialChannel};
pub use clock::{Clock, SystemClock};
pub use config::{SerialConfig, Vendor};
pub use error::{Error, GenericError};
pub use session::{Modem, Session};
pub use shoulder_tap::{parse_shoulder_tap, ShoulderTap};
pub use transport::{SendOptions, Transport};
pub use urc::{UdpDeliveryFrame, UrcDeframer};
pub use waiter::{UrcBuffer, UrcWaiter};
