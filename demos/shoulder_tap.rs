//! Print shoulder-taps pushed to a Quectel module.
//!
//! ```text
//! cargo run --example shoulder_tap -- /dev/ttyUSB2 lpiot.aer.net
//! ```

use cellular_at::shoulder_tap::DEFAULT_PORT;
use cellular_at::{Session, SerialChannel, SerialConfig, SystemClock, Vendor};
use embassy_time::Duration;

fn main() -> Result<(), cellular_at::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/dev/ttyUSB2".into());
    let apn = args.next().unwrap_or_else(|| "lpiot.aer.net".into());

    let channel = SerialChannel::open_with(SerialConfig::new(path))?;
    let mut session = Session::new(channel, SystemClock, Vendor::Quectel).with_apn(apn);
    session.init()?;

    let info = session.network_info()?;
    log::info!("Registration: {}, RSSI: {:?} dBm", info.status, info.rssi_dbm);

    for tap in session.shoulder_taps(DEFAULT_PORT, Duration::from_secs(30))? {
        log::info!(
            "Shoulder-tap {} with {} byte payload",
            tap.request_id(),
            tap.payload().map_or(0, <[u8]>::len)
        );
    }
    Ok(())
}
