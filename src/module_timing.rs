use embassy_time::Duration;

/// Per-read timeout of the serial port
pub fn read_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Polling interval while waiting for the first byte of a reply
pub fn first_byte_poll() -> Duration {
    Duration::from_millis(5)
}

/// Default time to wait for the first byte of a reply
pub fn reply_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Polling interval of the URC wait loop
pub fn urc_poll() -> Duration {
    Duration::from_millis(500)
}

/// Settle time before and after writing raw bytes following a command
pub fn payload_settle() -> Duration {
    Duration::from_secs(1)
}

/// Polling interval while waiting for the device node to reappear
pub fn discovery_poll() -> Duration {
    Duration::from_secs(1)
}

/// Default overall deadline when waiting for a final result code
pub fn terminal_deadline() -> Duration {
    Duration::from_secs(10)
}

/// Time for the module to come back after a reboot it triggers itself
pub fn reboot_time() -> Duration {
    Duration::from_secs(20)
}
