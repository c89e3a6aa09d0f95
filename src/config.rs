use std::time::Duration;

// Serial port configuration
pub const BAUD_RATE: u32 = 115_200;
pub const SERIAL_TIMEOUT_MS: u64 = 10;

// Link lifecycle
pub const HEARTBEAT_TIMEOUT_MS: u64 = 5_000;
pub const HEARTBEAT_POLL_INTERVAL_MS: u64 = 10;
/// How often the ground station announces itself while waiting on a
/// link that has to speak first.
pub const GCS_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

// Stream subscription
pub const STREAM_RATE_HZ: u16 = 4;
pub const SUBSCRIPTION_REPEATS: usize = 3;

// Identity used for outgoing frames (ground station)
pub const GCS_SYSTEM_ID: u8 = 255;
pub const GCS_COMPONENT_ID: u8 = 0;

// Read path limits
pub const READ_CHUNK_SIZE: usize = 4096;
pub const MAX_READS_PER_PUMP: usize = 8;
pub const RX_BUFFER_LIMIT: usize = 16 * 1024;

// Presentation
pub const POLL_INTERVAL_MS: u64 = 1_000;
pub const MAP_ZOOM: u8 = 15;

/// Everything `LinkController::connect` needs to bring a link up.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    /// Serial device (`COM4`, `/dev/ttyACM0`, `serial:...`) or a
    /// `tcp:`/`udpin:`/`udpout:` network address.
    pub address: String,
    pub baud: u32,
    pub heartbeat_timeout: Duration,
    pub stream_rate_hz: u16,
}

impl LinkSettings {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            baud: BAUD_RATE,
            heartbeat_timeout: Duration::from_millis(HEARTBEAT_TIMEOUT_MS),
            stream_rate_hz: STREAM_RATE_HZ,
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::new(default_port())
    }
}

/// First serial port the OS reports, or a platform-typical fallback.
pub fn default_port() -> String {
    let available = serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect::<Vec<_>>())
        .unwrap_or_default();

    available.into_iter().next().unwrap_or_else(|| {
        if cfg!(windows) {
            "COM4".to_string()
        } else {
            "/dev/ttyACM0".to_string()
        }
    })
}
