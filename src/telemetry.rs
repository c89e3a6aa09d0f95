use chrono::{DateTime, Local};
use mavlink::common::{ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA};
use std::f64::consts::PI;
use std::fmt;

const DEGREES_PER_RADIAN: f64 = 180.0 / PI;
const DEGE7_TO_DEGREES: f64 = 1e-7;
const MM_TO_METERS: f64 = 1e-3;
/// GPS_RAW_INT uses UINT8_MAX for "satellite count unknown"
const SATELLITES_UNKNOWN: u8 = u8::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryKind {
    Attitude,
    Position,
    SatelliteCount,
}

/// Vehicle attitude in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub received_at: DateTime<Local>,
}

impl From<&ATTITUDE_DATA> for Attitude {
    fn from(data: &ATTITUDE_DATA) -> Self {
        Self {
            roll: f64::from(data.roll) * DEGREES_PER_RADIAN,
            pitch: f64::from(data.pitch) * DEGREES_PER_RADIAN,
            yaw: f64::from(data.yaw) * DEGREES_PER_RADIAN,
            received_at: Local::now(),
        }
    }
}

/// Fused global position: decimal degrees and meters above MSL.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub received_at: DateTime<Local>,
}

impl Position {
    /// Map link centred on this position.
    pub fn map_url(&self, zoom: u8) -> String {
        format!(
            "https://www.google.com/maps/@{:.7},{:.7},{}z",
            self.latitude, self.longitude, zoom
        )
    }
}

impl From<&GLOBAL_POSITION_INT_DATA> for Position {
    fn from(data: &GLOBAL_POSITION_INT_DATA) -> Self {
        Self {
            latitude: f64::from(data.lat) * DEGE7_TO_DEGREES,
            longitude: f64::from(data.lon) * DEGE7_TO_DEGREES,
            altitude: f64::from(data.alt) * MM_TO_METERS,
            received_at: Local::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SatelliteCount {
    #[default]
    Unknown,
    Visible(u8),
}

impl SatelliteCount {
    pub fn count(self) -> Option<u8> {
        match self {
            SatelliteCount::Unknown => None,
            SatelliteCount::Visible(n) => Some(n),
        }
    }
}

impl From<&GPS_RAW_INT_DATA> for SatelliteCount {
    fn from(data: &GPS_RAW_INT_DATA) -> Self {
        match data.satellites_visible {
            SATELLITES_UNKNOWN => SatelliteCount::Unknown,
            n => SatelliteCount::Visible(n),
        }
    }
}

impl fmt::Display for SatelliteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SatelliteCount::Unknown => f.write_str("unknown"),
            SatelliteCount::Visible(n) => write!(f, "{n}"),
        }
    }
}

/// Last decoded value of each telemetry kind. No history is kept.
#[derive(Debug, Default)]
pub struct TelemetryCache {
    attitude: Option<Attitude>,
    position: Option<Position>,
    satellites: SatelliteCount,
}

impl TelemetryCache {
    pub fn attitude(&self) -> Option<Attitude> {
        self.attitude.clone()
    }

    pub fn position(&self) -> Option<Position> {
        self.position.clone()
    }

    pub fn satellites(&self) -> SatelliteCount {
        self.satellites
    }

    pub fn set_attitude(&mut self, attitude: Attitude) {
        self.attitude = Some(attitude);
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub fn set_satellites(&mut self, satellites: SatelliteCount) {
        self.satellites = satellites;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.attitude.is_none()
            && self.position.is_none()
            && self.satellites == SatelliteCount::Unknown
    }
}
