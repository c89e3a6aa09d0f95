//! Scripted transport and frame builders shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};

use mavlink::common::{
    ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, GpsFixType, HEARTBEAT_DATA,
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType,
};
use mavlink::MavHeader;
use mavlink::peek_reader::PeekReader;

use crate::transport::{Connector, Transport};

pub type SharedLink = Arc<Mutex<MockLink>>;

/// What the fake vehicle end of the wire looks like.
#[derive(Debug, Default)]
pub struct MockLink {
    incoming: VecDeque<Vec<u8>>,
    /// Every frame the link under test wrote, in order
    pub written: Vec<Vec<u8>>,
    /// Fails the next read once the scripted bytes are used up
    pub read_error: Option<io::ErrorKind>,
    pub fail_writes: bool,
    /// The vehicle stays quiet until the link writes something
    pub speaks_first: bool,
    pub opened: usize,
    pub closed: usize,
}

impl MockLink {
    pub fn shared() -> SharedLink {
        Arc::new(Mutex::new(MockLink::default()))
    }

    pub fn push_incoming(&mut self, bytes: Vec<u8>) {
        self.incoming.push_back(bytes);
    }
}

pub struct MockTransport {
    link: SharedLink,
}

impl MockTransport {
    pub fn new(link: SharedLink) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &SharedLink {
        &self.link
    }
}

impl Transport for MockTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut link = self.link.lock().unwrap();
        let Some(mut chunk) = link.incoming.pop_front() else {
            return match link.read_error.take() {
                Some(kind) => Err(io::Error::new(kind, "scripted read failure")),
                None => Ok(0),
            };
        };

        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            link.incoming.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut link = self.link.lock().unwrap();
        if link.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        link.written.push(bytes.to_vec());
        Ok(())
    }

    fn speaks_first(&self) -> bool {
        self.link.lock().unwrap().speaks_first
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Ok(mut link) = self.link.lock() {
            link.closed += 1;
        }
    }
}

pub struct MockConnector {
    link: SharedLink,
    fail_open: Option<io::ErrorKind>,
}

impl MockConnector {
    pub fn new(link: SharedLink) -> Self {
        Self {
            link,
            fail_open: None,
        }
    }

    pub fn failing(link: SharedLink, kind: io::ErrorKind) -> Self {
        Self {
            link,
            fail_open: Some(kind),
        }
    }
}

impl Connector for MockConnector {
    fn open(&self, address: &str, _baud: u32) -> io::Result<Box<dyn Transport>> {
        if let Some(kind) = self.fail_open {
            return Err(io::Error::new(kind, format!("cannot open {address}")));
        }
        self.link.lock().unwrap().opened += 1;
        Ok(Box::new(MockTransport::new(Arc::clone(&self.link))))
    }
}

/// MAVLink v2 frame as sent by autopilot 1/1.
pub fn frame(message: &MavMessage) -> Vec<u8> {
    frame_from(1, 1, message)
}

pub fn frame_from(system_id: u8, component_id: u8, message: &MavMessage) -> Vec<u8> {
    let header = MavHeader {
        system_id,
        component_id,
        sequence: 0,
    };
    let mut buf = Vec::new();
    mavlink::write_v2_msg(&mut buf, header, message).unwrap();
    buf
}

pub fn frame_v1(message: &MavMessage) -> Vec<u8> {
    let header = MavHeader {
        system_id: 1,
        component_id: 1,
        sequence: 0,
    };
    let mut buf = Vec::new();
    mavlink::write_v1_msg(&mut buf, header, message).unwrap();
    buf
}

pub fn decode(bytes: &[u8]) -> (MavHeader, MavMessage) {
    let mut reader = PeekReader::new(Cursor::new(bytes));
    if bytes[0] == 0xFE {
        mavlink::read_v1_msg::<MavMessage, _>(&mut reader).unwrap()
    } else {
        mavlink::read_v2_msg::<MavMessage, _>(&mut reader).unwrap()
    }
}

pub fn heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_STANDBY,
        mavlink_version: 3,
    })
}

pub fn attitude(roll: f32, pitch: f32, yaw: f32) -> MavMessage {
    MavMessage::ATTITUDE(ATTITUDE_DATA {
        time_boot_ms: 0,
        roll,
        pitch,
        yaw,
        rollspeed: 0.0,
        pitchspeed: 0.0,
        yawspeed: 0.0,
    })
}

pub fn global_position(lat: i32, lon: i32, alt: i32) -> MavMessage {
    MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
        time_boot_ms: 0,
        lat,
        lon,
        alt,
        relative_alt: 0,
        vx: 0,
        vy: 0,
        vz: 0,
        hdg: 0,
    })
}

pub fn gps_raw(satellites_visible: u8) -> MavMessage {
    MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
        time_usec: 0,
        lat: 0,
        lon: 0,
        alt: 0,
        eph: u16::MAX,
        epv: u16::MAX,
        vel: 0,
        cog: 0,
        fix_type: GpsFixType::GPS_FIX_TYPE_3D_FIX,
        satellites_visible,
        alt_ellipsoid: 0,
        h_acc: 0,
        v_acc: 0,
        vel_acc: 0,
        hdg_acc: 0,
        yaw: 0,
    })
}
