//! MAVLink framing on top of a non-blocking [`Transport`].
//!
//! Bytes are pulled from the transport in bounded chunks and cut into
//! complete v1/v2 frames, which the `mavlink` crate then validates and
//! parses. Frames that fail the CRC or carry an unknown id are skipped.
//! Decoded messages of the kinds the link cares about are parked in a
//! one-slot inbox per kind: a newer message replaces an undelivered older
//! one, so a reader always gets the freshest value.

use std::io::{self, Cursor};
use std::thread;
use std::time::{Duration, Instant};

use mavlink::common::{HEARTBEAT_DATA, MavMessage};
use mavlink::peek_reader::PeekReader;
use mavlink::{MavHeader, MavlinkVersion};

use crate::config::{
    GCS_COMPONENT_ID, GCS_HEARTBEAT_INTERVAL_MS, GCS_SYSTEM_ID, HEARTBEAT_POLL_INTERVAL_MS,
    MAX_READS_PER_PUMP, READ_CHUNK_SIZE, RX_BUFFER_LIMIT,
};
use crate::error::CodecError;
use crate::transport::Transport;

const MAV_STX_V1: u8 = 0xFE;
const MAV_STX_V2: u8 = 0xFD;
const V1_OVERHEAD: usize = 8;
const V2_OVERHEAD: usize = 12;
const V2_SIGNATURE_LEN: usize = 13;
const V2_FLAG_SIGNED: u8 = 0x01;
const MAX_FRAME_LEN: usize = V2_OVERHEAD + 255 + V2_SIGNATURE_LEN;

/// Message types the link keeps an inbox slot for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    Attitude,
    GlobalPosition,
    GpsRaw,
}

impl MessageKind {
    const COUNT: usize = 4;

    pub fn of(message: &MavMessage) -> Option<Self> {
        match message {
            MavMessage::HEARTBEAT(_) => Some(MessageKind::Heartbeat),
            MavMessage::ATTITUDE(_) => Some(MessageKind::Attitude),
            MavMessage::GLOBAL_POSITION_INT(_) => Some(MessageKind::GlobalPosition),
            MavMessage::GPS_RAW_INT(_) => Some(MessageKind::GpsRaw),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        match self {
            MessageKind::Heartbeat => 0,
            MessageKind::Attitude => 1,
            MessageKind::GlobalPosition => 2,
            MessageKind::GpsRaw => 3,
        }
    }
}

/// Counters for monitoring link quality. They saturate instead of
/// wrapping on very long sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Frames that passed CRC and parsed into a known message
    pub frames_decoded: u32,
    /// Candidate frames dropped (CRC failure, unknown message id)
    pub frames_rejected: u32,
    /// Bytes skipped while searching for a start-of-frame marker
    pub bytes_discarded: u32,
    /// Telemetry inbox entries overwritten before anyone read them.
    /// Heartbeats are not counted, nothing reads them once connected.
    pub superseded: u32,
}

pub struct MavlinkCodec {
    rx: Vec<u8>,
    chunk: Vec<u8>,
    inbox: [Option<(MavHeader, MavMessage)>; MessageKind::COUNT],
    sequence: u8,
    /// Protocol version of the last good frame; replies use the same one.
    version: MavlinkVersion,
    stats: CodecStats,
}

impl Default for MavlinkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MavlinkCodec {
    pub fn new() -> Self {
        Self {
            rx: Vec::with_capacity(READ_CHUNK_SIZE),
            chunk: vec![0u8; READ_CHUNK_SIZE],
            inbox: Default::default(),
            sequence: 0,
            version: MavlinkVersion::V2,
            stats: CodecStats::default(),
        }
    }

    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Forget everything from the previous session.
    pub fn reset(&mut self) {
        self.rx.clear();
        self.inbox = Default::default();
        self.sequence = 0;
        self.version = MavlinkVersion::V2;
        self.stats = CodecStats::default();
    }

    /// Non-blocking: pull pending bytes, then hand out the newest undelivered
    /// message of `kind`, if there is one.
    ///
    /// The pull is bounded by `MAX_READS_PER_PUMP` reads and by
    /// `RX_BUFFER_LIMIT`. Every complete frame in it is decoded, and frames
    /// of other kinds wait in their own slots for the next call. At most one
    /// message is returned per call.
    pub fn try_receive(
        &mut self,
        transport: &mut dyn Transport,
        kind: MessageKind,
    ) -> Result<Option<MavMessage>, CodecError> {
        Ok(self.receive(transport, kind)?.map(|(_, message)| message))
    }

    /// Block for up to `timeout` until a HEARTBEAT arrives.
    /// Returns `Ok(None)` when the deadline passes first.
    ///
    /// With `announce`, that message goes out right away and again every
    /// `GCS_HEARTBEAT_INTERVAL_MS` until the vehicle answers.
    pub fn wait_heartbeat(
        &mut self,
        transport: &mut dyn Transport,
        timeout: Duration,
        announce: Option<&MavMessage>,
    ) -> io::Result<Option<(MavHeader, HEARTBEAT_DATA)>> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut next_announce = start;

        loop {
            if let Some(message) = announce {
                if Instant::now() >= next_announce {
                    self.send(transport, message).map_err(|e| match e {
                        CodecError::Io(e) => e,
                        other => io::Error::other(other.to_string()),
                    })?;
                    next_announce += Duration::from_millis(GCS_HEARTBEAT_INTERVAL_MS);
                }
            }

            if let Some((header, MavMessage::HEARTBEAT(data))) =
                self.receive(transport, MessageKind::Heartbeat)?
            {
                return Ok(Some((header, data)));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let nap = Duration::from_millis(HEARTBEAT_POLL_INTERVAL_MS).min(deadline - now);
            thread::sleep(nap);
        }
    }

    /// Encode `message` as a ground-station frame and write it out.
    pub fn send(
        &mut self,
        transport: &mut dyn Transport,
        message: &MavMessage,
    ) -> Result<(), CodecError> {
        let header = MavHeader {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let mut frame = Vec::with_capacity(MAX_FRAME_LEN);
        mavlink::write_versioned_msg(&mut frame, self.version, header, message)
            .map_err(|e| CodecError::Encode(format!("{e:?}")))?;

        transport.write_all(&frame)?;
        Ok(())
    }

    fn receive(
        &mut self,
        transport: &mut dyn Transport,
        kind: MessageKind,
    ) -> io::Result<Option<(MavHeader, MavMessage)>> {
        let filled = self.fill(transport);
        self.decode_buffered();
        filled?;
        Ok(self.inbox[kind.slot()].take())
    }

    fn fill(&mut self, transport: &mut dyn Transport) -> io::Result<()> {
        for _ in 0..MAX_READS_PER_PUMP {
            let room = RX_BUFFER_LIMIT.saturating_sub(self.rx.len());
            if room == 0 {
                break;
            }

            let len = room.min(self.chunk.len());
            let n = transport.read_available(&mut self.chunk[..len])?;
            if n == 0 {
                break;
            }
            self.rx.extend_from_slice(&self.chunk[..n]);
        }
        Ok(())
    }

    fn decode_buffered(&mut self) {
        let mut start = 0;

        while start < self.rx.len() {
            let Some(offset) = self.rx[start..]
                .iter()
                .position(|b| *b == MAV_STX_V1 || *b == MAV_STX_V2)
            else {
                let skipped = (self.rx.len() - start) as u32;
                self.stats.bytes_discarded = self.stats.bytes_discarded.saturating_add(skipped);
                start = self.rx.len();
                break;
            };
            self.stats.bytes_discarded = self.stats.bytes_discarded.saturating_add(offset as u32);
            start += offset;

            let Some(frame_len) = frame_len(&self.rx[start..]) else {
                break;
            };
            if self.rx.len() - start < frame_len {
                break;
            }

            match decode_frame(&self.rx[start..start + frame_len]) {
                Some((header, message)) => {
                    self.stats.frames_decoded = self.stats.frames_decoded.saturating_add(1);
                    self.version = if self.rx[start] == MAV_STX_V1 {
                        MavlinkVersion::V1
                    } else {
                        MavlinkVersion::V2
                    };
                    self.park(header, message);
                    start += frame_len;
                }
                None => {
                    // Not a real frame start, resync on the next byte
                    self.stats.frames_rejected = self.stats.frames_rejected.saturating_add(1);
                    start += 1;
                }
            }
        }

        self.rx.drain(..start);
    }

    fn park(&mut self, header: MavHeader, message: MavMessage) {
        let Some(kind) = MessageKind::of(&message) else {
            return;
        };
        let replaced = self.inbox[kind.slot()].replace((header, message)).is_some();
        if replaced && kind != MessageKind::Heartbeat {
            self.stats.superseded = self.stats.superseded.saturating_add(1);
        }
    }
}

/// Total length of the frame starting at `buf[0]`, once enough of the
/// header is present to tell.
fn frame_len(buf: &[u8]) -> Option<usize> {
    match buf.first()? {
        &MAV_STX_V1 => Some(V1_OVERHEAD + *buf.get(1)? as usize),
        &MAV_STX_V2 => {
            let payload = *buf.get(1)? as usize;
            let incompat_flags = *buf.get(2)?;
            let signature = if incompat_flags & V2_FLAG_SIGNED != 0 {
                V2_SIGNATURE_LEN
            } else {
                0
            };
            Some(V2_OVERHEAD + payload + signature)
        }
        _ => None,
    }
}

fn decode_frame(frame: &[u8]) -> Option<(MavHeader, MavMessage)> {
    let mut reader = PeekReader::new(Cursor::new(frame));
    let decoded = if frame[0] == MAV_STX_V1 {
        mavlink::read_v1_msg::<MavMessage, _>(&mut reader)
    } else {
        mavlink::read_v2_msg::<MavMessage, _>(&mut reader)
    };
    decoded.ok()
}
