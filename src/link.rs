//! Lifecycle and polling for a single vehicle link.
//!
//! `connect` is the only call that blocks, and only for as long as the
//! heartbeat timeout. Every telemetry getter returns straight away with
//! either fresh data, the previously cached value, or nothing.

use mavlink::common::{
    HEARTBEAT_DATA, MavAutopilot, MavDataStream, MavMessage, MavModeFlag, MavState, MavType,
    REQUEST_DATA_STREAM_DATA,
};
use tracing::{debug, info, warn};

use crate::codec::{CodecStats, MavlinkCodec, MessageKind};
use crate::config::{LinkSettings, STREAM_RATE_HZ, SUBSCRIPTION_REPEATS};
use crate::error::LinkError;
use crate::telemetry::{Attitude, Position, SatelliteCount, TelemetryCache, TelemetryKind};
use crate::transport::{Connector, SystemConnector, Transport};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The vehicle on the other end, as identified by its first HEARTBEAT.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteSystem {
    pub system_id: u8,
    pub component_id: u8,
    pub vehicle_type: MavType,
    pub autopilot: MavAutopilot,
}

pub struct LinkController {
    connector: Box<dyn Connector>,
    state: LinkState,
    transport: Option<Box<dyn Transport>>,
    codec: MavlinkCodec,
    cache: TelemetryCache,
    remote: Option<RemoteSystem>,
    stream_rate_hz: u16,
}

impl Default for LinkController {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkController {
    pub fn new() -> Self {
        Self::with_connector(Box::new(SystemConnector))
    }

    pub fn with_connector(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            state: LinkState::Disconnected,
            transport: None,
            codec: MavlinkCodec::new(),
            cache: TelemetryCache::default(),
            remote: None,
            stream_rate_hz: STREAM_RATE_HZ,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn remote(&self) -> Option<RemoteSystem> {
        self.remote
    }

    pub fn stats(&self) -> CodecStats {
        self.codec.stats()
    }

    /// Open the transport, wait for a HEARTBEAT and subscribe to telemetry.
    ///
    /// Rejected with [`LinkError::AlreadyConnected`] unless the link is
    /// down. On any failure the transport is closed again and the state is
    /// back to `Disconnected`.
    pub fn connect(&mut self, settings: &LinkSettings) -> Result<RemoteSystem, LinkError> {
        if self.state != LinkState::Disconnected {
            return Err(LinkError::AlreadyConnected);
        }

        info!(address = %settings.address, baud = settings.baud, "opening link");
        let mut transport = self
            .connector
            .open(&settings.address, settings.baud)
            .map_err(|source| {
                warn!(address = %settings.address, error = %source, "failed to open link");
                LinkError::TransportOpen {
                    address: settings.address.clone(),
                    source,
                }
            })?;

        self.state = LinkState::Connecting;
        self.codec.reset();

        let announce = transport.speaks_first().then(ground_station_heartbeat);
        if announce.is_some() {
            debug!(address = %settings.address, "announcing ground station");
        }
        let waited = self.codec.wait_heartbeat(
            transport.as_mut(),
            settings.heartbeat_timeout,
            announce.as_ref(),
        );
        let (header, heartbeat) = match waited {
            Ok(Some(received)) => received,
            Ok(None) => {
                warn!(address = %settings.address, timeout = ?settings.heartbeat_timeout, "no heartbeat");
                self.abort_connect();
                return Err(LinkError::LivenessTimeout {
                    address: settings.address.clone(),
                    timeout: settings.heartbeat_timeout,
                });
            }
            Err(source) => {
                warn!(address = %settings.address, error = %source, "link failed while waiting for heartbeat");
                self.abort_connect();
                return Err(LinkError::Io {
                    address: settings.address.clone(),
                    source,
                });
            }
        };

        let remote = RemoteSystem {
            system_id: header.system_id,
            component_id: header.component_id,
            vehicle_type: heartbeat.mavtype,
            autopilot: heartbeat.autopilot,
        };
        info!(
            system_id = remote.system_id,
            component_id = remote.component_id,
            vehicle = ?remote.vehicle_type,
            "heartbeat received"
        );

        self.transport = Some(transport);
        self.remote = Some(remote);
        self.stream_rate_hz = settings.stream_rate_hz;
        self.state = LinkState::Connected;

        self.request_streams();
        Ok(remote)
    }

    fn abort_connect(&mut self) {
        // The transport is still owned by `connect` and is dropped there.
        self.codec.reset();
        self.state = LinkState::Disconnected;
    }

    /// Ask the vehicle to stream all telemetry at the configured rate.
    ///
    /// There is no acknowledgment for this request, so it goes out
    /// `SUBSCRIPTION_REPEATS` times back to back. Returns how many copies
    /// were written; failures are only logged.
    pub fn request_streams(&mut self) -> usize {
        let (Some(transport), Some(remote)) = (self.transport.as_mut(), self.remote) else {
            return 0;
        };

        let request = MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
            req_message_rate: self.stream_rate_hz,
            target_system: remote.system_id,
            target_component: remote.component_id,
            req_stream_id: MavDataStream::MAV_DATA_STREAM_ALL as u8,
            start_stop: 1,
        });

        let mut sent = 0;
        for attempt in 1..=SUBSCRIPTION_REPEATS {
            match self.codec.send(transport.as_mut(), &request) {
                Ok(()) => sent += 1,
                Err(e) => warn!(attempt, error = %e, "failed to send stream request"),
            }
        }
        debug!(sent, rate_hz = self.stream_rate_hz, "requested data streams");
        sent
    }

    /// Close the link and forget all telemetry. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let was_open = self.transport.take().is_some();

        self.codec.reset();
        self.cache.clear();
        self.remote = None;
        self.state = LinkState::Disconnected;

        if was_open {
            info!("link closed");
        }
    }

    pub fn get_attitude(&mut self) -> Option<Attitude> {
        if let Some(MavMessage::ATTITUDE(data)) = self.poll(TelemetryKind::Attitude) {
            self.cache.set_attitude(Attitude::from(&data));
        }
        self.cache.attitude()
    }

    pub fn get_position(&mut self) -> Option<Position> {
        if let Some(MavMessage::GLOBAL_POSITION_INT(data)) = self.poll(TelemetryKind::Position) {
            self.cache.set_position(Position::from(&data));
        }
        self.cache.position()
    }

    pub fn get_satellite_count(&mut self) -> SatelliteCount {
        if let Some(MavMessage::GPS_RAW_INT(data)) = self.poll(TelemetryKind::SatelliteCount) {
            self.cache.set_satellites(SatelliteCount::from(&data));
        }
        self.cache.satellites()
    }

    /// One non-blocking receive attempt. Read failures count as "nothing
    /// new" and never affect the link state.
    fn poll(&mut self, kind: TelemetryKind) -> Option<MavMessage> {
        if self.state != LinkState::Connected {
            return None;
        }
        let transport = self.transport.as_mut()?;

        match self.codec.try_receive(transport.as_mut(), message_kind(kind)) {
            Ok(message) => message,
            Err(e) => {
                debug!(?kind, error = %e, "telemetry read failed");
                None
            }
        }
    }
}

fn ground_station_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn message_kind(kind: TelemetryKind) -> MessageKind {
    match kind {
        TelemetryKind::Attitude => MessageKind::Attitude,
        TelemetryKind::Position => MessageKind::GlobalPosition,
        TelemetryKind::SatelliteCount => MessageKind::GpsRaw,
    }
}
