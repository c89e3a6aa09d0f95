//! MAVLink telemetry link for a single flight controller.
//!
//! [`link::LinkController`] owns the transport, brings the link up by
//! waiting for a HEARTBEAT and subscribing to data streams, and answers
//! non-blocking "latest value" queries for attitude, position and
//! satellite count.

pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod settings;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::LinkSettings;
pub use error::{CodecError, LinkError, SettingsError};
pub use link::{LinkController, LinkState, RemoteSystem};
pub use telemetry::{Attitude, Position, SatelliteCount};
