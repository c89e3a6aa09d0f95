//! Error types for the link and its collaborators.
//!
//! Only lifecycle failures reach the caller as errors. Anything that goes
//! wrong while polling telemetry is absorbed by the controller and shows up
//! as stale or absent values instead.

use std::io;
use std::time::Duration;

/// Failures returned by [`LinkController::connect`](crate::link::LinkController::connect).
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// `connect` was called while a link is already up.
    #[error("link is already connected")]
    AlreadyConnected,

    /// The device or address could not be opened.
    #[error("failed to open '{address}': {source}")]
    TransportOpen {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The transport opened but no HEARTBEAT arrived in time.
    #[error("no heartbeat from '{address}' within {timeout:?}")]
    LivenessTimeout { address: String, timeout: Duration },

    /// The transport failed while waiting for the first HEARTBEAT.
    #[error("I/O error on '{address}' while waiting for heartbeat: {source}")]
    Io {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Failures of the MAVLink codec layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Failures loading or storing persisted link settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
