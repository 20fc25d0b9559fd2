// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Daemon error type

use std::time::Duration;

use thiserror::Error;
use venus_bridge::BridgeError;

/// Fatal errors of the service
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Engine error (configuration, bus, publish)
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Broker connection failed or was refused
    #[error("MQTT: {0}")]
    Mqtt(String),

    /// `--server` is not `host:port`
    #[error("Invalid server address '{0}', expected host:port")]
    Server(String),

    /// Thread or runtime failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Watchdog fired
    #[error("No successful publish for {0:?}, stopping for restart")]
    Stalled(Duration),
}
