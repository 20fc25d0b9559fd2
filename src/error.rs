// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the bridge
//!
//! Only startup failures are fatal. Everything that can go wrong while the
//! dispatch loop runs is logged and counted instead of returned.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for bridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bus error
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Errors while loading or validating the monitoring table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    /// Config file is not valid JSON for the expected schema
    #[error("Invalid monitoring table: {0}")]
    Parse(String),

    /// A source batch declares no entries
    #[error("Source {bus_name} has no entries")]
    EmptyEntries { bus_name: String },

    /// A source batch has no bus name
    #[error("Source #{index} has an empty bus name")]
    MissingBusName { index: usize },

    /// An entry has no object path
    #[error("Entry {name} of {bus_name} has an empty object path")]
    MissingPath { bus_name: String, name: String },

    /// Runtime setting out of range
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Errors talking to the local system bus
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    /// Directory service could not resolve a well-known name
    #[error("Cannot resolve owner of {name}: {reason}")]
    NameOwner { name: String, reason: String },

    /// Signal match rule was rejected
    #[error("Cannot register match rule {rule}: {reason}")]
    AddMatch { rule: String, reason: String },

    /// Connection to the bus failed or was lost
    #[error("Bus connection failed: {0}")]
    Connection(String),
}

/// Errors handing readings to the broker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    /// Payload could not be serialized
    #[error("Cannot encode payload: {0}")]
    Encode(String),

    /// Broker client refused the message
    #[error("Broker rejected publish to {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    /// Broker client is gone
    #[error("Broker client disconnected")]
    Disconnected,
}
