// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the bridge
//!
//! Two layers:
//! - the monitoring table ([`Batch`]/[`BatchEntry`]), read from JSON and
//!   flattened into immutable [`MonitoringItem`]s at startup
//! - runtime settings ([`BridgeConfig`], [`DeviceInfo`])

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::protocol::{Member, ROOT_PATH};
use crate::transform::{normalize_name, Direction};

/// Update strategy value selecting batched `ItemsChanged` updates
pub const BATCH_STRATEGY: &str = "batch";

/// One field as declared in the monitoring table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchEntry {
    /// Expected wire encoding (informational)
    #[serde(default)]
    pub data_type: String,
    /// Human field name
    pub name: String,
    /// Object path (or sub-path for batched sources)
    pub dbus_path: String,
    /// Physical unit
    #[serde(default)]
    pub unit: String,
    /// `in`, `out` or empty
    #[serde(default)]
    pub direction: String,
}

/// One source service as declared in the monitoring table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Batch {
    /// Well-known bus name of the source
    pub dbus_name: String,
    /// `batch` for `ItemsChanged`, anything else for `PropertiesChanged`
    #[serde(default)]
    pub update_strategy: String,
    /// Declared fields
    #[serde(default)]
    pub entries: Vec<BatchEntry>,
}

impl Batch {
    /// Whether this source publishes batched updates
    pub fn is_batched(&self) -> bool {
        self.update_strategy == BATCH_STRATEGY
    }
}

/// One scalar field of a monitoring item
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Human field name
    pub name: String,
    /// Object path or batch sub-path
    pub path: String,
    /// Physical unit
    pub unit: String,
    /// Transform selector
    pub direction: Direction,
    /// Expected wire encoding (not authoritative)
    pub data_type: String,
}

impl Entry {
    /// Payload key of this entry
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

impl From<&BatchEntry> for Entry {
    fn from(entry: &BatchEntry) -> Self {
        Self {
            name: entry.name.clone(),
            path: entry.dbus_path.clone(),
            unit: entry.unit.clone(),
            direction: Direction::from_config(&entry.direction),
            data_type: entry.data_type.clone(),
        }
    }
}

/// One subscription target
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringItem {
    /// Well-known name or connection id of the source
    pub bus_name: String,
    /// Signal member
    pub member: Member,
    /// Addressed object
    pub object_path: String,
    /// Fields published from this item, never empty
    pub entries: Vec<Entry>,
}

impl MonitoringItem {
    /// Identifying triple `(bus_name, object_path, member)`
    pub fn key(&self) -> (&str, &str, Member) {
        (&self.bus_name, &self.object_path, self.member)
    }
}

/// Read the monitoring table from a JSON file
pub fn load_batches(path: impl AsRef<Path>) -> Result<Vec<Batch>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_batches(&raw)
}

/// Parse the monitoring table from JSON text
pub fn parse_batches(raw: &str) -> Result<Vec<Batch>> {
    let batches: Vec<Batch> =
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(batches)
}

/// Flatten source batches into monitoring items
///
/// Batched sources collapse into one `ItemsChanged` item on the root path.
/// Other sources get one `PropertiesChanged` item per object path. Entries
/// that land on an existing `(bus_name, object_path, member)` are appended to
/// that item, in declaration order.
pub fn extract_monitoring_items(batches: &[Batch]) -> Result<Vec<MonitoringItem>> {
    let mut items: Vec<MonitoringItem> = Vec::new();

    for (index, batch) in batches.iter().enumerate() {
        validate_batch(index, batch)?;

        let member = if batch.is_batched() {
            Member::ItemsChanged
        } else {
            Member::PropertiesChanged
        };

        for raw in &batch.entries {
            let object_path = match member {
                Member::ItemsChanged => ROOT_PATH,
                Member::PropertiesChanged => raw.dbus_path.as_str(),
            };
            let entry = Entry::from(raw);

            match items
                .iter_mut()
                .find(|i| i.key() == (batch.dbus_name.as_str(), object_path, member))
            {
                Some(item) => item.entries.push(entry),
                None => items.push(MonitoringItem {
                    bus_name: batch.dbus_name.clone(),
                    member,
                    object_path: object_path.to_string(),
                    entries: vec![entry],
                }),
            }
        }
    }

    debug!(
        "Config: {} sources -> {} monitoring items",
        batches.len(),
        items.len()
    );
    Ok(items)
}

fn validate_batch(index: usize, batch: &Batch) -> Result<()> {
    if batch.dbus_name.trim().is_empty() {
        return Err(ConfigError::MissingBusName { index }.into());
    }
    if batch.entries.is_empty() {
        return Err(ConfigError::EmptyEntries {
            bus_name: batch.dbus_name.clone(),
        }
        .into());
    }
    if let Some(entry) = batch.entries.iter().find(|e| e.dbus_path.is_empty()) {
        return Err(ConfigError::MissingPath {
            bus_name: batch.dbus_name.clone(),
            name: entry.name.clone(),
        }
        .into());
    }
    Ok(())
}

/// Identity of the device advertised to the home-automation platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name, also the first status topic segment
    pub name: String,
    /// Model string
    pub model: String,
    /// Software version string
    pub sw_version: String,
    /// Manufacturer string
    pub manufacturer: String,
    /// Unique id, also the second status topic segment
    pub unique_id: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "jkbms".to_string(),
            model: "diy-batterie".to_string(),
            sw_version: "v0.1".to_string(),
            manufacturer: "DIY".to_string(),
            unique_id: "batt1".to_string(),
        }
    }
}

impl DeviceInfo {
    /// Topic readings are published to
    pub fn status_topic(&self) -> String {
        format!("{}/{}", self.name, self.unique_id)
    }
}

/// Bridge-level runtime configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Depth of the dispatch queue (default: 10)
    pub queue_capacity: usize,

    /// Liveness window (default: 10s)
    pub watchdog_window: Duration,

    /// Advertised device
    pub device: DeviceInfo,

    /// Discovery topic prefix
    pub discovery_prefix: String,

    /// `expire_after` advertised in discovery metadata, in seconds
    pub expire_after: Option<u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            watchdog_window: Duration::from_secs(10),
            device: DeviceInfo::default(),
            discovery_prefix: "homeassistant/sensor/".to_string(),
            expire_after: None,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with a custom liveness window
    pub fn with_watchdog_window(window: Duration) -> Self {
        Self {
            watchdog_window: window,
            ..Default::default()
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "queue_capacity",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.watchdog_window.is_zero() {
            return Err(ConfigError::InvalidSetting {
                field: "watchdog_window",
                reason: "must be longer than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
