// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Home Assistant discovery metadata
//!
//! One retained config message per published field, so the platform creates
//! its sensors without manual setup. Built from the finalized monitoring
//! items; has no influence on dispatch.

use serde::Serialize;

use crate::config::{BridgeConfig, DeviceInfo, Entry, MonitoringItem};
use crate::error::PublishError;
use crate::publish::Message;

/// Sensor device class, derived from the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Wh, kWh, MWh
    Energy,
    /// s
    Duration,
    /// W
    Power,
    /// A
    Current,
    /// V
    Voltage,
    /// °C
    Temperature,
    /// %
    Battery,
}

/// Sensor state class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Instantaneous reading
    Measurement,
    /// Monotonic counter
    TotalIncreasing,
}

/// Classify a unit
pub fn classify_unit(unit: &str) -> (Option<DeviceClass>, StateClass) {
    match unit {
        "Wh" | "kWh" | "MWh" => (Some(DeviceClass::Energy), StateClass::TotalIncreasing),
        "s" => (Some(DeviceClass::Duration), StateClass::Measurement),
        "W" => (Some(DeviceClass::Power), StateClass::Measurement),
        "A" => (Some(DeviceClass::Current), StateClass::Measurement),
        "V" => (Some(DeviceClass::Voltage), StateClass::Measurement),
        "°C" => (Some(DeviceClass::Temperature), StateClass::Measurement),
        "%" => (Some(DeviceClass::Battery), StateClass::Measurement),
        _ => (None, StateClass::Measurement),
    }
}

/// Device block of a discovery payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDevice {
    pub name: String,
    pub model: String,
    pub sw_version: String,
    pub manufacturer: String,
    pub identifiers: Vec<String>,
}

impl From<&DeviceInfo> for DiscoveryDevice {
    fn from(device: &DeviceInfo) -> Self {
        Self {
            name: device.name.clone(),
            model: device.model.clone(),
            sw_version: device.sw_version.clone(),
            manufacturer: device.manufacturer.clone(),
            identifiers: vec![device.unique_id.clone()],
        }
    }
}

/// Discovery payload of one sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorConfig {
    pub name: String,
    pub uniq_id: String,
    pub stat_t: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_cla: Option<DeviceClass>,
    pub stat_cla: StateClass,
    pub val_tpl: String,
    pub unit_of_meas: String,
    pub device: DiscoveryDevice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<String>,
}

impl SensorConfig {
    /// Describe one entry
    pub fn for_entry(entry: &Entry, config: &BridgeConfig) -> Self {
        let device = &config.device;
        let key = entry.key();
        let (dev_cla, stat_cla) = classify_unit(&entry.unit);

        Self {
            name: format!("{}.{}", device.name, key),
            uniq_id: format!("{}_{}", device.unique_id, key),
            stat_t: device.status_topic(),
            dev_cla,
            stat_cla,
            val_tpl: format!("{{{{ value_json.{} | is_defined }}}}", key),
            unit_of_meas: entry.unit.clone(),
            device: DiscoveryDevice::from(device),
            expire_after: config.expire_after.map(|s| s.to_string()),
        }
    }

    /// Topic this config is published to
    pub fn topic(&self, config: &BridgeConfig) -> String {
        format!(
            "{}{}/{}/config",
            config.discovery_prefix, config.device.name, self.uniq_id
        )
    }
}

/// Build the retained discovery messages for every entry of every item
pub fn discovery_messages(
    items: &[MonitoringItem],
    config: &BridgeConfig,
) -> Result<Vec<Message>, PublishError> {
    items
        .iter()
        .flat_map(|item| item.entries.iter())
        .map(|entry| -> Result<Message, PublishError> {
            let sensor = SensorConfig::for_entry(entry, config);
            let payload =
                serde_json::to_vec(&sensor).map_err(|e| PublishError::Encode(e.to_string()))?;
            Ok(Message {
                topic: sensor.topic(config),
                payload,
                retain: true,
            })
        })
        .collect()
}
