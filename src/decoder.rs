// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Decode & transform
//!
//! Turns one [`RawSignal`] into the flat field map that gets published:
//!
//! - `PropertiesChanged`: one scalar (`d` or `i`) fanned out to every entry
//!   of the item, each through its direction transform
//! - `ItemsChanged`: one value (`n` or `i`) per sub-path that has an entry
//!
//! Nothing in here is an error. Irrelevant traffic, unknown tags and empty
//! results are reported as [`Decoded`] variants so the dispatch loop can
//! count them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::MonitoringItem;
use crate::context::BridgeContext;
use crate::error::PublishError;
use crate::protocol::{Member, RawSignal, SignalBody, Variant, VariantMap, VALUE_KEY};

/// One published value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integer read from an integer tag of a batched update
    Integer(i64),
    /// Float after the direction transform
    Float(f64),
}

impl FieldValue {
    /// Value as a float
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Integer(v) => *v as f64,
            FieldValue::Float(v) => *v,
        }
    }
}

/// Normalized field name -> value, as published
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Readings(BTreeMap<String, FieldValue>);

impl Readings {
    /// Create an empty set of readings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<FieldValue> {
        self.0.get(key).copied()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there is nothing to publish
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// JSON payload
    pub fn to_json(&self) -> Result<Vec<u8>, PublishError> {
        serde_json::to_vec(self).map_err(|e| PublishError::Encode(e.to_string()))
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for Readings {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Why a signal produced nothing to publish
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    /// Body shape does not fit the member
    UnsupportedBody,
    /// Single-value update without a `Value` key
    MissingValue,
    /// Tag the member does not publish
    UnrecognizedTag(String),
    /// Batched update with no sub-path matching an entry
    Empty,
}

/// Result of decoding one signal
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// No monitoring item matches the signal
    Unmatched,
    /// Matched, but nothing to publish
    Skipped(Skip),
    /// Fields to publish, never empty
    Readings(Readings),
}

/// Decoder for bus signals
#[derive(Debug, Clone)]
pub struct Decoder {
    context: Arc<BridgeContext>,
}

impl Decoder {
    /// Create a decoder over a shared context
    pub fn new(context: Arc<BridgeContext>) -> Self {
        Self { context }
    }

    /// The shared context
    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Decode a signal
    pub fn decode(&self, signal: &RawSignal) -> Decoded {
        let Some(item) = self
            .context
            .find_item(&signal.sender, &signal.path, signal.member)
        else {
            debug!(
                "DBUS: no monitoring item for {} {} {}",
                signal.sender, signal.path, signal.member
            );
            return Decoded::Unmatched;
        };

        let result = match (item.member, &signal.body) {
            (Member::PropertiesChanged, SignalBody::Properties(props)) => {
                decode_properties(item, props)
            }
            (Member::ItemsChanged, SignalBody::Items(items)) => decode_items(item, items),
            _ => Err(Skip::UnsupportedBody),
        };

        match result {
            Ok(readings) => Decoded::Readings(readings),
            Err(skip) => {
                debug!("DBUS: {} {} skipped: {:?}", item.bus_name, signal.path, skip);
                Decoded::Skipped(skip)
            }
        }
    }
}

fn decode_properties(item: &MonitoringItem, props: &VariantMap) -> Result<Readings, Skip> {
    let value = props.get(VALUE_KEY).ok_or(Skip::MissingValue)?;
    let scalar = match value {
        Variant::Double(v) => *v,
        Variant::Int32(v) => f64::from(*v),
        other => return Err(Skip::UnrecognizedTag(other.signature().to_string())),
    };
    debug!("DBUS: Value: {} = {}", item.object_path, scalar);

    Ok(item
        .entries
        .iter()
        .map(|entry| (entry.key(), FieldValue::Float(entry.direction.apply(scalar))))
        .collect())
}

fn decode_items(
    item: &MonitoringItem,
    items: &BTreeMap<String, VariantMap>,
) -> Result<Readings, Skip> {
    let mut readings = Readings::new();

    for (sub_path, props) in items {
        let Some(entry) = item.entries.iter().find(|e| &e.path == sub_path) else {
            continue;
        };
        let value = match props.get(VALUE_KEY) {
            Some(Variant::Int16(v)) => i64::from(*v),
            Some(Variant::Int32(v)) => i64::from(*v),
            Some(other) => {
                debug!("DBUS: {} has unrecognized tag {}", sub_path, other.signature());
                continue;
            }
            None => continue,
        };
        readings.insert(entry.key(), FieldValue::Integer(value));
    }

    if readings.is_empty() {
        return Err(Skip::Empty);
    }
    Ok(readings)
}
