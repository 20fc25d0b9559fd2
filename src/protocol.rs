// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Protocol definitions for the bridge
//!
//! This module defines the wire-facing types the engine works on:
//! - Signal members the bridge subscribes to
//! - The closed set of variant values it knows how to decode
//! - Raw signal events as delivered by the bus adapter
//! - Signal match rules handed to the bus

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key holding the payload inside a variant dictionary
pub const VALUE_KEY: &str = "Value";

/// Object path used by sources publishing batched updates
pub const ROOT_PATH: &str = "/";

/// Signal member the bridge subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Member {
    /// Single-value update of one object path
    #[default]
    PropertiesChanged,
    /// Batched multi-field update emitted at the service root
    ItemsChanged,
}

impl Member {
    /// Member name as it appears on the bus
    pub fn as_str(&self) -> &'static str {
        match self {
            Member::PropertiesChanged => "PropertiesChanged",
            Member::ItemsChanged => "ItemsChanged",
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Member {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PropertiesChanged" => Ok(Member::PropertiesChanged),
            "ItemsChanged" => Ok(Member::ItemsChanged),
            other => Err(format!("unsupported member: {}", other)),
        }
    }
}

/// A self-describing wire value
///
/// Only the tags the engine can publish get their own arm. Everything else
/// keeps its signature so it can be logged, and is never coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// `d`: 64-bit float
    Double(f64),
    /// `i`: 32-bit signed integer
    Int32(i32),
    /// `n`: 16-bit signed integer
    Int16(i16),
    /// Any other tag, with its signature
    Unrecognized(String),
}

impl Variant {
    /// Wire signature of the value
    pub fn signature(&self) -> &str {
        match self {
            Variant::Double(_) => "d",
            Variant::Int32(_) => "i",
            Variant::Int16(_) => "n",
            Variant::Unrecognized(sig) => sig,
        }
    }
}

/// A variant dictionary (`a{sv}`)
pub type VariantMap = BTreeMap<String, Variant>;

/// Decoded body of a signal
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SignalBody {
    /// `a{sv}`: property dictionary of a single object
    Properties(VariantMap),
    /// `a{sa{sv}}`: sub-path to property dictionary
    Items(BTreeMap<String, VariantMap>),
    /// Body shape the bridge does not understand
    #[default]
    Unsupported,
}

/// One signal event as delivered by the bus adapter
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    /// Connection id (or name) of the sender
    pub sender: String,
    /// Object path the signal was emitted on
    pub path: String,
    /// Signal member
    pub member: Member,
    /// Decoded body
    pub body: SignalBody,
}

impl RawSignal {
    /// Single-value update carrying `{"Value": value}`
    pub fn properties_changed(
        sender: impl Into<String>,
        path: impl Into<String>,
        value: Variant,
    ) -> Self {
        let mut map = VariantMap::new();
        map.insert(VALUE_KEY.to_string(), value);
        Self {
            sender: sender.into(),
            path: path.into(),
            member: Member::PropertiesChanged,
            body: SignalBody::Properties(map),
        }
    }

    /// Batched update emitted on the root path
    pub fn items_changed<I, P>(sender: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = (P, Variant)>,
        P: Into<String>,
    {
        let items = items
            .into_iter()
            .map(|(path, value)| {
                let mut map = VariantMap::new();
                map.insert(VALUE_KEY.to_string(), value);
                (path.into(), map)
            })
            .collect();
        Self {
            sender: sender.into(),
            path: ROOT_PATH.to_string(),
            member: Member::ItemsChanged,
            body: SignalBody::Items(items),
        }
    }
}

/// Signal match rule registered with the bus
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionRule {
    /// Expected sender (well-known name or connection id)
    pub sender: String,
    /// Signal member
    pub member: Member,
    /// Object path
    pub path: String,
}

impl SubscriptionRule {
    /// Create a new rule
    pub fn new(sender: impl Into<String>, member: Member, path: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            member,
            path: path.into(),
        }
    }
}

impl fmt::Display for SubscriptionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type='signal',sender='{}',member='{}',path='{}'",
            self.sender, self.member, self.path
        )
    }
}
