// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! System bus adapter
//!
//! Implements the engine's [`BusDirectory`] and [`SignalSubscriber`] on a
//! blocking zbus connection and pumps matching signals into the dispatch
//! queue.

use std::collections::HashMap;
use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};
use venus_bridge::{
    BusDirectory, BusError, Member, RawSignal, ShutdownSignal, SignalBody, SignalSubscriber,
    SubscriptionRule, Variant, VariantMap,
};
use zbus::blocking::fdo::DBusProxy;
use zbus::blocking::{Connection, MessageIterator};
use zbus::message::Type as MessageType;
use zbus::names::BusName;
use zbus::zvariant::{OwnedValue, Value};
use zbus::{MatchRule, Message};

type PropertyMap = HashMap<String, OwnedValue>;

/// Blocking connection to the system bus
pub struct SystemBus {
    connection: Connection,
    proxy: DBusProxy<'static>,
}

impl SystemBus {
    /// Connect to the system bus
    pub fn connect() -> Result<Self, BusError> {
        let connection = Connection::system().map_err(|e| BusError::Connection(e.to_string()))?;
        let proxy =
            DBusProxy::new(&connection).map_err(|e| BusError::Connection(e.to_string()))?;

        info!(
            "DBUS: connected to system bus as {}",
            connection
                .unique_name()
                .map(|n| n.to_string())
                .unwrap_or_default()
        );
        Ok(Self { connection, proxy })
    }

    /// Start forwarding signals into `tx`
    ///
    /// The message stream is opened before returning, so signals matched by
    /// rules registered afterwards are not missed.
    pub fn start_pump(
        &self,
        tx: Sender<RawSignal>,
        shutdown: ShutdownSignal,
    ) -> io::Result<JoinHandle<()>> {
        let messages = MessageIterator::from(self.connection.clone());
        thread::Builder::new()
            .name("bridge-dbus-pump".to_string())
            .spawn(move || pump(messages, &tx, &shutdown))
    }
}

impl BusDirectory for SystemBus {
    fn name_owner(&self, name: &str) -> Result<String, BusError> {
        let lookup_error = |reason: String| BusError::NameOwner {
            name: name.to_string(),
            reason,
        };
        let bus_name = BusName::try_from(name).map_err(|e| lookup_error(e.to_string()))?;
        let owner = self
            .proxy
            .get_name_owner(bus_name)
            .map_err(|e| lookup_error(e.to_string()))?;
        Ok(owner.to_string())
    }
}

impl SignalSubscriber for SystemBus {
    fn add_match(&self, rule: &SubscriptionRule) -> Result<(), BusError> {
        let rejected = |reason: String| BusError::AddMatch {
            rule: rule.to_string(),
            reason,
        };
        let match_rule = build_match_rule(rule).map_err(|e| rejected(e.to_string()))?;
        self.proxy
            .add_match_rule(match_rule)
            .map_err(|e| rejected(e.to_string()))
    }
}

fn build_match_rule(rule: &SubscriptionRule) -> zbus::Result<MatchRule<'_>> {
    Ok(MatchRule::builder()
        .msg_type(MessageType::Signal)
        .sender(rule.sender.as_str())?
        .member(rule.member.as_str())?
        .path(rule.path.as_str())?
        .build())
}

fn pump(messages: MessageIterator, tx: &Sender<RawSignal>, shutdown: &ShutdownSignal) {
    for message in messages {
        if shutdown.is_triggered() {
            break;
        }
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!("DBUS: receive failed: {}", e);
                continue;
            }
        };
        let Some(signal) = raw_signal(&message) else {
            continue;
        };
        // Blocks while the dispatch queue is full.
        if tx.send(signal).is_err() {
            debug!("DBUS: dispatch queue closed");
            break;
        }
    }
    info!("DBUS: signal pump stopped");
}

fn raw_signal(message: &Message) -> Option<RawSignal> {
    let header = message.header();
    if header.message_type() != MessageType::Signal {
        return None;
    }
    let member: Member = header.member()?.as_str().parse().ok()?;
    let sender = header.sender()?.to_string();
    let path = header.path()?.to_string();

    let body = match member {
        Member::PropertiesChanged => match message.body().deserialize::<PropertyMap>() {
            Ok(props) => SignalBody::Properties(variant_map(&props)),
            Err(e) => {
                debug!("DBUS: {} {} body not a{{sv}}: {}", sender, path, e);
                SignalBody::Unsupported
            }
        },
        Member::ItemsChanged => {
            match message
                .body()
                .deserialize::<HashMap<String, PropertyMap>>()
            {
                Ok(items) => SignalBody::Items(
                    items
                        .iter()
                        .map(|(sub_path, props)| (sub_path.clone(), variant_map(props)))
                        .collect(),
                ),
                Err(e) => {
                    debug!("DBUS: {} {} body not a{{sa{{sv}}}}: {}", sender, path, e);
                    SignalBody::Unsupported
                }
            }
        }
    };

    Some(RawSignal {
        sender,
        path,
        member,
        body,
    })
}

fn variant_map(props: &PropertyMap) -> VariantMap {
    props
        .iter()
        .map(|(key, value)| (key.clone(), to_variant(value)))
        .collect()
}

/// Map a wire value onto the tags the engine understands
pub fn to_variant(value: &Value<'_>) -> Variant {
    match value {
        Value::F64(v) => Variant::Double(*v),
        Value::I32(v) => Variant::Int32(*v),
        Value::I16(v) => Variant::Int16(*v),
        Value::Value(inner) => to_variant(inner),
        other => Variant::Unrecognized(other.value_signature().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags() {
        assert_eq!(to_variant(&Value::from(-150.0f64)), Variant::Double(-150.0));
        assert_eq!(to_variant(&Value::from(230i32)), Variant::Int32(230));
        assert_eq!(to_variant(&Value::from(87i16)), Variant::Int16(87));
    }

    #[test]
    fn test_nested_variant_is_unwrapped() {
        let nested = Value::Value(Box::new(Value::from(23i16)));
        assert_eq!(to_variant(&nested), Variant::Int16(23));
    }

    #[test]
    fn test_other_tags_are_unrecognized() {
        assert_eq!(
            to_variant(&Value::from("Bulk")),
            Variant::Unrecognized("s".to_string())
        );
        assert_eq!(
            to_variant(&Value::from(1u32)),
            Variant::Unrecognized("u".to_string())
        );
    }

    #[test]
    fn test_variant_map() {
        let mut props = PropertyMap::new();
        props.insert(
            "Value".to_string(),
            OwnedValue::try_from(Value::from(52.1f64)).unwrap(),
        );
        props.insert(
            "Text".to_string(),
            OwnedValue::try_from(Value::from("52.1 V")).unwrap(),
        );

        let map = variant_map(&props);
        assert_eq!(map["Value"], Variant::Double(52.1));
        assert_eq!(map["Text"], Variant::Unrecognized("s".to_string()));
    }

    #[test]
    fn test_match_rule_fields() {
        let rule = SubscriptionRule::new(
            "com.victronenergy.system",
            Member::PropertiesChanged,
            "/Dc/0/Power",
        );
        let built = build_match_rule(&rule).unwrap().to_string();
        assert!(built.contains("type='signal'"));
        assert!(built.contains("sender='com.victronenergy.system'"));
        assert!(built.contains("member='PropertiesChanged'"));
        assert!(built.contains("path='/Dc/0/Power'"));
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let rule = SubscriptionRule::new("not a bus name", Member::ItemsChanged, "/");
        assert!(build_match_rule(&rule).is_err());
    }
}
