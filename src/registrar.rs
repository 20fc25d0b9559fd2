// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Subscription registration
//!
//! Arms one signal match rule per distinct `(sender, member, path)` triple.
//! Any rejected rule is fatal: a bridge that cannot receive signals has
//! nothing to bridge.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::MonitoringItem;
use crate::error::{BusError, Result};
use crate::protocol::SubscriptionRule;

/// Sink for signal match rules
pub trait SignalSubscriber {
    /// Ask the bus to deliver signals matching `rule`
    fn add_match(&self, rule: &SubscriptionRule) -> std::result::Result<(), BusError>;
}

/// Distinct match rules for `items`, in configuration order
pub fn subscription_rules(items: &[MonitoringItem]) -> Vec<SubscriptionRule> {
    let mut seen = BTreeSet::new();
    items
        .iter()
        .map(|item| SubscriptionRule::new(&item.bus_name, item.member, &item.object_path))
        .filter(|rule| seen.insert(rule.clone()))
        .collect()
}

/// Register every rule needed by `items`
///
/// Returns the number of rules registered. Stops at the first failure.
pub fn register_subscriptions<S: SignalSubscriber + ?Sized>(
    subscriber: &S,
    items: &[MonitoringItem],
) -> Result<usize> {
    let rules = subscription_rules(items);
    for rule in &rules {
        debug!("DBUS: add match {}", rule);
        subscriber.add_match(rule)?;
    }
    info!("DBUS: {} signal subscriptions armed", rules.len());
    Ok(rules.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Entry;
    use crate::error::BridgeError;
    use crate::protocol::Member;
    use crate::transform::Direction;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSubscriber {
        rules: RefCell<Vec<SubscriptionRule>>,
        reject: Option<&'static str>,
    }

    impl SignalSubscriber for RecordingSubscriber {
        fn add_match(&self, rule: &SubscriptionRule) -> std::result::Result<(), BusError> {
            if self.reject == Some(rule.path.as_str()) {
                return Err(BusError::AddMatch {
                    rule: rule.to_string(),
                    reason: "org.freedesktop.DBus.Error.AccessDenied".to_string(),
                });
            }
            self.rules.borrow_mut().push(rule.clone());
            Ok(())
        }
    }

    fn item(bus_name: &str, path: &str, member: Member) -> MonitoringItem {
        MonitoringItem {
            bus_name: bus_name.to_string(),
            member,
            object_path: path.to_string(),
            entries: vec![Entry {
                name: path.to_string(),
                path: path.to_string(),
                unit: String::new(),
                direction: Direction::None,
                data_type: String::new(),
            }],
        }
    }

    #[test]
    fn test_one_rule_per_item() {
        let subscriber = RecordingSubscriber::default();
        let items = vec![
            item("com.victronenergy.system", "/Dc/0/Power", Member::PropertiesChanged),
            item("com.victronenergy.battery.ttyUSB0", "/", Member::ItemsChanged),
        ];

        let count = register_subscriptions(&subscriber, &items).unwrap();
        assert_eq!(count, 2);

        let rules = subscriber.rules.borrow();
        assert_eq!(rules[0].sender, "com.victronenergy.system");
        assert_eq!(rules[0].member, Member::PropertiesChanged);
        assert_eq!(rules[1].path, "/");
        assert_eq!(rules[1].member, Member::ItemsChanged);
    }

    #[test]
    fn test_duplicate_triples_registered_once() {
        let subscriber = RecordingSubscriber::default();
        let items = vec![
            item("com.victronenergy.system", "/Dc/0/Power", Member::PropertiesChanged),
            item("com.victronenergy.system", "/Dc/0/Power", Member::PropertiesChanged),
            item("com.victronenergy.system", "/Dc/0/Power", Member::ItemsChanged),
        ];

        let count = register_subscriptions(&subscriber, &items).unwrap();
        assert_eq!(count, 2);
        assert_eq!(subscriber.rules.borrow().len(), 2);
    }

    #[test]
    fn test_rejected_rule_is_fatal() {
        let subscriber = RecordingSubscriber {
            reject: Some("/Dc/0/Power"),
            ..Default::default()
        };
        let items = vec![
            item("com.victronenergy.system", "/Dc/0/Power", Member::PropertiesChanged),
            item("com.victronenergy.system", "/Dc/0/Voltage", Member::PropertiesChanged),
        ];

        let result = register_subscriptions(&subscriber, &items);
        assert!(matches!(
            result,
            Err(BridgeError::Bus(BusError::AddMatch { .. }))
        ));
        assert!(subscriber.rules.borrow().is_empty());
    }
}
