//! # Venus Bridge - D-Bus to MQTT telemetry bridge
//!
//! Selectively forwards telemetry from the Venus OS system bus to an MQTT
//! broker as flat JSON readings.
//!
//! ## Key Features
//!
//! - **Declarative monitoring table**: services, paths, units and directions
//!   are read from JSON at startup and never change afterwards
//! - **Owner resolution**: well-known names are mapped to their unique
//!   connection ids once, so incoming signals can be matched by sender
//! - **Direction split**: one signed reading becomes separate `in`/`out`
//!   fields
//! - **Liveness watchdog**: the process stops itself when nothing was
//!   published for a whole window
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use venus_bridge::{
//!     BridgeContext, Decoded, Decoder, Entry, Member, MonitoringItem, OwnerTable, RawSignal,
//!     Variant, Direction,
//! };
//!
//! let items = vec![MonitoringItem {
//!     bus_name: "com.victronenergy.system".to_string(),
//!     member: Member::PropertiesChanged,
//!     object_path: "/Dc/0/Power".to_string(),
//!     entries: vec![Entry {
//!         name: "Grid In".to_string(),
//!         path: "/Dc/0/Power".to_string(),
//!         unit: "W".to_string(),
//!         direction: Direction::In,
//!         data_type: "d".to_string(),
//!     }],
//! }];
//! let mut owners = OwnerTable::new();
//! owners.insert("com.victronenergy.system", ":1.12");
//!
//! let decoder = Decoder::new(Arc::new(BridgeContext::new(items, owners)));
//! let signal = RawSignal::properties_changed(":1.12", "/Dc/0/Power", Variant::Double(230.0));
//!
//! match decoder.decode(&signal) {
//!     Decoded::Readings(readings) => assert_eq!(readings.len(), 1),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Monitoring table and runtime settings
//! - [`resolver`]: Well-known name to connection id table
//! - [`registrar`]: Signal subscriptions
//! - [`decoder`]: Signal decoding and direction transform
//! - [`dispatch`]: Bounded queue and publish loop
//! - [`watchdog`]: Liveness timer
//! - [`discovery`]: Home Assistant discovery metadata

// Modules
pub mod config;
pub mod context;
pub mod decoder;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod publish;
pub mod registrar;
pub mod resolver;
pub mod shutdown;
pub mod transform;
pub mod watchdog;

// Re-exports for convenient access
pub use config::{
    extract_monitoring_items, load_batches, parse_batches, Batch, BatchEntry, BridgeConfig,
    DeviceInfo, Entry, MonitoringItem,
};
pub use context::BridgeContext;
pub use decoder::{Decoded, Decoder, FieldValue, Readings, Skip};
pub use discovery::{discovery_messages, SensorConfig};
pub use dispatch::{signal_channel, DispatchOutcome, DispatchStats, Dispatcher, StatsSnapshot};
pub use error::{BridgeError, BusError, ConfigError, PublishError, Result};
pub use protocol::{Member, RawSignal, SignalBody, SubscriptionRule, Variant, VariantMap};
pub use publish::{MemoryPublisher, Message, Publisher};
pub use registrar::{register_subscriptions, subscription_rules, SignalSubscriber};
pub use resolver::{BusDirectory, OwnerTable};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use transform::{normalize_name, Direction};
pub use watchdog::{Watchdog, WatchdogState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_table_to_owner_lookup() {
        let raw = r#"[{
            "DbusName": "com.victronenergy.system",
            "UpdateStrategy": "",
            "Entries": [{"Name": "Power", "DbusPath": "/Dc/0/Power", "Unit": "W"}]
        }]"#;
        let items = extract_monitoring_items(&parse_batches(raw).unwrap()).unwrap();

        let mut owners = OwnerTable::new();
        owners.insert("com.victronenergy.system", ":1.7");
        let context = BridgeContext::new(items, owners);

        assert!(context
            .find_item(":1.7", "/Dc/0/Power", Member::PropertiesChanged)
            .is_some());
    }
}
