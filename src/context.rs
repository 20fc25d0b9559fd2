// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Shared bridge context
//!
//! Everything the engine reads after startup: the monitoring items and the
//! owner table. Built once, then shared read-only (usually behind an `Arc`)
//! by the registrar, the decoder and the dispatch loop.

use std::collections::HashMap;

use crate::config::MonitoringItem;
use crate::protocol::Member;
use crate::resolver::{BusDirectory, OwnerTable};

type ItemKey = (String, String, Member);

/// Immutable startup state of the bridge
#[derive(Debug, Clone)]
pub struct BridgeContext {
    items: Vec<MonitoringItem>,
    owners: OwnerTable,
    index: HashMap<ItemKey, usize>,
}

impl BridgeContext {
    /// Create a context from already-resolved owners
    pub fn new(items: Vec<MonitoringItem>, owners: OwnerTable) -> Self {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            index
                .entry((item.bus_name.clone(), item.object_path.clone(), item.member))
                .or_insert(i);
        }
        Self {
            items,
            owners,
            index,
        }
    }

    /// Resolve owners through `directory`, then build the context
    pub fn resolve<D: BusDirectory + ?Sized>(items: Vec<MonitoringItem>, directory: &D) -> Self {
        let owners = OwnerTable::resolve(directory, &items);
        Self::new(items, owners)
    }

    /// All monitoring items, in configuration order
    pub fn items(&self) -> &[MonitoringItem] {
        &self.items
    }

    /// The owner table
    pub fn owners(&self) -> &OwnerTable {
        &self.owners
    }

    /// Find the item a signal belongs to
    ///
    /// The sender is tried under every well-known name it owns, then as-is.
    pub fn find_item(&self, sender: &str, path: &str, member: Member) -> Option<&MonitoringItem> {
        self.owners.identities(sender).find_map(|identity| {
            self.index
                .get(&(identity.to_string(), path.to_string(), member))
                .map(|&i| &self.items[i])
        })
    }
}
