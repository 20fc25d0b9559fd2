// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Identity resolution
//!
//! Signals arrive stamped with the sender's connection id, while the
//! monitoring table names sources by their well-known names. The
//! [`OwnerTable`] bridges the two. It is built once at startup and never
//! refreshed: when a source restarts under a new connection id its signals
//! stop matching until the bridge itself restarts.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::config::MonitoringItem;
use crate::error::BusError;

/// Bus directory service
pub trait BusDirectory {
    /// Current owning connection id of a well-known name
    fn name_owner(&self, name: &str) -> Result<String, BusError>;
}

/// Connection id to well-known name mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerTable {
    /// connection id -> well-known names it owns
    by_owner: HashMap<String, Vec<String>>,
    /// well-known name -> connection id
    by_name: HashMap<String, String>,
}

impl OwnerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every distinct bus name used by `items`
    ///
    /// Failures are logged and leave that name unresolved; they never abort.
    pub fn resolve<D: BusDirectory + ?Sized>(directory: &D, items: &[MonitoringItem]) -> Self {
        let mut table = Self::new();
        let mut attempted = HashSet::new();

        for item in items {
            if !attempted.insert(item.bus_name.as_str()) {
                continue;
            }
            match directory.name_owner(&item.bus_name) {
                Ok(owner) => {
                    info!("DbusLookup: {} => {}", item.bus_name, owner);
                    table.insert(item.bus_name.clone(), owner);
                }
                Err(e) => {
                    warn!("DbusLookup: {} unresolved: {}", item.bus_name, e);
                }
            }
        }

        table
    }

    /// Record that `owner` currently owns `name`
    pub fn insert(&mut self, name: impl Into<String>, owner: impl Into<String>) {
        let name = name.into();
        let owner = owner.into();
        let names = self.by_owner.entry(owner.clone()).or_default();
        if !names.contains(&name) {
            names.push(name.clone());
        }
        self.by_name.insert(name, owner);
    }

    /// Connection id owning a well-known name
    pub fn owner_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Identities a signal sender can be matched under
    ///
    /// The well-known names it owns come first, then the raw sender itself.
    pub fn identities<'a>(&'a self, sender: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_owner
            .get(sender)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .chain(std::iter::once(sender))
    }

    /// Number of resolved names
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
