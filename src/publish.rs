// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Publisher abstraction
//!
//! The engine hands each non-empty set of readings to a [`Publisher`]. The
//! broker adapter lives in the daemon; [`MemoryPublisher`] records messages
//! in memory for tests and dry runs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::decoder::Readings;
use crate::error::PublishError;

/// A message as handed to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Destination topic
    pub topic: String,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Whether the broker should retain the message
    pub retain: bool,
}

/// Downstream broker collaborator
pub trait Publisher: Send {
    /// Publish one set of readings to the status destination
    fn publish(&mut self, readings: &Readings) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, readings: &Readings) -> Result<(), PublishError> {
        (**self).publish(readings)
    }
}

/// In-memory publisher
///
/// Clones share the recorded messages, so a test can keep one clone while the
/// dispatch loop owns another.
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    topic: String,
    sent: Arc<Mutex<Vec<Message>>>,
    fail: Arc<Mutex<bool>>,
}

impl MemoryPublisher {
    /// Create a publisher writing to `topic`
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Make subsequent publishes fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// Messages published so far
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Payloads published so far, parsed as JSON
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Number of messages published
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, readings: &Readings) -> Result<(), PublishError> {
        if *self.fail.lock() {
            return Err(PublishError::Rejected {
                topic: self.topic.clone(),
                reason: "broker unavailable".to_string(),
            });
        }
        let payload = readings.to_json()?;
        self.sent.lock().push(Message {
            topic: self.topic.clone(),
            payload,
            retain: false,
        });
        Ok(())
    }
}
