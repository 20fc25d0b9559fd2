// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Dispatch loop
//!
//! One dedicated thread takes signals off a bounded queue in delivery order,
//! decodes them and publishes the result. Only a successful publish resets the
//! watchdog, so a broker outage and a silent bus look the same to it.
//!
//! The queue is deliberately small. When the loop falls behind, the bus
//! adapter blocks on `send` instead of dropping updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, error, info};

use crate::decoder::{Decoded, Decoder};
use crate::protocol::RawSignal;
use crate::publish::Publisher;
use crate::shutdown::ShutdownSignal;
use crate::watchdog::Watchdog;

/// Create the bounded signal queue between the bus adapter and the loop
pub fn signal_channel(capacity: usize) -> (Sender<RawSignal>, Receiver<RawSignal>) {
    bounded(capacity.max(1))
}

/// What happened to one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published this many fields
    Published(usize),
    /// No monitoring item for the signal
    Unmatched,
    /// Matched but nothing to publish
    Skipped,
    /// Publisher returned an error
    PublishFailed,
}

/// Counters kept by the dispatch loop
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    published: AtomicU64,
    unmatched: AtomicU64,
    skipped: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub received: u64,
    pub published: u64,
    pub unmatched: u64,
    pub skipped: u64,
    pub publish_failures: u64,
}

impl DispatchStats {
    fn record(&self, outcome: DispatchOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            DispatchOutcome::Published(_) => &self.published,
            DispatchOutcome::Unmatched => &self.unmatched,
            DispatchOutcome::Skipped => &self.skipped,
            DispatchOutcome::PublishFailed => &self.publish_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// Decode-and-publish worker
pub struct Dispatcher<P: Publisher> {
    decoder: Decoder,
    publisher: P,
    watchdog: Watchdog,
    stats: Arc<DispatchStats>,
}

impl<P: Publisher> Dispatcher<P> {
    /// Create a dispatcher
    pub fn new(decoder: Decoder, publisher: P, watchdog: Watchdog) -> Self {
        Self {
            decoder,
            publisher,
            watchdog,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Shared counters, readable while the loop runs
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Handle one signal
    pub fn dispatch(&mut self, signal: &RawSignal) -> DispatchOutcome {
        let outcome = match self.decoder.decode(signal) {
            Decoded::Unmatched => DispatchOutcome::Unmatched,
            Decoded::Skipped(_) => DispatchOutcome::Skipped,
            Decoded::Readings(readings) => {
                debug!("MQTT: Publish: {:?}", readings);
                match self.publisher.publish(&readings) {
                    Ok(()) => {
                        self.watchdog.reset();
                        DispatchOutcome::Published(readings.len())
                    }
                    Err(e) => {
                        error!("MQTT: publish for {} failed: {}", signal.path, e);
                        DispatchOutcome::PublishFailed
                    }
                }
            }
        };
        self.stats.record(outcome);
        outcome
    }

    /// Consume signals until the queue closes or shutdown is requested
    pub fn run(&mut self, signals: &Receiver<RawSignal>, shutdown: &ShutdownSignal) -> StatsSnapshot {
        info!("Dispatch: loop started");
        loop {
            select! {
                recv(shutdown.receiver()) -> _ => {
                    info!("Dispatch: shutdown requested");
                    break;
                }
                recv(signals) -> msg => match msg {
                    Ok(signal) => {
                        self.dispatch(&signal);
                    }
                    Err(_) => {
                        info!("Dispatch: signal stream closed");
                        break;
                    }
                },
            }
        }
        let snapshot = self.stats.snapshot();
        info!("Dispatch: loop stopped: {:?}", snapshot);
        snapshot
    }
}

impl<P: Publisher + 'static> Dispatcher<P> {
    /// Run the loop on a dedicated thread
    pub fn spawn(
        mut self,
        signals: Receiver<RawSignal>,
        shutdown: ShutdownSignal,
    ) -> std::io::Result<JoinHandle<StatsSnapshot>> {
        thread::Builder::new()
            .name("bridge-dispatch".to_string())
            .spawn(move || self.run(&signals, &shutdown))
    }
}
