// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Process-level cancellation token
//!
//! A [`Shutdown`] is closed at most once. Every [`ShutdownSignal`] cloned from
//! it observes the close: the dispatch loop and the watchdog timer both
//! select on it.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

/// Owner side of the cancellation token
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl Shutdown {
    /// Create an open token
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Close the token. Further calls are no-ops.
    pub fn trigger(&self) {
        self.tx.lock().take();
    }

    /// Observer handle
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    /// Whether the token was closed
    pub fn is_triggered(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the cancellation token
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// Whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until shutdown is requested
    pub fn wait(&self) {
        while self.rx.recv().is_ok() {}
    }

    /// Block up to `timeout`. Returns true if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Channel to use in `crossbeam_channel::select!`. It never yields a
    /// message; it disconnects on shutdown.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_open_token() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        assert!(!shutdown.is_triggered());
        assert!(!signal.is_triggered());
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_trigger_is_observed_by_all_clones() {
        let shutdown = Shutdown::new();
        let a = shutdown.signal();
        let b = a.clone();

        shutdown.clone().trigger();
        shutdown.trigger();

        assert!(shutdown.is_triggered());
        assert!(a.is_triggered());
        assert!(b.wait_timeout(Duration::from_secs(5)));
        b.wait();
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        let start = Instant::now();

        let waiter = thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();

        assert!(waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
