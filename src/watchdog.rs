// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Liveness watchdog
//!
//! The bridge has no health probe of its own. If no reading was published for
//! a whole window, the watchdog fires its callback once and stays
//! [`WatchdogState::Triggered`] for the rest of the process lifetime. The
//! callback is expected to bring the process down so the supervisor restarts
//! it with a fresh owner table.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;

/// Watchdog states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Deadline is tracked
    Armed,
    /// Callback has fired; terminal
    Triggered,
}

#[derive(Debug)]
struct Shared {
    window: Duration,
    deadline: Mutex<Instant>,
    triggered: AtomicBool,
    resets: AtomicU64,
}

/// Handle to a running watchdog
///
/// Cheap to clone; all clones share one deadline.
#[derive(Debug, Clone)]
pub struct Watchdog {
    shared: Arc<Shared>,
}

impl Watchdog {
    /// Arm a watchdog and start its timer thread
    ///
    /// `on_trigger` runs on the timer thread, at most once. The thread exits
    /// after firing or when `shutdown` is requested.
    pub fn start<F>(
        window: Duration,
        shutdown: ShutdownSignal,
        on_trigger: F,
    ) -> std::io::Result<(Self, JoinHandle<()>)>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            window,
            deadline: Mutex::new(Instant::now() + window),
            triggered: AtomicBool::new(false),
            resets: AtomicU64::new(0),
        });

        let timer = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name("bridge-watchdog".to_string())
            .spawn(move || timer_loop(&timer, &shutdown, on_trigger))?;

        Ok((Self { shared }, join))
    }

    /// Push the deadline to now + window. No effect once triggered.
    pub fn reset(&self) {
        if self.shared.triggered.load(Ordering::Acquire) {
            return;
        }
        *self.shared.deadline.lock() = Instant::now() + self.shared.window;
        self.shared.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Current state
    pub fn state(&self) -> WatchdogState {
        if self.shared.triggered.load(Ordering::Acquire) {
            WatchdogState::Triggered
        } else {
            WatchdogState::Armed
        }
    }

    /// Whether the callback has fired
    pub fn is_triggered(&self) -> bool {
        self.state() == WatchdogState::Triggered
    }

    /// Configured window
    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// Number of accepted resets
    pub fn resets(&self) -> u64 {
        self.shared.resets.load(Ordering::Relaxed)
    }
}

fn timer_loop<F: FnOnce()>(shared: &Shared, shutdown: &ShutdownSignal, on_trigger: F) {
    loop {
        let remaining = shared
            .deadline
            .lock()
            .saturating_duration_since(Instant::now());

        if remaining.is_zero() {
            shared.triggered.store(true, Ordering::Release);
            info!(
                "Watchdog: no successful publish for {:?}, triggered",
                shared.window
            );
            on_trigger();
            return;
        }

        if shutdown.wait_timeout(remaining) {
            debug!("Watchdog: shutdown requested, timer stopped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use std::sync::atomic::AtomicUsize;

    fn counting(window: Duration) -> (Watchdog, JoinHandle<()>, Arc<AtomicUsize>, Shutdown) {
        let shutdown = Shutdown::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let (watchdog, join) = Watchdog::start(window, shutdown.signal(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (watchdog, join, fired, shutdown)
    }

    #[test]
    fn test_fires_once_without_reset() {
        let (watchdog, join, fired, _shutdown) = counting(Duration::from_millis(100));
        assert_eq!(watchdog.state(), WatchdogState::Armed);

        join.join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.state(), WatchdogState::Triggered);

        // Terminal: resets are ignored and nothing fires again.
        watchdog.reset();
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.resets(), 0);
    }

    #[test]
    fn test_regular_resets_keep_it_armed() {
        let (watchdog, join, fired, shutdown) = counting(Duration::from_millis(400));

        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(1500) {
            watchdog.reset();
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!watchdog.is_triggered());
        assert!(watchdog.resets() > 10);

        shutdown.trigger();
        join.join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fires_after_resets_stop() {
        let (watchdog, join, fired, _shutdown) = counting(Duration::from_millis(200));
        for _ in 0..5 {
            watchdog.reset();
            thread::sleep(Duration::from_millis(40));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        join.join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_stops_timer() {
        let (watchdog, join, fired, shutdown) = counting(Duration::from_secs(60));
        shutdown.trigger();
        join.join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(watchdog.state(), WatchdogState::Armed);
        assert_eq!(watchdog.window(), Duration::from_secs(60));
    }
}
