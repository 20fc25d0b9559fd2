// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Venus Bridge
//!
//! Forwards selected Venus OS D-Bus telemetry to an MQTT broker and
//! advertises each field for Home Assistant discovery.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: ./lookupTable.json, broker 192.168.178.3:1883
//! venus-bridge
//!
//! # Custom table and broker, verbose
//! venus-bridge --config /data/lookupTable.json --server broker.local:1883 --log-level debug
//! ```
//!
//! The process exits non-zero when startup fails or when nothing was
//! published for a whole watchdog window. A supervisor is expected to
//! restart it.

mod broker;
mod bus;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use venus_bridge::{
    discovery_messages, extract_monitoring_items, load_batches, register_subscriptions,
    signal_channel, BridgeConfig, BridgeContext, BridgeError, Decoder, Dispatcher,
    MonitoringItem, Shutdown, Watchdog,
};

use broker::{parse_server, Broker};
use bus::SystemBus;
use error::DaemonError;

/// Venus OS D-Bus to MQTT bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Monitoring table (JSON)
    #[arg(short, long, default_value = "lookupTable.json")]
    config: PathBuf,

    /// MQTT broker address
    #[arg(short, long, default_value = "192.168.178.3:1883")]
    server: String,

    /// MQTT client id
    #[arg(long, default_value = "vz-homeassistant-gateway")]
    clientid: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds without a successful publish before the bridge stops
    #[arg(long, default_value = "10")]
    watchdog_secs: u64,

    /// Depth of the signal queue
    #[arg(long, default_value = "10")]
    queue_capacity: usize,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            queue_capacity: self.queue_capacity,
            watchdog_window: Duration::from_secs(self.watchdog_secs),
            ..Default::default()
        }
    }
}

/// Pick the tracing filter: `LOG_LEVEL`, then `RUST_LOG`, then the flag
///
/// A bare word that is not a level falls back to `debug`.
fn filter_directive(log_level: Option<String>, rust_log: Option<String>, flag: &str) -> String {
    let directive = log_level
        .filter(|v| !v.trim().is_empty())
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| flag.to_string())
        .trim()
        .to_lowercase();

    let bare = !directive.contains(|c: char| c == '=' || c == ',');
    if bare && directive != "off" && directive.parse::<Level>().is_err() {
        return "debug".to_string();
    }
    directive
}

fn init_tracing(args: &Args) {
    let directive = filter_directive(
        std::env::var("LOG_LEVEL").ok(),
        std::env::var("RUST_LOG").ok(),
        &args.log_level,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_items(args: &Args) -> Result<Vec<MonitoringItem>, BridgeError> {
    let batches = load_batches(&args.config)?;
    let items = extract_monitoring_items(&batches)?;
    info!(
        "Config: {} monitoring items from {}",
        items.len(),
        args.config.display()
    );
    Ok(items)
}

async fn wait_for_stop(shutdown: &Shutdown) {
    let signal = shutdown.signal();
    let watchdog_stop = tokio::task::spawn_blocking(move || signal.wait());

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = watchdog_stop => {}
    }
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let config = args.bridge_config();
    config.validate()?;
    let items = load_items(&args)?;
    let (host, port) = parse_server(&args.server)?;

    let broker = Broker::connect(&host, port, &args.clientid).await?;

    let bus = tokio::task::spawn_blocking(SystemBus::connect)
        .await
        .map_err(|e| DaemonError::Io(e.into()))?
        .map_err(BridgeError::from)?;

    match discovery_messages(&items, &config) {
        Ok(messages) => {
            let sent = broker.publish_all(&messages).await;
            info!("MQTT: {} of {} discovery messages sent", sent, messages.len());
        }
        Err(e) => warn!("Discovery metadata skipped: {}", e),
    }

    let shutdown = Shutdown::new();
    let (tx, rx) = signal_channel(config.queue_capacity);

    // Owner lookups and match registration are blocking bus calls.
    let (bus, context, _pump) = tokio::task::spawn_blocking({
        let shutdown = shutdown.signal();
        move || -> Result<_, DaemonError> {
            let context = BridgeContext::resolve(items, &bus);
            let pump = bus.start_pump(tx, shutdown)?;
            register_subscriptions(&bus, context.items())?;
            Ok((bus, context, pump))
        }
    })
    .await
    .map_err(|e| DaemonError::Io(e.into()))??;

    let stalled = Arc::new(AtomicBool::new(false));
    let (watchdog, watchdog_timer) = Watchdog::start(config.watchdog_window, shutdown.signal(), {
        let stalled = Arc::clone(&stalled);
        let shutdown = shutdown.clone();
        move || {
            error!("Watchdog: bridge stalled, stopping");
            stalled.store(true, Ordering::SeqCst);
            shutdown.trigger();
        }
    })?;

    let publisher = broker.publisher(config.device.status_topic());
    let dispatcher = Dispatcher::new(Decoder::new(Arc::new(context)), publisher, watchdog);
    let dispatch = dispatcher.spawn(rx, shutdown.signal())?;
    info!("Bridge running, publishing to {}", config.device.status_topic());

    wait_for_stop(&shutdown).await;
    shutdown.trigger();

    let joined = tokio::task::spawn_blocking(move || {
        let stats = dispatch.join();
        let timer = watchdog_timer.join();
        (stats, timer)
    })
    .await
    .map_err(|e| DaemonError::Io(e.into()))?;
    if let (Ok(stats), _) = joined {
        info!("Dispatch totals: {:?}", stats);
    }

    broker.disconnect().await;
    drop(bus);

    if stalled.load(Ordering::SeqCst) {
        return Err(DaemonError::Stalled(config.watchdog_window));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    info!("Venus Bridge v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => {
            info!("Stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["venus-bridge"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = args(&[]);
        assert_eq!(args.config, PathBuf::from("lookupTable.json"));
        assert_eq!(args.server, "192.168.178.3:1883");
        assert_eq!(args.clientid, "vz-homeassistant-gateway");

        let config = args.bridge_config();
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.watchdog_window, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_watchdog_is_rejected() {
        let config = args(&["--watchdog-secs", "0"]).bridge_config();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filter_precedence() {
        assert_eq!(
            filter_directive(Some("DEBUG".into()), Some("warn".into()), "info"),
            "debug"
        );
        assert_eq!(filter_directive(None, Some("warn".into()), "info"), "warn");
        assert_eq!(filter_directive(Some(" ".into()), None, "info"), "info");
        assert_eq!(
            filter_directive(Some("venus_bridge=trace,zbus=warn".into()), None, "info"),
            "venus_bridge=trace,zbus=warn"
        );
        assert_eq!(filter_directive(Some("verbose".into()), None, "info"), "debug");
        assert_eq!(filter_directive(None, None, "off"), "off");
    }

    #[test]
    fn test_load_items_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let table = serde_json::json!([{
            "DbusName": "com.victronenergy.battery.ttyUSB0",
            "UpdateStrategy": "batch",
            "Entries": [
                {"DataType": "n", "Name": "Soc", "DbusPath": "/Soc", "Unit": "%"},
                {"DataType": "n", "Name": "Temp", "DbusPath": "/Temp", "Unit": "°C"}
            ]
        }]);
        write!(file, "{}", table).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let items = load_items(&args(&["--config", &path])).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].entries.len(), 2);
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let result = load_items(&args(&["--config", "/nonexistent/lookupTable.json"]));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
