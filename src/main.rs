//! # Meteostick Bridge
//!
//! Reads a Meteostick USB receiver and writes one JSON observation record
//! per polling interval to stdout.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse command line, load and validate configuration
//!    - Set up logging (stderr, optionally daily-rolled files)
//!    - Build the station engine from the channel bindings
//!
//! 2. **Main Loop**
//!    - Open the serial port and read lines until the supply is lost
//!    - Emit a record every poll interval
//!    - Reopen the port up to `max_tries` times, `reconnect_interval_ms` apart
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the current read and logs pipeline statistics
//!
//! # Examples
//!
//! ```bash
//! meteostick-bridge --config /etc/meteostick.toml > observations.jsonl
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meteostick_bridge::config::{Config, LoggingConfig};
use meteostick_bridge::runner::{self, JsonLinesSink};
use meteostick_bridge::serial::StickSerial;
use meteostick_bridge::station::Engine;

/// Log file name prefix inside `logging.directory`
const LOG_FILE_PREFIX: &str = "meteostick-bridge.log";

#[derive(Parser, Debug)]
#[command(name = "meteostick-bridge")]
#[command(version, about = "Decode Meteostick output into weather observation records")]
struct Args {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overriding the configuration
    #[arg(short, long)]
    port: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.serial.port = port;
        config.validate().context("Invalid configuration")?;
    }

    let _log_guard = init_logging(&config.logging)?;

    info!("Meteostick Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Frequency {:?}, rain bucket {}, output units {:?}",
        config.station.frequency, config.station.rain_bucket, config.output.units
    );

    let mut engine = Engine::new(&config).context("Invalid channel bindings")?;
    for binding in engine.registry().bindings() {
        info!(
            "Channel {}: {}{}",
            binding.channel,
            binding.role,
            if binding.repeater { " (via repeater)" } else { "" }
        );
    }
    info!("Transmitter mask: {:#04x}", engine.registry().transmitter_mask());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut sink = JsonLinesSink::new(std::io::stdout());
    let poll_interval = config.output.poll_interval();
    let mut failures: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match StickSerial::open(&config.serial) {
            Ok(serial) => {
                failures = 0;
                let mut reader = serial.into_line_reader(&config.serial);
                let shutdown = wait_for_shutdown(shutdown_rx.clone());

                let result =
                    runner::run(&mut engine, &mut reader, &mut sink, poll_interval, shutdown).await;
                match result {
                    Ok(()) => break,
                    Err(e) => warn!("Lost connection to Meteostick: {}", e),
                }
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "Failed to open Meteostick (attempt {}/{}): {}",
                    failures, config.serial.max_tries, e
                );
                if failures >= config.serial.max_tries {
                    error!("Giving up after {} attempts", failures);
                    bail!("Meteostick unavailable at {}", config.serial.port);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.serial.reconnect_interval()) => {}
            _ = wait_for_shutdown(shutdown_rx.clone()) => break,
        }
    }

    info!("Final pipeline statistics: {}", engine.stats());
    Ok(())
}

/// Resolves once shutdown was requested. A dropped sender never resolves.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
