//! DSC Capture CLI - Decode DSC calls from a radio's serial text output.

use anyhow::{Context, Result};
use clap::Parser;
use dsc_capture::{
    buffer::{SharedBuffer, StreamBuffer},
    config::Config,
    decoder::Decoder,
    events::EventBus,
    link::{self, LinkEvent, SerialLink},
    metrics::{AppState, start_metrics_server},
    record::DisplayLog,
    stats::DecoderStats,
    storage::RecordStore,
    track::PositionTrack,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// DSC Capture - Decode Digital Selective Calling output from a marine radio
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port the radio is connected to
    #[arg(short, long, env = "DSC_PORT")]
    port: Option<String>,

    /// Serial bit rate
    #[arg(short, long, env = "DSC_BAUD_RATE")]
    baud_rate: Option<u32>,

    /// Directory for decoded call files
    #[arg(short, long, env = "DSC_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Decode tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Print statistics every N seconds (0 disables)
    #[arg(short, long)]
    stats_interval: Option<u64>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Maximum runtime in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_runtime: u64,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.link.port = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.link.baud_rate = baud_rate;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(tick) = self.tick_ms {
            config.tick_interval_ms = tick;
        }
        if let Some(interval) = self.stats_interval {
            config.stats_interval = interval;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_enabled = true;
            config.metrics_port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.list_ports {
        let ports = link::list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    info!("DSC Capture starting...");
    info!("Port: {} at {} baud", config.link.port, config.link.baud_rate);
    info!("Output: {}", config.output_dir.display());

    let store = RecordStore::open(&config.output_dir).with_context(|| {
        format!(
            "Cannot use output directory {}",
            config.output_dir.display()
        )
    })?;

    // Shared state
    let stats = Arc::new(DecoderStats::new());
    let display = Arc::new(DisplayLog::new());
    let track = Arc::new(PositionTrack::new());
    let bus = EventBus::new(config.event_capacity);
    let buffer = SharedBuffer::from_buffer(
        StreamBuffer::new(config.trailing_text).with_max_len(config.max_buffer_bytes),
    );

    // Position subscriber
    let track_task = {
        let track = Arc::clone(&track);
        let rx = bus.subscribe();
        tokio::spawn(async move { track.follow(rx).await })
    };

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx_clone.send(true);
    });

    // Optional max runtime
    if args.max_runtime > 0 {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(args.max_runtime)).await;
            info!("Max runtime reached");
            let _ = shutdown_tx_clone.send(true);
        });
    }

    // Start stats printer
    if config.stats_interval > 0 {
        let stats_clone = Arc::clone(&stats);
        let period = Duration::from_secs(config.stats_interval);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                println!("\n{}", stats_clone.summary());
            }
        });
    }

    // Optional metrics server
    if config.metrics_enabled {
        let state = AppState {
            stats: Arc::clone(&stats),
            display: Arc::clone(&display),
            track: Arc::clone(&track),
        };
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, state).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    // Decoder and serial link
    let decoder = Decoder::new(store, bus, config.source_label())
        .with_display(Arc::clone(&display))
        .with_stats(Arc::clone(&stats))
        .with_write_timeout(config.write_timeout());
    let decoder_task = tokio::spawn(decoder.run(
        buffer.clone(),
        config.tick_interval(),
        shutdown_rx.clone(),
    ));

    let (events_tx, mut events) = mpsc::channel(16);
    let link_task = SerialLink::new(config.link.clone()).spawn(
        buffer,
        Arc::clone(&stats),
        shutdown_rx.clone(),
        events_tx,
    );

    // Main event loop
    let mut shutdown_rx = shutdown_rx;
    loop {
        tokio::select! {
            // Check for shutdown
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            // Process link events
            event = events.recv() => {
                match event {
                    Some(LinkEvent::Opened(port)) => {
                        info!("Listening on {}", port);
                    }
                    Some(LinkEvent::Error(e)) => {
                        error!("Link error: {}", e);
                    }
                    Some(LinkEvent::Closed(reason)) => {
                        warn!("Link closed: {}", reason);
                        break;
                    }
                    None => {
                        // Channel closed
                        break;
                    }
                }
            }
        }
    }

    // Stop everything and let the decoder drain what is left
    let _ = shutdown_tx.send(true);
    if let Err(e) = link_task.await {
        warn!("Link task ended abnormally: {}", e);
    }
    decoder_task.await.context("Decoder task failed")?;
    track_task.abort();

    if track.rejected() > 0 {
        warn!("{} position updates could not be decoded", track.rejected());
    }

    // Print final statistics
    println!("\n\nFINAL STATISTICS");
    println!("{}", stats.summary());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "dsc-capture",
            "--port",
            "/dev/ttyUSB1",
            "--baud-rate",
            "9600",
            "--tick-ms",
            "20",
            "--metrics-port",
            "9300",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.link.port, "/dev/ttyUSB1");
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_port, 9300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = Args::parse_from(["dsc-capture"]);
        let mut config = Config::default();
        config.link.port = "COM3".to_string();
        args.apply(&mut config);

        assert_eq!(config.link.port, "COM3");
        assert_eq!(config.tick_interval_ms, 50);
        assert!(!config.metrics_enabled);
        assert!(!args.list_ports);
    }
}
