//! Serial link to the radio.
//!
//! The link is the producer side of the decoder: it reads whatever the
//! radio emits and appends it, chunk by chunk, to the shared
//! [`SharedBuffer`]. It knows nothing about frames.
//!
//! [`pump`] works with any [`AsyncRead`] source, so tests and other
//! transports can feed the decoder without a serial port.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::SharedBuffer;
use crate::stats::DecoderStats;

/// Default bit rate of DSC controller text outputs.
pub const DEFAULT_BAUD_RATE: u32 = 4800;

/// Errors from the serial link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No serial port configured")]
    NoPort,

    #[error("Invalid link setting: {0}")]
    Configure(String),

    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("Read error: {0}")]
    Read(#[from] std::io::Error),
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

fn data_bits(bits: u8) -> Result<tokio_serial::DataBits, LinkError> {
    match bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(LinkError::Configure(format!(
            "data bits must be 5-8, got {}",
            other
        ))),
    }
}

/// Configuration for the serial link.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// Bit rate.
    pub baud_rate: u32,

    /// Data bits per character (5-8).
    pub data_bits: u8,

    pub parity: Parity,

    pub stop_bits: StopBits,

    pub flow_control: FlowControl,

    /// Assert DTR after opening.
    pub dtr: bool,

    /// Read buffer size in bytes.
    pub read_chunk: usize,

    /// Reopen the port after a read failure.
    pub auto_reopen: bool,

    /// Delay between reopen attempts, in seconds.
    pub reopen_delay_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            dtr: true,
            read_chunk: 1024,
            auto_reopen: false,
            reopen_delay_secs: 5,
        }
    }
}

impl LinkConfig {
    /// Create a configuration for `port` with default settings.
    pub fn with_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Set the bit rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Check settings that can be validated without opening the port.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.port.trim().is_empty() {
            return Err(LinkError::NoPort);
        }
        if self.baud_rate == 0 {
            return Err(LinkError::Configure("baud rate must be positive".into()));
        }
        data_bits(self.data_bits)?;
        Ok(())
    }
}

/// Events from the link task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The port was opened.
    Opened(String),

    /// The link stopped delivering data.
    Closed(String),

    /// An error occurred.
    Error(String),
}

/// Why [`pump`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reached end of stream.
    Eof,
    /// The shutdown signal fired.
    Shutdown,
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>, LinkError> {
    let ports = tokio_serial::available_ports().map_err(|source| LinkError::Open {
        port: "<enumerate>".to_string(),
        source,
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Read `reader` into `buffer` until end of stream, error, or shutdown.
pub async fn pump<R>(
    mut reader: R,
    buffer: &SharedBuffer,
    stats: &DecoderStats,
    chunk_size: usize,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<PumpEnd, LinkError>
where
    R: AsyncRead + Unpin,
{
    if *shutdown.borrow() {
        return Ok(PumpEnd::Shutdown);
    }

    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    return Ok(PumpEnd::Eof);
                }
                trace!("Received {} bytes: {:?}", n, String::from_utf8_lossy(&chunk[..n]));
                stats.record_chunk(n as u64);
                buffer.append_bytes(&chunk[..n]);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(PumpEnd::Shutdown);
                }
            }
        }
    }
}

/// Spawn a task pumping an arbitrary source into `buffer`.
///
/// Emits [`LinkEvent::Closed`] when the source ends and
/// [`LinkEvent::Error`] if reading fails.
pub fn spawn_reader<R>(
    reader: R,
    buffer: SharedBuffer,
    stats: Arc<DecoderStats>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::Sender<LinkEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reason = match pump(reader, &buffer, &stats, 1024, &mut shutdown).await {
            Ok(PumpEnd::Eof) => "End of stream".to_string(),
            Ok(PumpEnd::Shutdown) => "Shutdown".to_string(),
            Err(e) => {
                let _ = events.send(LinkEvent::Error(e.to_string())).await;
                e.to_string()
            }
        };
        let _ = events.send(LinkEvent::Closed(reason)).await;
    })
}

/// A serial port feeding the decoder.
pub struct SerialLink {
    config: LinkConfig,
}

impl SerialLink {
    /// Create a link with the given configuration.
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Open and configure the port.
    pub fn open(&self) -> Result<SerialStream, LinkError> {
        self.config.validate()?;
        let port = self.config.port.as_str();

        debug!(
            port = %port,
            baud_rate = self.config.baud_rate,
            data_bits = self.config.data_bits,
            parity = ?self.config.parity,
            stop_bits = ?self.config.stop_bits,
            flow_control = ?self.config.flow_control,
            dtr = self.config.dtr,
            "Opening serial port"
        );

        let mut stream = tokio_serial::new(port, self.config.baud_rate)
            .data_bits(data_bits(self.config.data_bits)?)
            .parity(self.config.parity.into())
            .stop_bits(self.config.stop_bits.into())
            .flow_control(self.config.flow_control.into())
            .open_native_async()
            .map_err(|source| LinkError::Open {
                port: port.to_string(),
                source,
            })?;

        if let Err(e) = stream.write_data_terminal_ready(self.config.dtr) {
            warn!(port = %port, "Failed to set DTR: {}", e);
        }

        info!(port = %port, baud_rate = self.config.baud_rate, "Serial port opened");
        Ok(stream)
    }

    /// Spawn the link task.
    ///
    /// The task runs until shutdown, end of stream, or (without
    /// `auto_reopen`) the first failure. Closing the link is signalled
    /// through `shutdown`.
    pub fn spawn(
        self,
        buffer: SharedBuffer,
        stats: Arc<DecoderStats>,
        shutdown: watch::Receiver<bool>,
        events: mpsc::Sender<LinkEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(buffer, stats, shutdown, events).await;
        })
    }

    /// Run the open/read loop with optional reopen.
    async fn run(
        self,
        buffer: SharedBuffer,
        stats: Arc<DecoderStats>,
        mut shutdown: watch::Receiver<bool>,
        events: mpsc::Sender<LinkEvent>,
    ) {
        let reopen_delay = Duration::from_secs(self.config.reopen_delay_secs);

        loop {
            let result = match self.open() {
                Ok(stream) => {
                    let _ = events
                        .send(LinkEvent::Opened(self.config.port.clone()))
                        .await;
                    pump(
                        stream,
                        &buffer,
                        &stats,
                        self.config.read_chunk,
                        &mut shutdown,
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(PumpEnd::Shutdown) => {
                    info!("Serial link closed");
                    let _ = events.send(LinkEvent::Closed("Shutdown".into())).await;
                    return;
                }
                Ok(PumpEnd::Eof) => {
                    info!("Serial port reached end of stream");
                }
                Err(e) => {
                    error!("Serial link error: {}", e);
                    let _ = events.send(LinkEvent::Error(e.to_string())).await;
                }
            }

            if !self.config.auto_reopen {
                let _ = events
                    .send(LinkEvent::Closed("Link lost".into()))
                    .await;
                return;
            }

            info!("Reopening in {} seconds...", reopen_delay.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(reopen_delay) => {}
                _ = shutdown.changed() => {
                    let _ = events.send(LinkEvent::Closed("Shutdown".into())).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TrailingPolicy;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.parity, Parity::None);
        assert!(config.dtr);
        assert!(!config.auto_reopen);
    }

    #[test]
    fn test_config_builder() {
        let config = LinkConfig::with_port("/dev/ttyUSB0").with_baud_rate(9600);
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            LinkConfig::default().validate(),
            Err(LinkError::NoPort)
        ));

        let mut config = LinkConfig::with_port("COM3");
        config.data_bits = 9;
        assert!(matches!(config.validate(), Err(LinkError::Configure(_))));
    }

    #[test]
    fn test_parse_link_toml() {
        let config: LinkConfig = toml::from_str(
            r#"
                port = "COM3"
                baud_rate = 9600
                parity = "even"
                stop_bits = "two"
                flow_control = "hardware"
                dtr = false
            "#,
        )
        .unwrap();
        assert_eq!(config.port, "COM3");
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.flow_control, FlowControl::Hardware);
        assert!(!config.dtr);
        assert_eq!(config.data_bits, 8);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let link = SerialLink::new(LinkConfig::with_port("/dev/does-not-exist-dsc"));
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(async { link.open() });
        assert!(matches!(result, Err(LinkError::Open { .. })));
    }

    #[tokio::test]
    async fn test_pump_until_eof() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let buffer = SharedBuffer::new(TrailingPolicy::Retain);
        let stats = DecoderStats::new();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tx.write_all(b"Incoming Distress\r\n").await.unwrap();
        tx.write_all(b"> ?").await.unwrap();
        drop(tx);

        let end = pump(rx, &buffer, &stats, 8, &mut shutdown_rx).await.unwrap();

        assert_eq!(end, PumpEnd::Eof);
        assert_eq!(buffer.drain_frames().len(), 1);
        assert_eq!(stats.summary().bytes_received, 22);
    }

    #[tokio::test]
    async fn test_pump_stops_on_shutdown() {
        let (_tx, rx) = tokio::io::duplex(64);
        let buffer = SharedBuffer::new(TrailingPolicy::Retain);
        let stats = DecoderStats::new();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            pump(rx, &buffer, &stats, 8, &mut shutdown_rx).await
        });
        shutdown_tx.send(true).unwrap();

        assert_eq!(task.await.unwrap().unwrap(), PumpEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_spawn_reader_reports_close() {
        let (tx, rx) = tokio::io::duplex(64);
        let buffer = SharedBuffer::new(TrailingPolicy::Retain);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::channel(4);

        let handle = spawn_reader(
            rx,
            buffer.clone(),
            Arc::new(DecoderStats::new()),
            shutdown_rx,
            events_tx,
        );
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            events_rx.recv().await,
            Some(LinkEvent::Closed("End of stream".to_string()))
        );
    }
}
