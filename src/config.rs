//! Configuration file support for DSC capture.
//!
//! Loads settings from `~/.config/dsc-capture/config.toml` on Linux
//! (or platform-appropriate location on other OSes).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::buffer::DEFAULT_MAX_BUFFER;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::frame::TrailingPolicy;
use crate::link::LinkConfig;

/// Application configuration loaded from TOML file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link settings.
    pub link: LinkConfig,

    /// Directory that receives one text file per decoded call.
    pub output_dir: PathBuf,

    /// Decode tick in milliseconds.
    pub tick_interval_ms: u64,

    /// What to do with text buffered after a complete frame.
    pub trailing_text: TrailingPolicy,

    /// Most bytes of unmatched text kept in the stream buffer.
    pub max_buffer_bytes: usize,

    /// Limit on one call file write, in milliseconds.
    pub write_timeout_ms: u64,

    /// Position updates buffered per subscriber.
    pub event_capacity: usize,

    /// Print statistics every N seconds (0 disables).
    pub stats_interval: u64,

    /// Enable Prometheus metrics HTTP endpoint.
    pub metrics_enabled: bool,

    /// Port for Prometheus metrics HTTP endpoint.
    pub metrics_port: u16,

    /// Label for published position updates. Defaults to the port name.
    pub source: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            output_dir: default_output_dir(),
            tick_interval_ms: 50,
            trailing_text: TrailingPolicy::Discard,
            max_buffer_bytes: DEFAULT_MAX_BUFFER,
            write_timeout_ms: 5000,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            stats_interval: 60,
            metrics_enabled: false,
            metrics_port: 9190,
            source: None,
        }
    }
}

/// `<temp>/dsc-calls`.
pub fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("dsc-calls")
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dsc-capture/config.toml"))
    }

    /// Decode tick as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Call file write limit as a duration.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Label for published position updates.
    pub fn source_label(&self) -> String {
        self.source
            .clone()
            .unwrap_or_else(|| self.link.port.clone())
    }

    /// Validate all configuration settings.
    pub fn validate(&self) -> Result<()> {
        self.link.validate().context("Invalid [link] section")?;
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be positive");
        }
        if self.event_capacity == 0 {
            anyhow::bail!("event_capacity must be positive");
        }
        if self.write_timeout_ms == 0 {
            anyhow::bail!("write_timeout_ms must be positive");
        }
        if self.max_buffer_bytes < crate::frame::FRAME_START.len() {
            anyhow::bail!("max_buffer_bytes is too small to hold a frame start");
        }
        Ok(())
    }
}
