//! Configuration for the demo streaming client.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// NetApp endpoint settings.
    pub netapp: NetAppConfig,
    /// Video source settings.
    pub video: VideoSourceConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// NetApp endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetAppConfig {
    /// IP or hostname of the NetApp.
    pub address: String,
    /// Port of the NetApp's server.
    pub port: u16,
    /// Per-attempt connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Keep retrying until the NetApp is available.
    pub wait_until_available: bool,
    /// Overall retry budget in seconds; negative waits indefinitely.
    pub wait_timeout_secs: i64,
}

/// Video source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSourceConfig {
    /// Source kind: "pattern" (synthetic) or "file" (Y4M playback).
    pub source: String,
    /// Path to the Y4M file when `source = "file"`.
    pub file: String,
    /// Frame width for the synthetic source.
    pub width: u32,
    /// Frame height for the synthetic source.
    pub height: u32,
    /// Frame rate for the synthetic source.
    pub fps: f64,
    /// Channel name the frames are sent on.
    pub channel: String,
    /// JPEG quality for still sends (1..=100).
    pub jpeg_quality: u8,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            netapp: NetAppConfig::default(),
            video: VideoSourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetAppConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 5896,
            connect_timeout_secs: 10,
            wait_until_available: false,
            wait_timeout_secs: -1,
        }
    }
}

impl Default for VideoSourceConfig {
    fn default() -> Self {
        Self {
            source: "pattern".into(),
            file: String::new(),
            width: 640,
            height: 480,
            fps: 15.0,
            channel: "image".into(),
            jpeg_quality: 90,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
