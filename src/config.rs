//! # Configuration
//!
//! Runtime settings for both roles, loadable from one JSON file. Every field
//! has a default, so a partial file (or none at all) is valid.
//!
//! ```json
//! {
//!   "link":   { "channel": "/dev/ttyUSB0", "baud": 9600 },
//!   "client": { "poll_interval_ms": 500 },
//!   "device": { "store": "scale.json", "seed_demo": true }
//! }
//! ```
//!
//! ## Defaults
//!
//! | Setting | Default |
//! |---------|---------|
//! | channel | `/dev/ttyUSB0` |
//! | baud | 9600, 8N1 |
//! | read / write timeout | 2 s / 3 s |
//! | connect handshake timeout | 2 s |
//! | resync quiet period | 250 ms |
//! | status poll interval | 1 s |
//! | ready-marker delay | 200 ms |
//! | device frame timeout | 1 s |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScaleError};

pub const DEFAULT_CHANNEL: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 9600;

/// Rates the serial link can be opened at.
pub const SUPPORTED_BAUDS: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device path, or `tcp://host:port`.
    pub channel: String,
    pub baud: u32,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            baud: DEFAULT_BAUD,
            read_timeout_ms: 2000,
            write_timeout_ms: 3000,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.is_empty() {
            return Err(ScaleError::Config("channel must not be empty".to_string()));
        }
        if !SUPPORTED_BAUDS.contains(&self.baud) {
            return Err(ScaleError::Config(format!(
                "unsupported baud rate {} (expected one of {:?})",
                self.baud, SUPPORTED_BAUDS
            )));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ScaleError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long `connect` waits for the ready marker.
    pub ready_timeout_ms: u64,
    /// Silence that ends a resync drain.
    pub resync_quiet_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 2000,
            resync_quiet_ms: 250,
            poll_interval_ms: 1000,
        }
    }
}

impl ClientConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn resync_quiet(&self) -> Duration {
        Duration::from_millis(self.resync_quiet_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Pause between a response and the ready marker.
    pub ready_delay_ms: u64,
    /// How long the payload may trail the command byte.
    pub frame_timeout_ms: u64,
    /// JSON store; in-memory when absent.
    pub store: Option<PathBuf>,
    /// Fill an empty store with demo PLUs and messages.
    pub seed_demo: bool,
    /// Serve a fixed zero reading instead of simulated weights.
    pub fixed_status: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ready_delay_ms: 200,
            frame_timeout_ms: 1000,
            store: None,
            seed_demo: false,
            fixed_status: false,
        }
    }
}

impl DeviceConfig {
    pub fn ready_delay(&self) -> Duration {
        Duration::from_millis(self.ready_delay_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub client: ClientConfig,
    pub device: DeviceConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScaleError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.link.validate()?;
        Ok(config)
    }
}
