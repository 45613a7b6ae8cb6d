//! Configuration loaded from TOML
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working single-host setup:
//!
//! ```toml
//! log_file = "/tmp/beatcast.log"
//!
//! [network]
//! group = "224.2.2.3:9999"
//! interface = "0.0.0.0"
//!
//! [pattern]
//! steps = 16
//!
//! [clock]
//! kind = "beat"        # or "free"
//! bpm = 120.0
//! quantum = 4.0
//! subdivision = 4
//! interval_ms = 200    # free-running only
//!
//! [controller]
//! channels = 4
//! slots = 16
//! refresh_ms = 50
//! publish_ms = 1000
//! keepalive = "master-only"   # "all-channels" | "off"
//!
//! [player]
//! channel = 0
//! refresh_ms = 50
//! width = 640
//! height = 480
//! ```

use crate::controller::KeepalivePolicy;
use crate::distributor::DEFAULT_GROUP;
use crate::error::{Error, Result};
use crate::pattern::DEFAULT_STEPS;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub pattern: PatternConfig,
    pub clock: ClockConfig,
    pub controller: ControllerConfig,
    pub player: PlayerConfig,
    /// Where logs go while a full-screen terminal view is active
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub group: SocketAddrV4,
    /// Local interface address used to join the group
    pub interface: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Steps per pattern; must match across the whole deployment
    pub steps: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockKind {
    /// Follow the shared beat clock
    #[default]
    Beat,
    /// Fixed wall-clock interval, no tempo reference
    Free,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub kind: ClockKind,
    pub bpm: f64,
    pub quantum: f64,
    /// Ticks per beat
    pub subdivision: u32,
    pub interval_ms: u64,
}

impl ClockConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            kind: ClockKind::Beat,
            bpm: 120.0,
            quantum: 4.0,
            subdivision: 4,
            interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub channels: usize,
    pub slots: usize,
    /// Light refresh cadence
    pub refresh_ms: u64,
    /// Keepalive republish cadence
    pub publish_ms: u64,
    pub keepalive: KeepalivePolicy,
}

impl ControllerConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_millis(self.publish_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            slots: 16,
            refresh_ms: 50,
            publish_ms: 1000,
            keepalive: KeepalivePolicy::MasterOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Channel this client plays; 0 plays only wildcard traffic
    pub channel: u64,
    /// Render cadence, independent of tick rate
    pub refresh_ms: u64,
    pub width: u32,
    pub height: u32,
}

impl PlayerConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            refresh_ms: 50,
            width: 640,
            height: 480,
        }
    }
}

impl Config {
    /// Default config file location (`<config dir>/beatcast/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("beatcast").join("config.toml"))
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// built-in defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));

        if self.pattern.steps == 0 {
            return fail("pattern.steps must be at least 1");
        }
        if self.controller.channels == 0 || self.controller.slots == 0 {
            return fail("controller.channels and controller.slots must be at least 1");
        }
        if self.controller.refresh_ms == 0 || self.controller.publish_ms == 0 {
            return fail("controller cadences must be non-zero");
        }
        if self.player.refresh_ms == 0 {
            return fail("player.refresh_ms must be non-zero");
        }
        if !(self.clock.bpm.is_finite() && self.clock.bpm > 0.0) {
            return fail("clock.bpm must be positive");
        }
        if !(self.clock.quantum.is_finite() && self.clock.quantum > 0.0) {
            return fail("clock.quantum must be positive");
        }
        if self.clock.subdivision == 0 {
            return fail("clock.subdivision must be at least 1");
        }
        if self.clock.interval_ms == 0 {
            return fail("clock.interval_ms must be non-zero");
        }
        Ok(())
    }
}
