//! Engine configuration loading and resolution
//!
//! Configuration is a single TOML file. Every field has a built-in default,
//! so an absent file (or an absent section) is never fatal.
//!
//! # Resolution order
//!
//! 1. Explicit path (command-line `--config`), highest priority
//! 2. `FRAMESYNC_CONFIG` environment variable
//! 3. `<config_dir>/framesync/config.toml` (platform config directory)
//! 4. Built-in defaults
//!
//! An explicit path (1 or 2) that cannot be read is an error. The platform
//! default (3) is optional and silently skipped when missing.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "FRAMESYNC_CONFIG";

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

/// Read-ahead cache and storage pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of storage units in the pool (also the frame queue bound)
    pub capacity: usize,

    /// Byte capacity of each storage unit (worst-case decoded payload)
    pub unit_size: usize,

    /// Wait slice while the pool is exhausted, in milliseconds
    pub pool_wait_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 40,
            unit_size: 64 * 1024,
            pool_wait_ms: 5,
        }
    }
}

impl CacheConfig {
    pub fn pool_wait(&self) -> Duration {
        Duration::from_millis(self.pool_wait_ms)
    }
}

/// Playback scheduler timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Video frames later than this are counted as underruns
    pub underrun_tolerance_ms: u64,

    /// Final stretch before a deadline that is spun instead of slept
    pub spin_lead_us: u64,

    /// Longest single sleep while waiting out a deadline
    pub max_sleep_slice_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            underrun_tolerance_ms: 9,
            spin_lead_us: 2000,
            max_sleep_slice_ms: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn underrun_tolerance(&self) -> Duration {
        Duration::from_millis(self.underrun_tolerance_ms)
    }

    pub fn spin_lead(&self) -> Duration {
        Duration::from_micros(self.spin_lead_us)
    }

    pub fn max_sleep_slice(&self) -> Duration {
        Duration::from_millis(self.max_sleep_slice_ms)
    }
}

/// How native-rate audio reaches the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplePolicy {
    /// Linear-interpolate every chunk to the canonical rate
    #[default]
    Resample,
    /// Open the device at the stream's native rate
    Native,
    /// Open the device at the canonical rate and feed native samples unchanged
    None,
}

impl std::fmt::Display for ResamplePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResamplePolicy::Resample => write!(f, "resample"),
            ResamplePolicy::Native => write!(f, "native"),
            ResamplePolicy::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ResamplePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "resample" => Ok(ResamplePolicy::Resample),
            "native" => Ok(ResamplePolicy::Native),
            "none" => Ok(ResamplePolicy::None),
            other => Err(Error::InvalidInput(format!(
                "unknown resample policy '{}' (expected resample, native or none)",
                other
            ))),
        }
    }
}

/// Audio sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub policy: ResamplePolicy,

    /// Canonical device rate in Hz
    pub canonical_rate: u32,

    /// A new chunk is only started while the device holds fewer bytes than this
    pub low_water_bytes: usize,

    /// Sleep between sink loop iterations when there is nothing to do
    pub idle_sleep_ms: u64,

    /// Size of the device-side byte buffer
    pub device_buffer_bytes: usize,

    /// Optional output device name (None = default device)
    pub device_name: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            policy: ResamplePolicy::Resample,
            canonical_rate: 22_050,
            low_water_bytes: 4096,
            idle_sleep_ms: 2,
            device_buffer_bytes: 16 * 1024,
            device_name: None,
        }
    }
}

impl AudioConfig {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error); RUST_LOG overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve and load configuration following the documented priority order
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }

        // Priority 3: Platform config file (optional)
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
            debug!("No config file at {}, using defaults", path.display());
        }

        // Priority 4: Built-in defaults
        Ok(Self::default())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".to_string()));
        }
        if self.cache.unit_size == 0 {
            return Err(Error::Config("cache.unit_size must be at least 1 byte".to_string()));
        }
        if self.audio.canonical_rate == 0 {
            return Err(Error::Config("audio.canonical_rate must be non-zero".to_string()));
        }
        if self.audio.device_buffer_bytes == 0 {
            return Err(Error::Config(
                "audio.device_buffer_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("framesync").join("config.toml"))
}
