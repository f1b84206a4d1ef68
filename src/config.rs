//! Configuration parsing and structures
//!
//! The host configuration file is line oriented: the first whitespace
//! separated token of a line is a directive, the next token its value.
//! Directives outside the adapter's namespace belong to the host and are
//! skipped; unknown directives inside it are fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::env::substitute_env_vars;

pub const DEFAULT_ID: &str = "admin";
pub const DEFAULT_CEPH_CONFIG: &str = "/etc/ceph/ceph.conf";
pub const DEFAULT_VOLUME: &str = "/";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_AIO_WORKERS: usize = 8;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Adapter flavour: directive namespace and capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Current adapter: `cephfs.` directives, asynchronous I/O
    #[default]
    Cephfs,
    /// Legacy adapter: `cephoss.` directives, synchronous I/O only
    Legacy,
}

impl Variant {
    /// Namespace of configuration-file directives
    pub fn config_prefix(self) -> &'static str {
        match self {
            Variant::Cephfs => "cephfs.",
            Variant::Legacy => "cephoss.",
        }
    }

    /// Namespace of per-open layout options
    pub fn open_prefix(self) -> &'static str {
        match self {
            Variant::Cephfs => "cephfs.",
            Variant::Legacy => "ceph.",
        }
    }

    /// Per-open option naming the data pool
    pub fn pool_key(self) -> &'static str {
        match self {
            Variant::Cephfs => "pool",
            Variant::Legacy => "data_pool",
        }
    }

    pub fn supports_aio(self) -> bool {
        matches!(self, Variant::Cephfs)
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Resolved adapter configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub variant: Variant,
    /// Client identity used to create the session
    pub id: String,
    /// Client configuration file read into the session before mounting
    pub ceph_config: PathBuf,
    /// Path inside the filesystem that becomes the adapter's root
    pub volume: String,
    pub logging: LoggingConfig,
    /// Upper bound on concurrently executing async requests
    pub aio_workers: usize,
    /// How long shutdown waits for in-flight operations
    pub drain_timeout: Duration,
}

impl Config {
    /// Configuration with every directive at its default
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            id: DEFAULT_ID.to_string(),
            ceph_config: PathBuf::from(DEFAULT_CEPH_CONFIG),
            volume: DEFAULT_VOLUME.to_string(),
            logging: LoggingConfig::default(),
            aio_workers: DEFAULT_AIO_WORKERS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Load configuration from the host configuration file
    pub fn from_file(path: &Path, variant: Variant) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content, variant)
    }

    /// Parse configuration directives from text
    pub fn from_str(content: &str, variant: Variant) -> Result<Self, ConfigError> {
        let prefix = variant.config_prefix();
        let mut config = Self::new(variant);

        for (lineno, line) in content.lines().enumerate() {
            let mut words = line.split_whitespace();
            let directive = match words.next() {
                Some(w) if !w.starts_with('#') => w,
                _ => continue,
            };

            let Some(name) = directive.strip_prefix(prefix) else {
                continue;
            };

            let raw = words.next().ok_or_else(|| {
                ConfigError::ParseError(format!(
                    "line {}: '{}' requires a value",
                    lineno + 1,
                    directive
                ))
            })?;
            let value = substitute_env_vars(raw)?.into_owned();

            match name {
                "id" => config.id = value,
                "config" => config.ceph_config = PathBuf::from(value),
                "volume" => config.volume = value,
                "loglevel" => config.logging.level = value,
                "aio.workers" => {
                    config.aio_workers = value.parse().map_err(|_| {
                        ConfigError::ParseError(format!(
                            "line {}: '{}' expects a worker count, got '{}'",
                            lineno + 1,
                            directive,
                            value
                        ))
                    })?;
                }
                "drain_timeout" => {
                    config.drain_timeout = humantime::parse_duration(&value).map_err(|e| {
                        ConfigError::ParseError(format!(
                            "line {}: '{}' expects a duration: {}",
                            lineno + 1,
                            directive,
                            e
                        ))
                    })?;
                }
                _ => return Err(ConfigError::UnknownDirective(directive.to_string())),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "client id cannot be empty".to_string(),
            ));
        }

        if !self.volume.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "volume must be an absolute path: {}",
                self.volume
            )));
        }

        if self.aio_workers == 0 {
            return Err(ConfigError::ValidationError(
                "aio.workers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Log the resolved directives
    pub fn log_summary(&self) {
        let prefix = self.variant.config_prefix();
        info!("{}{:<14} {}", prefix, "config", self.ceph_config.display());
        info!("{}{:<14} {}", prefix, "id", self.id);
        info!("{}{:<14} {}", prefix, "volume", self.volume);
        info!("{}{:<14} {}", prefix, "loglevel", self.logging.level);
        info!("{}{:<14} {}", prefix, "aio.workers", self.aio_workers);
        info!(
            "{}{:<14} {}",
            prefix,
            "drain_timeout",
            humantime::format_duration(self.drain_timeout)
        );
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Unknown configuration directive '{0}'")]
    UnknownDirective(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
