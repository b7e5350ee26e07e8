use crate::playlist::Variant;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use hlsmux_storage::{FileStorage, MemoryStorage, SegmentStorage, StorageBackend};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Muxer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub muxer: MuxerSettings,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerSettings {
    /// Prefix of every generated file name
    pub prefix: String,
    pub variant: Variant,
    /// Segments kept in the rolling window (0 = never evict automatically)
    pub segment_count: usize,
    /// Id given to the first segment of the session. Raise it across
    /// restarts so clients never see a reused name.
    pub start_segment_id: u64,
}

impl Default for MuxerSettings {
    fn default() -> Self {
        Self {
            prefix: "stream".to_string(),
            variant: Variant::LowLatency,
            segment_count: 7,
            start_segment_id: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Base directory for the file backend
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "./hls".to_string(),
        }
    }
}

impl StorageConfig {
    /// Instantiate the configured backend
    #[must_use]
    pub fn build(&self) -> Arc<dyn SegmentStorage> {
        match self.backend {
            StorageBackend::File => Arc::new(FileStorage::new(&self.path)),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Longest a blocking playlist reload waits for the requested segment/part
    pub block_timeout_ms: u64,
    /// How often a blocked request re-checks the store
    pub block_poll_interval_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            block_timeout_ms: 10_000,
            block_poll_interval_ms: 50,
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    #[must_use]
    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Priority (highest first):
    /// 1. Environment variables (`HLSMUX_MUXER__PREFIX`, `HLSMUX_STORAGE__BACKEND`, ...)
    /// 2. Config file
    /// 3. Defaults
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HLSMUX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Reject settings that would produce unusable names
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.muxer.prefix;
        if prefix.is_empty() {
            return Err(ConfigError::Message("muxer.prefix must not be empty".to_string()));
        }
        if prefix.contains(['/', '?', '#']) {
            return Err(ConfigError::Message(format!(
                "muxer.prefix contains a URL-reserved character: {prefix}"
            )));
        }
        Ok(())
    }
}
