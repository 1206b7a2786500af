//! Simulator configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use truncgeo_oracle::OracleConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TRUNCGEO_CONFIG";

/// Complete simulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Oracle library settings, including the default policy.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Synthetic market settings.
    #[serde(default)]
    pub scenario: ScenarioConfig,
    /// Persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which market regime to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Every step jumps far beyond the cap.
    Volatile,
    /// Every step stays well inside the minimum cap.
    Calm,
}

/// Synthetic market configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_kind")]
    pub kind: ScenarioKind,
    /// Number of writes.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Simulated seconds between writes.
    #[serde(default = "default_step_seconds")]
    pub step_seconds: u64,
    /// RNG seed for the tick stream.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Label hashed into the pool id.
    #[serde(default = "default_pool_label")]
    pub pool: String,
    /// Label hashed into the writer id.
    #[serde(default = "default_writer_label")]
    pub writer: String,
    /// Unix time of the genesis observation.
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    /// Ring capacity requested right after enable.
    #[serde(default = "default_cardinality")]
    pub cardinality: u16,
    /// Liquidity reported with every write.
    #[serde(default = "default_liquidity")]
    pub liquidity: u64,
    /// Averaging window used by the reader.
    #[serde(default = "default_twap_window")]
    pub twap_window_secs: u32,
    /// Wall-clock pause between reader consultations.
    #[serde(default = "default_reader_interval")]
    pub reader_interval_ms: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. Empty = do not persist.
    #[serde(default)]
    pub db_path: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for truncgeo targets: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_kind() -> ScenarioKind {
    ScenarioKind::Volatile
}

fn default_steps() -> u32 {
    400
}

fn default_step_seconds() -> u64 {
    600
}

fn default_seed() -> u64 {
    7
}

fn default_pool_label() -> String {
    "sim-pool".to_string()
}

fn default_writer_label() -> String {
    "sim-writer".to_string()
}

fn default_start_time() -> u64 {
    1_700_000_000
}

fn default_cardinality() -> u16 {
    256
}

fn default_liquidity() -> u64 {
    1_000_000_000_000_000_000
}

fn default_twap_window() -> u32 {
    3_600
}

fn default_reader_interval() -> u64 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            steps: default_steps(),
            step_seconds: default_step_seconds(),
            seed: default_seed(),
            pool: default_pool_label(),
            writer: default_writer_label(),
            start_time: default_start_time(),
            cardinality: default_cardinality(),
            liquidity: default_liquidity(),
            twap_window_secs: default_twap_window(),
            reader_interval_ms: default_reader_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SimConfig {
    /// Load configuration from `path`, or from [`CONFIG_ENV`] when `path`
    /// is `None`.
    ///
    /// Falls back to defaults if neither names a file.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.oracle.validate()?;
        if config.scenario.step_seconds == 0 {
            anyhow::bail!("scenario.step_seconds must be non-zero");
        }
        Ok(config)
    }

    /// Database path, if persistence is enabled.
    pub fn db_path(&self) -> Option<PathBuf> {
        if self.storage.db_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.storage.db_path))
        }
    }
}
