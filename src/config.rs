//! Configuration management for the gridhash engine
//!
//! Command line arguments, environment variables, and optional YAML/JSON
//! configuration files with validation and defaults.

use crate::kernel::KernelGrid;
use crate::types::DifficultyTarget;
use crate::{Error, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kernel backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelBackend {
    /// wgpu compute grid
    Gpu,
    /// Lane-faithful CPU thread pool
    Cpu,
}

impl fmt::Display for KernelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelBackend::Gpu => write!(f, "gpu"),
            KernelBackend::Cpu => write!(f, "cpu"),
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Complete configuration for a search run
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "gridhash",
    version = env!("CARGO_PKG_VERSION"),
    about = "GPU-accelerated SHA-256 nonce search",
    long_about = "Searches the 32-bit nonce space for a SHA-256 digest with the requested \
                  number of leading zero bits, one compute-grid lane per candidate window, \
                  and re-checks every hit against a sequential reference digest"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(default)]
    pub print_config: bool,

    /// List available GPU adapters and exit
    #[arg(long)]
    #[serde(default)]
    pub list_devices: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Input data to search over
    #[arg(short = 'i', long)]
    pub input: Option<String>,

    /// Generate a random input instead of --input
    #[arg(long)]
    #[serde(default)]
    pub random_input: bool,

    /// Required leading zero bits in the leading digest word (0-32)
    #[arg(short = 'd', long, default_value = "4")]
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,

    /// Kernel backend
    #[arg(short = 'b', long, default_value = "gpu")]
    #[serde(default = "default_backend")]
    pub backend: KernelBackend,

    /// Compute grid width (lanes per row)
    #[arg(long, default_value = "32")]
    #[serde(default = "default_grid_dim")]
    pub grid_width: u32,

    /// Compute grid height (rows)
    #[arg(long, default_value = "32")]
    #[serde(default = "default_grid_dim")]
    pub grid_height: u32,

    /// Candidate nonces each lane tries per dispatch.
    ///
    /// Together with the grid this bounds per-dispatch work; large values
    /// can trip driver watchdogs on weaker devices.
    #[arg(long, default_value = "10")]
    #[serde(default = "default_nonces_per_lane")]
    pub nonces_per_lane: u32,

    /// Dispatch budget before the search reports exhaustion
    #[arg(long, default_value = "1000")]
    #[serde(default = "default_max_dispatches")]
    pub max_dispatches: u32,

    /// Threads for the CPU backend (0 = one per core)
    #[arg(short = 'c', long, default_value = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Override the embedded kernel source with a WGSL file
    #[arg(long, value_name = "FILE")]
    pub kernel_source: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Emit the run report as JSON
    #[arg(long)]
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from CLI, merging an optional config file
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    async fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config (CLI takes precedence)
    fn merge_with_file(mut self, file_config: Self) -> Self {
        if self.input.is_none() {
            self.input = file_config.input;
        }
        if self.kernel_source.is_none() {
            self.kernel_source = file_config.kernel_source;
        }
        // remaining fields keep CLI values (they include defaults)
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(Error::config("grid dimensions must be greater than 0"));
        }
        if self.grid_width > 4096 || self.grid_height > 4096 {
            return Err(Error::config("grid dimensions must be at most 4096"));
        }
        if self.nonces_per_lane == 0 {
            return Err(Error::config("nonces per lane must be greater than 0"));
        }
        if self.max_dispatches == 0 {
            return Err(Error::config("dispatch budget must be greater than 0"));
        }

        DifficultyTarget::LeadingZeroBits(self.difficulty).validate()?;

        // the whole budget must fit the 32-bit nonce domain so batches can
        // never alias already-searched nonces
        let total = self.max_dispatches as u64
            * self.grid().lane_count() as u64
            * self.nonces_per_lane as u64;
        if total > u32::MAX as u64 {
            return Err(Error::config(format!(
                "dispatch budget covers {} candidates, beyond the 32-bit nonce domain",
                total
            )));
        }

        Ok(())
    }

    /// Compute grid described by this configuration
    pub fn grid(&self) -> KernelGrid {
        KernelGrid::new(self.grid_width, self.grid_height)
    }
}

// Default value functions for serde
fn default_difficulty() -> u32 {
    4
}
fn default_backend() -> KernelBackend {
    KernelBackend::Gpu
}
fn default_grid_dim() -> u32 {
    32
}
fn default_nonces_per_lane() -> u32 {
    10
}
fn default_max_dispatches() -> u32 {
    1000
}
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(["gridhash"]).unwrap();

        assert_eq!(config.backend, KernelBackend::Gpu);
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.grid_width, 32);
        assert_eq!(config.grid_height, 32);
        assert_eq!(config.nonces_per_lane, 10);
        assert_eq!(config.max_dispatches, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_budget_covers_ten_million_candidates() {
        let config = Config::try_parse_from(["gridhash"]).unwrap();
        let total = config.max_dispatches as u64
            * config.grid().lane_count() as u64
            * config.nonces_per_lane as u64;
        assert_eq!(total, 10_240_000);
    }

    #[test]
    fn test_validation_rejects_bad_dimensions() {
        let config = Config::try_parse_from(["gridhash", "--grid-width", "0"]).unwrap();
        assert!(config.validate().is_err());

        let config = Config::try_parse_from(["gridhash", "--grid-height", "5000"]).unwrap();
        assert!(config.validate().is_err());

        let config = Config::try_parse_from(["gridhash", "--nonces-per-lane", "0"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_difficulty_beyond_word() {
        let config = Config::try_parse_from(["gridhash", "-d", "33"]).unwrap();
        assert!(config.validate().is_err());

        let config = Config::try_parse_from(["gridhash", "-d", "32"]).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_domain_overflowing_budget() {
        let config = Config::try_parse_from([
            "gridhash",
            "--grid-width",
            "1024",
            "--grid-height",
            "1024",
            "--nonces-per-lane",
            "1000",
            "--max-dispatches",
            "1000",
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = r#"
input: "hello"
backend: cpu
difficulty: 6
grid_width: 16
grid_height: 8
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(config.input.as_deref(), Some("hello"));
        assert_eq!(config.backend, KernelBackend::Cpu);
        assert_eq!(config.difficulty, 6);
        assert_eq!(config.grid().lane_count(), 128);
    }

    #[test]
    fn test_cli_input_wins_over_file() {
        let cli = Config::try_parse_from(["gridhash", "-i", "from-cli"]).unwrap();
        let mut file = Config::try_parse_from(["gridhash"]).unwrap();
        file.input = Some("from-file".to_string());
        file.kernel_source = Some(PathBuf::from("kernel.wgsl"));

        let merged = cli.merge_with_file(file);
        assert_eq!(merged.input.as_deref(), Some("from-cli"));
        // but the file fills gaps the CLI left open
        assert_eq!(merged.kernel_source, Some(PathBuf::from("kernel.wgsl")));
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(KernelBackend::Gpu.to_string(), "gpu");
        assert_eq!(KernelBackend::Cpu.to_string(), "cpu");
    }
}
