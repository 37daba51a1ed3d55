//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub sequencer: SequencerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub quiescence: QuiescenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the engine logs are and which lines to read
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Dataset name printed after each tag, if the engine prints one
    pub dataset: Option<String>,

    #[serde(default = "default_capture_errors")]
    pub capture_errors: bool,

    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_pattern() -> String {
    "*".to_string()
}

fn default_capture_errors() -> bool {
    true
}

fn default_max_parallel_files() -> usize {
    8
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            pattern: default_pattern(),
            dataset: None,
            capture_errors: default_capture_errors(),
            max_parallel_files: default_max_parallel_files(),
        }
    }
}

/// External sort configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    /// Events held in memory before a run is spilled to disk
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: usize,

    /// Parent directory for spill runs (system temp dir if unset)
    pub spill_dir: Option<PathBuf>,
}

fn default_spill_threshold() -> usize {
    1_000_000
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            spill_threshold: default_spill_threshold(),
            spill_dir: None,
        }
    }
}

/// Generation table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Events further than this past the last known generation are dropped
    #[serde(default = "default_max_generation_gap")]
    pub max_generation_gap: u64,
}

fn default_max_generation_gap() -> u64 {
    crate::metrics::DEFAULT_MAX_GENERATION_GAP
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_generation_gap: default_max_generation_gap(),
        }
    }
}

/// Artifact output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_task_name")]
    pub task_name: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./out")
}

fn default_task_name() -> String {
    "run".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            task_name: default_task_name(),
        }
    }
}

/// Engine flag files checked once before reading
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuiescenceConfig {
    pub flush_flag: Option<PathBuf>,
    pub merge_flag: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("lsmtrace").join("config.toml")),
            Some(PathBuf::from("./lsmtrace.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `LSMTRACE_*` overrides from `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Source overrides
        if let Some(dir) = lookup("LSMTRACE_LOG_DIR") {
            self.source.log_dir = PathBuf::from(dir);
        }
        if let Some(pattern) = lookup("LSMTRACE_PATTERN") {
            self.source.pattern = pattern;
        }
        if let Some(dataset) = lookup("LSMTRACE_DATASET") {
            self.source.dataset = Some(dataset).filter(|d| !d.is_empty());
        }

        // Sequencer overrides
        if let Some(threshold) = lookup("LSMTRACE_SPILL_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.sequencer.spill_threshold = t;
            }
        }

        // Metrics overrides
        if let Some(gap) = lookup("LSMTRACE_MAX_GENERATION_GAP") {
            if let Ok(g) = gap.parse() {
                self.metrics.max_generation_gap = g;
            }
        }

        // Output overrides
        if let Some(dir) = lookup("LSMTRACE_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(task) = lookup("LSMTRACE_TASK") {
            self.output.task_name = task;
        }

        // Logging overrides
        if let Some(level) = lookup("LSMTRACE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LSMTRACE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# lsmtrace Configuration
#
# Environment variables override these settings:
# - LSMTRACE_LOG_DIR
# - LSMTRACE_PATTERN
# - LSMTRACE_DATASET
# - LSMTRACE_SPILL_THRESHOLD
# - LSMTRACE_MAX_GENERATION_GAP
# - LSMTRACE_OUTPUT_DIR
# - LSMTRACE_TASK
# - LSMTRACE_LOG_LEVEL
# - LSMTRACE_LOG_FORMAT

[source]
# Directory holding the engine's log files
log_dir = "./logs"

# File name glob; *.gz, *.lz4 and *.zip files are decompressed
pattern = "*"

# Dataset name printed after each tag (omit if the engine prints none)
# dataset = "usertable"

# Copy ERROR blocks to <task>.err
capture_errors = true

# Files read concurrently
max_parallel_files = 8

[sequencer]
# Events kept in memory before sorting spills to disk
spill_threshold = 1000000

# Parent directory for spill files (defaults to the system temp dir)
# spill_dir = "/tmp"

[metrics]
# Events for a generation this far past the last known one are treated as
# garbled and dropped
max_generation_gap = 1000000

[output]
# Directory for the artifacts
dir = "./out"

# Artifact name prefix
task_name = "run"

[quiescence]
# Flag files the engine keeps while a flush or merge is running.
# If set, the run refuses to start while either one exists.
# flush_flag = "/path/to/is_flushing"
# merge_flag = "/path/to/is_merging"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "lsmtrace.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.source.pattern, "*");
        assert!(config.source.capture_errors);
        assert_eq!(config.sequencer.spill_threshold, 1_000_000);
        assert_eq!(config.output.task_name, "run");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.quiescence.flush_flag.is_none());
    }

    #[test]
    fn test_default_template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.source.log_dir, defaults.source.log_dir);
        assert_eq!(parsed.source.max_parallel_files, defaults.source.max_parallel_files);
        assert_eq!(parsed.sequencer.spill_threshold, defaults.sequencer.spill_threshold);
        assert_eq!(parsed.metrics.max_generation_gap, defaults.metrics.max_generation_gap);
        assert_eq!(parsed.output.dir, defaults.output.dir);
        assert_eq!(parsed.logging.level, defaults.logging.level);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lsmtrace.toml");
        std::fs::write(
            &path,
            "[source]\nlog_dir = \"/data/logs\"\ndataset = \"usertable\"\n\n[sequencer]\nspill_threshold = 500\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.log_dir, PathBuf::from("/data/logs"));
        assert_eq!(config.source.dataset.as_deref(), Some("usertable"));
        assert_eq!(config.source.pattern, "*");
        assert_eq!(config.sequencer.spill_threshold, 500);
        assert_eq!(config.output.task_name, "run");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[source\nlog_dir = 3").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LSMTRACE_LOG_DIR", "/var/log/engine"),
            ("LSMTRACE_TASK", "ycsb-a"),
            ("LSMTRACE_SPILL_THRESHOLD", "not-a-number"),
            ("LSMTRACE_LOG_FORMAT", "json"),
            ("LSMTRACE_MAX_GENERATION_GAP", "5000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.source.log_dir, PathBuf::from("/var/log/engine"));
        assert_eq!(config.output.task_name, "ycsb-a");
        assert_eq!(config.sequencer.spill_threshold, 1_000_000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.metrics.max_generation_gap, 5000);
    }
}
