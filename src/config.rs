use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file structure for tttt.
///
/// Configuration files are loaded from the current directory or specified path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Checkout synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Result aggregation settings
    #[serde(default)]
    pub results: ResultsConfig,

    /// Sentinel identity for unattributed tests and commits
    #[serde(default)]
    pub authors: AuthorsConfig,

    /// Registry storage
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// How many days of commit log to scan for history (0 means 1)
    #[serde(default = "default_recent_days")]
    pub recent_days: u32,

    /// Pull attempts after the first failure
    #[serde(default = "default_pull_retries")]
    pub pull_retries: u32,

    /// Base delay between pull attempts; grows linearly per attempt
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Glob of descriptor files tracked by the checkout
    #[serde(default = "default_makefile_pattern")]
    pub makefile_pattern: String,

    /// Maximum number of concurrent `git log` reads
    #[serde(default = "default_log_concurrency")]
    pub log_concurrency: usize,

    /// Gitweb-style base URL; repository links become `{base}/{repository}`
    pub web_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultsConfig {
    /// Test that holds a machine for manual inspection
    #[serde(default = "default_reserve_test")]
    pub reserve_test: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthorsConfig {
    #[serde(default = "default_author_name")]
    pub default_name: String,

    #[serde(default = "default_author_email")]
    pub default_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryConfig {
    /// Registry file; defaults to the platform data directory
    pub path: Option<PathBuf>,

    /// How long a command waits for another process holding the registry
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Output format (summary, json, csv)
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recent_days: default_recent_days(),
            pull_retries: default_pull_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            makefile_pattern: default_makefile_pattern(),
            log_concurrency: default_log_concurrency(),
            web_base_url: None,
        }
    }
}

impl SyncConfig {
    /// History window in days; an unset window scans one day.
    pub fn effective_recent_days(&self) -> u32 {
        self.recent_days.max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: None,
            lock_timeout_seconds: default_lock_timeout_seconds(),
        }
    }
}

impl RegistryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            reserve_test: default_reserve_test(),
        }
    }
}

impl Default for AuthorsConfig {
    fn default() -> Self {
        Self {
            default_name: default_author_name(),
            default_email: default_author_email(),
        }
    }
}

fn default_recent_days() -> u32 {
    1
}

fn default_pull_retries() -> u32 {
    5
}

fn default_retry_delay_seconds() -> u64 {
    10
}

fn default_makefile_pattern() -> String {
    "*Makefile".to_string()
}

fn default_log_concurrency() -> usize {
    8
}

fn default_lock_timeout_seconds() -> u64 {
    60
}

fn default_reserve_test() -> String {
    "/distribution/reservesys".to_string()
}

fn default_author_name() -> String {
    "Unknown".to_string()
}

fn default_author_email() -> String {
    "unknown@example.com".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./tttt.toml
    /// 3. ./tttt.json
    /// 4. ./tttt.yaml
    /// 5. ./tttt.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["tttt.toml", "tttt.json", "tttt.yaml", "tttt.yml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
