//! Tessera Configuration
//!
//! Handles loading configuration from:
//! 1. TS_CONFIG env var (explicit path)
//! 2. ./tessera.toml (current directory)
//! 3. ~/.tessera/tessera.toml (user home)
//!
//! Environment variables take precedence over TOML config. The loaded value
//! is handed to whoever needs it; nothing is cached process-wide.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "tessera.toml";
const CONFIG_DIR_NAME: &str = ".tessera";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_INGRESS_URL: &str = "http://127.0.0.1:18516";
const DEFAULT_INGRESS_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LEDGER_PATH: &str = "./tessera-ledger";
const DEFAULT_PODS_PATH: &str = "./pods.json";

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraConfig {
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub mapper: MapperConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Order ingress endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "default_ingress_url")]
    pub url: String,
    #[serde(default = "default_ingress_timeout")]
    pub timeout_secs: u64,
}

impl IngressConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INGRESS_URL.into(),
            timeout_secs: DEFAULT_INGRESS_TIMEOUT_SECS,
        }
    }
}

fn default_ingress_url() -> String {
    DEFAULT_INGRESS_URL.into()
}

fn default_ingress_timeout() -> u64 {
    DEFAULT_INGRESS_TIMEOUT_SECS
}

/// Local order ledger storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_LEDGER_PATH.into(),
        }
    }
}

fn default_ledger_path() -> String {
    DEFAULT_LEDGER_PATH.into()
}

/// Pod mapping behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Fail the whole submission when any pod fails
    #[serde(default)]
    pub all_or_nothing: bool,
    /// Worker threads for pod mapping; 0 uses one per core
    #[serde(default)]
    pub worker_threads: usize,
}

/// Pod directory snapshot source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_pods_path")]
    pub pods_path: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            pods_path: DEFAULT_PODS_PATH.into(),
        }
    }
}

fn default_pods_path() -> String {
    DEFAULT_PODS_PATH.into()
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparsable {}={:?}", key, v),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl TesseraConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("TS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("TS_CONFIG points at missing file: {}", path.display());
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("TS_INGRESS_URL", &mut self.ingress.url);
        env_parse("TS_INGRESS_TIMEOUT_SECS", &mut self.ingress.timeout_secs);

        env_string("TS_LEDGER_PATH", &mut self.ledger.path);

        if let Some(v) = env_bool("TS_ALL_OR_NOTHING") {
            self.mapper.all_or_nothing = v;
        }
        env_parse("TS_WORKER_THREADS", &mut self.mapper.worker_threads);

        env_string("TS_PODS_PATH", &mut self.directory.pods_path);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
