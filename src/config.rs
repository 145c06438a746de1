//! Configuration for ticketai.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ENVIRONMENT, LOG_LEVEL, MAX_INPUT_LENGTH,
//!    TICKETAI_PROVIDER, TICKETAI_MODEL, TICKETAI_ENDPOINT)
//! 2. Config file
//! 3. Defaults
//!
//! Config file discovery:
//! - `--config <path>` if given
//! - `$TICKETAI_CONFIG`
//! - `.ticketai/config.yaml` in the current directory or any parent
//! - `~/.ticketai/config.yaml`
//!
//! The model API key is never part of the file; it is read from the
//! environment variable named by `model.api_key_env`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{ModelSettings, ProviderKind};
use crate::core::cache::CacheSettings;
use crate::core::circuit_breaker::CircuitBreakerSettings;
use crate::core::cost::BudgetSettings;
use crate::core::prompt::PROMPT_VERSION;
use crate::core::rate_limit::RateLimitSettings;
use crate::core::safety::InputLimits;
use crate::domain::Taxonomy;

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "TICKETAI_CONFIG";

const CONFIG_DIR: &str = ".ticketai";
const CONFIG_FILE: &str = "config.yaml";

/// Smallest accepted `max_input_length`
const MIN_INPUT_LENGTH: usize = 100;

const ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// Full service configuration (matches the YAML structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// development | staging | production
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Default log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prompt template version (part of the cache key)
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,

    /// Confidence below this forces human review (default: 0.5)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default)]
    pub input: InputLimits,

    #[serde(default)]
    pub taxonomy: Taxonomy,

    #[serde(default)]
    pub model: ModelSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub budget: BudgetSettings,
}

fn default_environment() -> String {
    "development".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_prompt_version() -> String {
    PROMPT_VERSION.to_string()
}
fn default_confidence_threshold() -> f64 {
    0.5
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            prompt_version: default_prompt_version(),
            confidence_threshold: default_confidence_threshold(),
            input: InputLimits::default(),
            taxonomy: Taxonomy::default(),
            model: ModelSettings::default(),
            rate_limit: RateLimitSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            cache: CacheSettings::default(),
            budget: BudgetSettings::default(),
        }
    }
}

/// Configuration together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TriageConfig,
    /// Path to config file (if found)
    pub source: Option<PathBuf>,
}

impl TriageConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(environment) = lookup("ENVIRONMENT") {
            self.environment = environment.trim().to_ascii_lowercase();
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.trim().to_ascii_lowercase();
        }
        if let Some(raw) = lookup("MAX_INPUT_LENGTH") {
            self.input.max_input_length = raw
                .trim()
                .parse()
                .with_context(|| format!("MAX_INPUT_LENGTH is not a number: {}", raw))?;
        }
        if let Some(provider) = lookup("TICKETAI_PROVIDER") {
            self.model.provider = match provider.trim().to_ascii_lowercase().as_str() {
                "mock" => ProviderKind::Mock,
                "live" | "http" => ProviderKind::Live,
                other => bail!("TICKETAI_PROVIDER must be 'mock' or 'live', got '{}'", other),
            };
        }
        if let Some(model) = lookup("TICKETAI_MODEL") {
            self.model.model = model;
        }
        if let Some(endpoint) = lookup("TICKETAI_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        Ok(())
    }

    /// Fail fast on settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !ENVIRONMENTS.contains(&self.environment.as_str()) {
            bail!(
                "environment must be one of {}, got '{}'",
                ENVIRONMENTS.join(", "),
                self.environment
            );
        }
        if self.input.max_input_length < MIN_INPUT_LENGTH {
            bail!(
                "input.max_input_length must be at least {}, got {}",
                MIN_INPUT_LENGTH,
                self.input.max_input_length
            );
        }
        if self.input.hard_ceiling_chars < self.input.max_input_length {
            bail!(
                "input.hard_ceiling_chars ({}) must not be below input.max_input_length ({})",
                self.input.hard_ceiling_chars,
                self.input.max_input_length
            );
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if self.prompt_version.trim().is_empty() {
            bail!("prompt_version must not be empty");
        }
        self.taxonomy.validate().context("Invalid taxonomy")?;

        if self.model.timeout_seconds == 0 {
            bail!("model.timeout_seconds must be greater than 0");
        }
        if self.model.max_output_tokens == 0 {
            bail!("model.max_output_tokens must be greater than 0");
        }
        if self.model.retry.backoff_multiplier < 1.0 {
            bail!("model.retry.backoff_multiplier must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.model.retry.jitter) {
            bail!("model.retry.jitter must be within [0, 1]");
        }
        if self.model.provider == ProviderKind::Live && self.model.endpoint.is_none() {
            bail!("model.endpoint is required when model.provider is 'live'");
        }
        if self.rate_limit.per_minute == 0 || self.rate_limit.window_seconds == 0 {
            bail!("rate_limit.per_minute and rate_limit.window_seconds must be greater than 0");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            bail!("circuit_breaker.failure_threshold must be greater than 0");
        }
        if self.budget.period_seconds == 0 {
            bail!("budget.period_seconds must be greater than 0");
        }
        Ok(())
    }
}

/// Find config file by searching current directory and parents, then home
fn find_config_file() -> Option<PathBuf> {
    if let Ok(current) = std::env::current_dir() {
        if let Some(found) = search_upwards(&current) {
            return Some(found);
        }
    }

    let home_config = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

fn search_upwards(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<TriageConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from all sources and validate it
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => find_config_file(),
        },
    };

    let mut config = match source {
        Some(ref path) => load_config_file(path)?,
        None => TriageConfig::default(),
    };

    config.apply_env_overrides()?;
    config.validate()?;

    Ok(LoadedConfig { config, source })
}
