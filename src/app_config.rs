use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language (ISO code or English name)
    pub source_language: String,

    /// Target language (ISO code or English name)
    pub target_language: String,

    /// Free-form hint passed to the model (genre, character names, ...)
    #[serde(default)]
    pub context_hint: String,

    /// API keys, rotated round-robin
    #[serde(default)]
    pub credentials: Vec<String>,

    /// Model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Batch sizing
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Rolling context window settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Prompt settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Output file naming
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Model provider configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Model name
    #[serde(default = "default_model")]
    pub model: String,

    // @field: Service URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // @field: Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    // @field: Nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    // @field: Top-k sampling
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    // @field: Output token cap
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Queue configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    /// Maximum number of files translated at the same time
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

/// Unit the per-batch budget is measured in
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    #[default]
    Chars,
    Tokens,
}

/// Batch sizing configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum cues per batch
    #[serde(default = "default_max_units_per_batch")]
    pub max_units_per_batch: usize,

    /// Maximum cost per batch, in `budget_unit`
    #[serde(default = "default_max_chars_per_batch")]
    pub max_chars_per_batch: usize,

    /// How cue cost is measured
    #[serde(default)]
    pub budget_unit: BudgetUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_units_per_batch: default_max_units_per_batch(),
            max_chars_per_batch: default_max_chars_per_batch(),
            budget_unit: BudgetUnit::default(),
        }
    }
}

/// Rolling context window configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContextConfig {
    /// Number of most recent translated cues kept
    #[serde(default = "default_context_max_cues")]
    pub max_cues: usize,

    /// Character cap on the digest
    #[serde(default = "default_context_max_chars")]
    pub max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_cues: default_context_max_cues(),
            max_chars: default_context_max_chars(),
        }
    }
}

/// Retry and backoff configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Retries granted to a batch for transient failures
    #[serde(default = "default_transient_retry_ceiling")]
    pub transient_retry_ceiling: u32,

    /// Linear backoff step for transient failures (ms)
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,

    /// Base delay for rate limit backoff, doubled per consecutive hit (ms)
    #[serde(default = "default_rate_limit_base_ms")]
    pub rate_limit_base_ms: u64,

    /// Cap on the rate limit backoff (ms)
    #[serde(default = "default_rate_limit_max_ms")]
    pub rate_limit_max_ms: u64,

    /// Random extra delay, as a fraction of the computed delay
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Consecutive rate limits on one credential before it is treated as out of quota
    #[serde(default = "default_quota_exhaustion_after")]
    pub quota_exhaustion_after: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_retry_ceiling: default_transient_retry_ceiling(),
            transient_backoff_ms: default_transient_backoff_ms(),
            rate_limit_base_ms: default_rate_limit_base_ms(),
            rate_limit_max_ms: default_rate_limit_max_ms(),
            jitter_ratio: default_jitter_ratio(),
            quota_exhaustion_after: default_quota_exhaustion_after(),
        }
    }
}

/// Prompt configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PromptConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prefix put in front of cues left untranslated after a failed batch
    #[serde(default)]
    pub fallback_marker: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            fallback_marker: None,
        }
    }
}

/// Output naming configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// File name prefix of the translated file
    #[serde(default = "default_output_prefix")]
    pub prefix: String,

    /// Append `_YYYYmmdd_HHMMSS` to the output stem
    #[serde(default)]
    pub timestamp_suffix: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: default_output_prefix(),
            timestamp_suffix: false,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    0.95
}

fn default_top_k() -> u32 {
    64
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_concurrency_limit() -> usize {
    2
}

fn default_max_units_per_batch() -> usize {
    40
}

fn default_max_chars_per_batch() -> usize {
    4000
}

fn default_context_max_cues() -> usize {
    10
}

fn default_context_max_chars() -> usize {
    1000
}

fn default_transient_retry_ceiling() -> u32 {
    3
}

fn default_transient_backoff_ms() -> u64 {
    2000
}

fn default_rate_limit_base_ms() -> u64 {
    30_000
}

fn default_rate_limit_max_ms() -> u64 {
    300_000
}

fn default_jitter_ratio() -> f64 {
    0.1
}

fn default_quota_exhaustion_after() -> u32 {
    5
}

fn default_output_prefix() -> String {
    "output_".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional subtitle translator. Translate the following subtitle entries from {source_language} to {target_language}. Fix capitalization where needed, preserve any formatting tags, and keep the original tone and style.".to_string()
}

impl Config {
    /// Load a configuration file, or write the default one when it does not exist yet
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok((config, false));
        }

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;

        Ok((config, true))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::prompt_language_name(&self.source_language)
            .context("Invalid source language")?;
        crate::language_utils::prompt_language_name(&self.target_language)
            .context("Invalid target language")?;

        if self.credentials.iter().all(|key| key.trim().is_empty()) {
            return Err(anyhow!("At least one API key must be provided"));
        }
        if self.queue.concurrency_limit == 0 {
            return Err(anyhow!("queue.concurrency_limit must be at least 1"));
        }
        if self.chunking.max_units_per_batch == 0 || self.chunking.max_chars_per_batch == 0 {
            return Err(anyhow!("chunking limits must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(anyhow!("retry.jitter_ratio must be between 0.0 and 1.0"));
        }
        if self.output.prefix.is_empty() {
            return Err(anyhow!("output.prefix must not be empty"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "pt".to_string(),
            context_hint: String::new(),
            credentials: Vec::new(),
            provider: ProviderConfig::default(),
            queue: QueueConfig::default(),
            chunking: ChunkingConfig::default(),
            context: ContextConfig::default(),
            retry: RetryConfig::default(),
            prompt: PromptConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
