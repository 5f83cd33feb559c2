use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};
use url::Url;

use crate::key_rotation::RotationStrategy;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO, or "auto")
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Credential store config
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Text layout config
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Worker pool config
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation backend type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    // @backend: Google Gemini generateContent
    #[default]
    Gemini,
    // @backend: Offline echo backend, useful for dry runs
    Mock,
}

impl BackendKind {
    // @returns: Capitalized backend name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase backend identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Gemini => "gemini".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid backend type: {}", s)),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Backend used for translation calls
    #[serde(default)]
    pub backend: BackendKind,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Service endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Timeout for a single backend call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries of a timed-out or failed call before the fallback chain moves on
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff between retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Chunk size used when a mega-batch fails and is retried in parts
    #[serde(default = "default_sub_batch_size")]
    pub sub_batch_size: usize,

    /// Whether translations are memoized
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Upper bound on cached entries
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Extra instructions appended to every batch prompt
    #[serde(default)]
    pub custom_prompt: Option<String>,

    /// Backend tried after every strategy of the primary one has failed
    #[serde(default)]
    pub fallback_backend: Option<BackendKind>,

    /// Model of the fallback backend, the primary model when unset
    #[serde(default)]
    pub fallback_model: Option<String>,

    /// Pre-fill the cache with stock greetings and sound effects
    #[serde(default = "default_true")]
    pub seed_common_phrases: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sub_batch_size: default_sub_batch_size(),
            cache_enabled: true,
            cache_max_entries: default_cache_max_entries(),
            temperature: default_temperature(),
            custom_prompt: None,
            fallback_backend: None,
            fallback_model: None,
            seed_common_phrases: true,
        }
    }
}

/// Credential store configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CredentialConfig {
    /// Path of the persisted credential file
    #[serde(default = "default_credentials_file")]
    pub file: PathBuf,

    /// Selection strategy used when the file does not specify one
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            file: default_credentials_file(),
            rotation_strategy: RotationStrategy::default(),
        }
    }
}

/// Parameters of the font-size search
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Smallest readable font size
    #[serde(default = "default_min_font_size")]
    pub min_font_size: f32,

    /// Upper clamp for the starting font size
    #[serde(default = "default_max_font_size")]
    pub max_font_size: f32,

    /// Decrement applied per search round
    #[serde(default = "default_font_step")]
    pub font_step: f32,

    /// Hard cap on search rounds
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Fraction of the region width a line may occupy
    #[serde(default = "default_width_fill")]
    pub width_fill: f32,

    /// Fraction of the region height the text block may occupy
    #[serde(default = "default_height_fill")]
    pub height_fill: f32,

    /// Average glyph advance as a fraction of the font size
    #[serde(default = "default_glyph_width_factor")]
    pub glyph_width_factor: f32,

    /// Line height as a multiple of the font size
    #[serde(default = "default_line_height_factor")]
    pub line_height_factor: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_font_size: default_min_font_size(),
            max_font_size: default_max_font_size(),
            font_step: default_font_step(),
            max_attempts: default_max_attempts(),
            width_fill: default_width_fill(),
            height_fill: default_height_fill(),
            glyph_width_factor: default_glyph_width_factor(),
            line_height_factor: default_line_height_factor(),
        }
    }
}

/// Worker pool and stage timeout configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Concurrent images in the detection/OCR phase
    #[serde(default = "default_workers")]
    pub extraction_workers: usize,

    /// Concurrent images in the layout/compositing phase
    #[serde(default = "default_workers")]
    pub compositing_workers: usize,

    /// Pages sharing one mega-batch
    #[serde(default = "default_max_pages_per_run")]
    pub max_pages_per_run: usize,

    /// Timeout for a detection or OCR call, in seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Retries for a detection or OCR call
    #[serde(default = "default_retry_count")]
    pub stage_retry_count: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction_workers: default_workers(),
            compositing_workers: default_workers(),
            max_pages_per_run: default_max_pages_per_run(),
            stage_timeout_secs: default_stage_timeout_secs(),
            stage_retry_count: default_retry_count(),
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
    /// Matching `log` filter
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

fn default_source_language() -> String {
    "auto".to_string()
}

fn default_target_language() -> String {
    "vi".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_sub_batch_size() -> usize {
    10
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_credentials_file() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("mangatl").join("api_keys.json"))
        .unwrap_or_else(|| PathBuf::from("api_keys.json"))
}

fn default_min_font_size() -> f32 {
    10.0
}

fn default_max_font_size() -> f32 {
    36.0
}

fn default_font_step() -> f32 {
    1.0
}

fn default_max_attempts() -> usize {
    40
}

fn default_width_fill() -> f32 {
    0.85
}

fn default_height_fill() -> f32 {
    0.90
}

fn default_glyph_width_factor() -> f32 {
    0.55
}

fn default_line_height_factor() -> f32 {
    1.2
}

fn default_workers() -> usize {
    6
}

fn default_max_pages_per_run() -> usize {
    20
}

fn default_stage_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load a configuration file, or write and return the defaults if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        log::warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.source_language != "auto" {
            crate::language_utils::get_language_name(&self.source_language)?;
        }
        crate::language_utils::get_language_name(&self.target_language)?;

        let uses_gemini = self.translation.backend == BackendKind::Gemini
            || self.translation.fallback_backend == Some(BackendKind::Gemini);
        if uses_gemini {
            Url::parse(&self.translation.endpoint)
                .with_context(|| format!("Invalid translation endpoint: {}", self.translation.endpoint))?;
            if self.translation.model.trim().is_empty() {
                return Err(anyhow!("A model name is required for the Gemini backend"));
            }
        }
        if self.translation.fallback_model.as_deref().is_some_and(|model| model.trim().is_empty()) {
            return Err(anyhow!("fallback_model must not be empty when set"));
        }

        if self.translation.sub_batch_size == 0 {
            return Err(anyhow!("sub_batch_size must be at least 1"));
        }
        if self.translation.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be at least 1"));
        }

        let layout = &self.layout;
        if layout.min_font_size <= 0.0 || layout.min_font_size > layout.max_font_size {
            return Err(anyhow!(
                "Invalid font size range: {} - {}",
                layout.min_font_size,
                layout.max_font_size
            ));
        }
        if layout.font_step <= 0.0 || layout.max_attempts == 0 {
            return Err(anyhow!("Layout search needs a positive step and at least one attempt"));
        }
        if layout.max_font_size > layout.min_font_size && layout.max_attempts < 2 {
            return Err(anyhow!(
                "max_attempts must be at least 2 to try both ends of the font size range"
            ));
        }
        if !(0.0..=1.0).contains(&layout.width_fill) || !(0.0..=1.0).contains(&layout.height_fill) {
            return Err(anyhow!("Layout fill ratios must be within 0.0 and 1.0"));
        }

        if self.pipeline.extraction_workers == 0
            || self.pipeline.compositing_workers == 0
            || self.pipeline.max_pages_per_run == 0
        {
            return Err(anyhow!("Worker counts and pages per run must be at least 1"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            credentials: CredentialConfig::default(),
            layout: LayoutConfig::default(),
            pipeline: PipelineConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
