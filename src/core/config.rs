use crate::core::errors::{ConfigError, ConfigResult};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_INSIGHT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Insight client configuration (credential, model and sampling)
#[derive(Debug, Clone)]
pub struct InsightConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub timeout: Duration,
    pub enabled: bool,
}

impl InsightConfig {
    /// Insight configuration with the stock model and sampling parameters
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: DEFAULT_INSIGHT_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            timeout: Duration::from_secs(60),
            enabled: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigError::InvalidTopP(self.top_p));
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Where downloaded PNGs are written
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
}

/// What happened to the `.env` file while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    /// No `.env` was found, or none was consulted
    Absent,
    /// A `.env` exists but could not be read or parsed
    Invalid(String),
}

impl EnvFile {
    fn from_result(result: dotenvy::Result<PathBuf>) -> Self {
        match result {
            Ok(path) => EnvFile::Loaded(path),
            Err(e) if e.not_found() => EnvFile::Absent,
            Err(e) => EnvFile::Invalid(e.to_string()),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub insight: InsightConfig,
    pub output: OutputConfig,
    pub log_level: Level,
    pub env_file: EnvFile,
}

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load .env file if it exists; logging is not up yet, so keep the outcome
        let env_file = EnvFile::from_result(dotenvy::dotenv());

        let mut config = Self::from_lookup(|key| env::var(key).ok())?;
        config.env_file = env_file;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from any key lookup (the process environment in `new`)
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let log_level = lookup("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Ok(Self {
            insight: InsightConfig {
                api_key,
                model: lookup("INSIGHT_MODEL").unwrap_or_else(|| DEFAULT_INSIGHT_MODEL.to_string()),
                base_url: lookup("GEMINI_BASE_URL")
                    .map(|s| s.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                temperature: parse_var(&lookup, "INSIGHT_TEMPERATURE", 0.7)?,
                top_k: parse_var(&lookup, "INSIGHT_TOP_K", 40)?,
                top_p: parse_var(&lookup, "INSIGHT_TOP_P", 0.95)?,
                timeout: Duration::from_secs(parse_var(&lookup, "API_TIMEOUT_SECONDS", 60)?),
                enabled: parse_var(&lookup, "INSIGHTS_ENABLED", true)?,
            },
            output: OutputConfig {
                output_dir: lookup("OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            },
            log_level,
            env_file: EnvFile::Absent,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.insight.validate()
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }

    pub fn insights_enabled(&self) -> bool {
        self.insight.enabled
    }

    pub fn api_key(&self) -> Option<&str> {
        self.insight.api_key.as_deref()
    }
}

// Note: No Default implementation because Config::new() can fail

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> ConfigResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarError(format!("{}={:?} is not valid", key, raw))),
    }
}
