// Error types for the conversion workflow
//
// One thiserror enum per concern:
// - Conversion failures become an item-level `Error` status
// - Insight failures never leave the insight client
// - Queue and output errors surface to the caller

use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::ItemId;

/// Image conversion errors (decode → surface → PNG encode)
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to decode source image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode PNG: {source}")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    #[error("Cannot acquire a {width}x{height} raster surface")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("Blocking conversion task failed: {0}")]
    TaskJoin(String),
}

/// Insight client errors (absorbed into a fallback sentence by the client)
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("No API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Queue and orchestration errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("A batch is already being processed")]
    AlreadyRunning,
}

/// Download / output errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Item {0} has no converted PNG yet")]
    NotCompleted(ItemId),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Temperature must be in [0.0, 2.0], got {0}")]
    InvalidTemperature(f32),

    #[error("top_p must be in (0.0, 1.0], got {0}")]
    InvalidTopP(f32),

    #[error("top_k must be > 0")]
    InvalidTopK,

    #[error("API timeout must be > 0 seconds")]
    InvalidTimeout,

    #[error("Insight model name must not be empty")]
    EmptyModel,

    #[error("Environment variable parsing failed: {0}")]
    EnvVarError(String),
}

pub type ConversionResult<T> = Result<T, ConversionError>;
pub type InsightResult<T> = Result<T, InsightError>;
pub type QueueResult<T> = Result<T, QueueError>;
pub type OutputResult<T> = Result<T, OutputError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
