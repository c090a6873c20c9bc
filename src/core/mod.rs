pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, EnvFile, InsightConfig, OutputConfig};
pub use errors::{ConfigError, ConversionError, InsightError, OutputError, QueueError};
pub use types::{
    BatchReport, Conversion, ConvertedImage, ItemId, ItemReport, ItemStatus, Progress, QueueItem,
    SourceFile, SourceImage, StatusKind,
};
