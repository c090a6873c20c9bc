// Library exports for the JPG → PNG conversion workflow
//
// Queue images, convert them one at a time, attach a short Gemini insight
// to each converted image.

pub mod core;
pub mod orchestration;
pub mod queue;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::{Config, InsightConfig},
    errors::{ConfigError, ConversionError, InsightError, OutputError, QueueError},
    types::{
        BatchReport, ItemId, ItemReport, ItemStatus, Progress, QueueItem, SourceFile, StatusKind,
    },
};

pub use orchestration::BatchOrchestrator;

pub use queue::{handles::HandleRegistry, DisplayHandle, ImageQueue, SharedQueue};

pub use services::{Converter, GeminiInsightClient, InsightProvider, OfflineInsight};

pub use utils::{download_all, format_size, png_file_name, Metrics};
