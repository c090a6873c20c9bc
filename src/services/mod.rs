pub mod conversion;
pub mod insight;

// Re-export commonly used services
pub use conversion::Converter;
pub use insight::{GeminiInsightClient, InsightProvider, OfflineInsight};
