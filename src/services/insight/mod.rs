pub mod api_client;

use std::future::Future;
use std::sync::Arc;

pub use api_client::GeminiInsightClient;

/// Instruction sent alongside every image
pub const INSIGHT_PROMPT: &str = "Analyze this image and provide a brief, professional insight \
(2 sentences) on why converting it to PNG might be beneficial (e.g., transparency support, \
lossless quality for graphics, etc.).";

/// Returned when the model answers without any text
pub const EMPTY_RESPONSE_INSIGHT: &str =
    "PNG offers lossless compression, making it ideal for maintaining high image quality.";

/// Returned when the request fails for any reason
pub const FAILURE_INSIGHT: &str =
    "Converting to PNG ensures lossless compression and compatibility for web graphics.";

/// Source of per-image insight text.
///
/// `get_insight` is total: implementations absorb their own failures and
/// always produce a sentence.
pub trait InsightProvider {
    /// `data_url` is the image as a `data:<mime>;base64,...` URL (a bare base64
    /// payload is accepted too); `display_name` is only used for diagnostics.
    fn get_insight(
        &self,
        data_url: &str,
        display_name: &str,
    ) -> impl Future<Output = String> + Send;
}

impl<P> InsightProvider for Arc<P>
where
    P: InsightProvider + Send + Sync,
{
    fn get_insight(
        &self,
        data_url: &str,
        display_name: &str,
    ) -> impl Future<Output = String> + Send {
        (**self).get_insight(data_url, display_name)
    }
}

/// Provider that never leaves the process; used when insights are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineInsight;

impl InsightProvider for OfflineInsight {
    async fn get_insight(&self, _data_url: &str, _display_name: &str) -> String {
        EMPTY_RESPONSE_INSIGHT.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_provider_returns_default_sentence() {
        let provider = Arc::new(OfflineInsight);
        let text = provider.get_insight("data:image/jpeg;base64,AAAA", "a.jpg").await;
        assert_eq!(text, EMPTY_RESPONSE_INSIGHT);
        assert!(!text.is_empty());
    }
}
