// Conversion routine: one source image in, one PNG plus insight out

use std::time::Instant;
use tracing::{debug, instrument};

use crate::core::errors::ConversionResult;
use crate::core::types::{ConvertedImage, SourceImage};
use crate::services::insight::InsightProvider;
use crate::utils::image_ops::{convert_to_png_async, to_data_url};
use crate::utils::Metrics;

/// Re-encodes images as PNG and attaches an insight from the injected provider
pub struct Converter<P> {
    insight: P,
    metrics: Option<Metrics>,
}

impl<P: InsightProvider> Converter<P> {
    pub fn new(insight: P, metrics: Option<Metrics>) -> Self {
        Self { insight, metrics }
    }

    pub fn insight_provider(&self) -> &P {
        &self.insight
    }

    /// Convert a single image.
    ///
    /// Decode/encode failures are returned as errors. Insight failures are
    /// not: the provider always yields text.
    #[instrument(skip(self, source), fields(id = %source.id, name = %source.name))]
    pub async fn convert(&self, source: &SourceImage) -> ConversionResult<ConvertedImage> {
        let start = Instant::now();
        let bytes_in = source.bytes.len() as u64;

        let png = match convert_to_png_async(source.bytes.clone()).await {
            Ok(png) => png,
            Err(e) => {
                if let Some(ref m) = self.metrics {
                    m.record_conversion(false, start.elapsed(), bytes_in, 0);
                }
                return Err(e);
            }
        };
        debug!(
            "Encoded {}x{} PNG ({} → {} bytes)",
            png.width,
            png.height,
            bytes_in,
            png.bytes.len()
        );

        let data_url = to_data_url(&source.bytes);
        let insight = self.insight.get_insight(&data_url, &source.name).await;

        if let Some(ref m) = self.metrics {
            m.record_conversion(true, start.elapsed(), bytes_in, png.bytes.len() as u64);
        }

        Ok(ConvertedImage {
            png: png.bytes,
            width: png.width,
            height: png.height,
            insight,
        })
    }
}
