pub mod download;
pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use download::{download_all, format_size, is_jpeg, png_file_name, write_png};
pub use image_ops::{convert_to_png_async, sniff_mime, to_data_url, PngImage};
pub use metrics::{InsightOutcome, Metrics, MetricsSnapshot};
