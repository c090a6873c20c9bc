// Download naming and writing of converted PNGs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::errors::{OutputError, OutputResult};
use crate::core::types::{ItemId, QueueItem};
use crate::queue::ImageQueue;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Output name for a converted file: last extension replaced by `.png`.
///
/// `photo.jpg` → `photo.png`, `archive.tar.jpeg` → `archive.tar.png`,
/// `README` → `README.png`.
pub fn png_file_name(name: &str) -> String {
    let stem = match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains('/') => &name[..dot],
        _ => name,
    };
    format!("{}.png", stem)
}

/// Human readable byte count (1024-based, at most one decimal)
pub fn format_size(bytes: u64) -> String {
    const SIZES: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(SIZES.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let rounded = (value * 10.0).round() / 10.0;

    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, SIZES[exp])
    } else {
        format!("{:.1} {}", rounded, SIZES[exp])
    }
}

/// Whether a picked file looks like a JPEG (magic bytes or extension)
pub fn is_jpeg(name: &str, bytes: &[u8]) -> bool {
    if bytes.starts_with(&JPEG_MAGIC) {
        return true;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// Write a completed item's PNG into `dir`, returning the written path
pub async fn write_png(dir: &Path, item: &QueueItem) -> OutputResult<PathBuf> {
    write_png_as(dir.join(png_file_name(base_name(item.name()))), item).await
}

async fn write_png_as(path: PathBuf, item: &QueueItem) -> OutputResult<PathBuf> {
    let converted = item
        .converted_ref()
        .ok_or_else(|| OutputError::NotCompleted(item.id().clone()))?;

    tokio::fs::write(&path, converted.bytes())
        .await
        .map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;

    debug!("Wrote {} ({} bytes)", path.display(), converted.len());
    Ok(path)
}

/// Only the file name part of the source name is used
fn base_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name)
}

/// `photo.png`, then `photo (1).png`, `photo (2).png`, ... for repeated names.
///
/// Names are compared case-insensitively.
fn unique_file_name(file_name: &str, used: &mut HashSet<String>) -> String {
    let (stem, ext) = match file_name.rfind('.') {
        Some(dot) => file_name.split_at(dot),
        None => (file_name, ""),
    };

    let mut candidate = file_name.to_string();
    let mut n = 1;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{} ({}){}", stem, n, ext);
        n += 1;
    }
    candidate
}

/// Write every completed item in the queue into `dir`.
///
/// Items whose PNG names collide get a ` (n)` suffix, so nothing written in
/// the same call is overwritten. Returns the path written for each item.
pub async fn download_all(
    dir: &Path,
    queue: &ImageQueue,
) -> OutputResult<Vec<(ItemId, PathBuf)>> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| OutputError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut used = HashSet::new();
    let mut written = Vec::new();
    for item in queue.completed() {
        let file_name = unique_file_name(&png_file_name(base_name(item.name())), &mut used);
        let path = write_png_as(dir.join(file_name), item).await?;
        written.push((item.id().clone(), path));
    }

    info!("Downloaded {} PNGs to {}", written.len(), dir.display());
    Ok(written)
}
