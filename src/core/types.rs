// Queue item model, progress and batch report types

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::queue::handles::DisplayHandle;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// Opaque queue item identifier (9 random base-36 characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file handed to the queue (picked or dropped by the user)
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Field-less view of `ItemStatus`, used in progress events and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusKind::Idle => "idle",
            StatusKind::Processing => "processing",
            StatusKind::Completed => "completed",
            StatusKind::Error => "error",
        };
        f.write_str(label)
    }
}

/// The output of a successful conversion attempt.
///
/// Only constructible together with `ItemStatus::Completed`, so a converted
/// handle and an insight never exist on an item that is not completed.
#[derive(Debug)]
pub struct Conversion {
    converted: DisplayHandle,
    converted_size: u64,
    width: u32,
    height: u32,
    insight: String,
}

impl Conversion {
    pub(crate) fn new(converted: DisplayHandle, width: u32, height: u32, insight: String) -> Self {
        Self {
            converted_size: converted.len() as u64,
            converted,
            width,
            height,
            insight,
        }
    }

    pub fn converted(&self) -> &DisplayHandle {
        &self.converted
    }

    pub fn converted_size(&self) -> u64 {
        self.converted_size
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn insight(&self) -> &str {
        &self.insight
    }
}

/// Lifecycle stage of a queued image
#[derive(Debug)]
pub enum ItemStatus {
    Idle,
    Processing,
    Completed(Conversion),
    Error { message: String },
}

impl ItemStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ItemStatus::Idle => StatusKind::Idle,
            ItemStatus::Processing => StatusKind::Processing,
            ItemStatus::Completed(_) => StatusKind::Completed,
            ItemStatus::Error { .. } => StatusKind::Error,
        }
    }
}

/// One queued image
#[derive(Debug)]
pub struct QueueItem {
    id: ItemId,
    name: String,
    source: Arc<Vec<u8>>,
    preview: DisplayHandle,
    original_size: u64,
    status: ItemStatus,
}

impl QueueItem {
    pub(crate) fn new(id: ItemId, name: String, source: Arc<Vec<u8>>, preview: DisplayHandle) -> Self {
        Self {
            id,
            name,
            original_size: source.len() as u64,
            source,
            preview,
            status: ItemStatus::Idle,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<Vec<u8>> {
        &self.source
    }

    pub fn preview(&self) -> &DisplayHandle {
        &self.preview
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, ItemStatus::Completed(_))
    }

    pub fn conversion(&self) -> Option<&Conversion> {
        match &self.status {
            ItemStatus::Completed(conversion) => Some(conversion),
            _ => None,
        }
    }

    pub fn converted_ref(&self) -> Option<&DisplayHandle> {
        self.conversion().map(Conversion::converted)
    }

    pub fn converted_size(&self) -> Option<u64> {
        self.conversion().map(Conversion::converted_size)
    }

    pub fn insight(&self) -> Option<&str> {
        self.conversion().map(Conversion::insight)
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Snapshot of what the conversion routine needs
    pub fn source_image(&self) -> SourceImage {
        SourceImage {
            id: self.id.clone(),
            name: self.name.clone(),
            bytes: Arc::clone(&self.source),
        }
    }

    pub(crate) fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }
}

/// Input of a single conversion
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: ItemId,
    pub name: String,
    pub bytes: Arc<Vec<u8>>,
}

/// Output of a single conversion, before it is attached to a queue item
#[derive(Debug, Clone)]
pub struct ConvertedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub insight: String,
}

/// Batch progress published while `process_all` runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub running: bool,
    /// 1-based index of the item being processed
    pub current: usize,
    pub total: usize,
    pub current_id: Option<ItemId>,
    pub last_status: Option<StatusKind>,
}

impl Progress {
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.current as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Individual item result
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub id: ItemId,
    pub filename: String,
    pub status: StatusKind,
    pub original_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: f64,
}

impl ItemReport {
    pub fn from_item(item: &QueueItem, processing_time_ms: f64) -> Self {
        Self {
            id: item.id().clone(),
            filename: item.name().to_string(),
            status: item.status().kind(),
            original_size: item.original_size(),
            converted_size: item.converted_size(),
            insight: item.insight().map(str::to_string),
            error: item.error_message().map(str::to_string),
            processing_time_ms,
        }
    }
}

/// Batch processing result
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Items already completed before the run started
    pub skipped: usize,
    /// Items removed from the queue before their result could be applied
    pub discarded: usize,
    pub processing_time_ms: f64,
    pub results: Vec<ItemReport>,
}
