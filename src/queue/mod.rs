// Image queue: ingestion, removal, lookup
//
// Items keep insertion order. Dropping an item (remove, clear, or dropping
// the queue) releases its display handles.

pub mod handles;

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::core::types::{
    Conversion, ConvertedImage, ItemId, ItemStatus, QueueItem, SourceFile, SourceImage,
};
use crate::utils::image_ops::sniff_mime;
use handles::HandleRegistry;

pub use handles::DisplayHandle;

/// Queue shared between the orchestrator and whatever presents it
pub type SharedQueue = Arc<RwLock<ImageQueue>>;

#[derive(Debug, Default)]
pub struct ImageQueue {
    items: Vec<QueueItem>,
    handles: HandleRegistry,
}

impl ImageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that registers its handles in an existing registry
    pub fn with_registry(handles: HandleRegistry) -> Self {
        Self {
            items: Vec::new(),
            handles,
        }
    }

    pub fn into_shared(self) -> SharedQueue {
        Arc::new(RwLock::new(self))
    }

    /// Append one idle item per file, in the order given
    pub fn ingest<I>(&mut self, files: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let mut ids = Vec::new();

        for file in files {
            let id = self.unique_id();
            let bytes = Arc::new(file.bytes);
            let preview = self.handles.register(Arc::clone(&bytes), sniff_mime(&bytes));

            debug!("Queued {} as {} ({} bytes)", file.name, id, bytes.len());
            self.items.push(QueueItem::new(id.clone(), file.name, bytes, preview));
            ids.push(id);
        }

        ids
    }

    /// Remove an item by id. Returns false if no such item is queued.
    pub fn remove(&mut self, id: &ItemId) -> bool {
        match self.position(id) {
            Some(index) => {
                let item = self.items.remove(index);
                debug!("Removed {} ({})", item.name(), item.id());
                true
            }
            None => false,
        }
    }

    /// Remove every item
    pub fn clear(&mut self) {
        debug!("Clearing {} queued items", self.items.len());
        self.items.clear();
    }

    pub fn get(&self, id: &ItemId) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: &ItemId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_completed(&self) -> bool {
        self.items.iter().any(QueueItem::is_completed)
    }

    pub fn completed(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter().filter(|item| item.is_completed())
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    /// Move an item to `Processing` and hand back its conversion input.
    /// Completed and missing items yield `None`.
    pub(crate) fn begin_processing(&mut self, id: &ItemId) -> Option<SourceImage> {
        let item = self.get_mut(id)?;
        if item.is_completed() {
            return None;
        }
        item.set_status(ItemStatus::Processing);
        Some(item.source_image())
    }

    /// Attach a conversion result. Returns false if the item is gone.
    pub(crate) fn complete(&mut self, id: &ItemId, converted: ConvertedImage) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        let handle = self.handles.register(Arc::new(converted.png), "image/png");
        let conversion = Conversion::new(handle, converted.width, converted.height, converted.insight);

        match self.get_mut(id) {
            Some(item) => {
                item.set_status(ItemStatus::Completed(conversion));
                true
            }
            None => false,
        }
    }

    /// Mark an item as failed. Returns false if the item is gone.
    pub(crate) fn fail(&mut self, id: &ItemId, message: String) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.set_status(ItemStatus::Error { message });
                true
            }
            None => false,
        }
    }

    fn unique_id(&self) -> ItemId {
        loop {
            let id = ItemId::generate();
            if self.position(&id).is_none() {
                return id;
            }
        }
    }
}
