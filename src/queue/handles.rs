// Transient display handles (object-URL analog)
//
// A handle is registered when an item is ingested or converted and
// unregistered when it is dropped, whichever code path drops it.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

const URL_PREFIX: &str = "blob:pngsync/";

struct HandleEntry {
    bytes: Arc<Vec<u8>>,
    mime: String,
}

#[derive(Default)]
struct RegistryInner {
    entries: DashMap<String, HandleEntry>,
    next_id: AtomicU64,
}

/// Registry of live display handles.
///
/// Cheap to clone; all clones share the same set of handles.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<RegistryInner>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return the handle that keeps them addressable
    pub fn register(&self, bytes: Arc<Vec<u8>>, mime: &str) -> DisplayHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}{}", URL_PREFIX, id);

        self.inner.entries.insert(
            url.clone(),
            HandleEntry {
                bytes: Arc::clone(&bytes),
                mime: mime.to_string(),
            },
        );
        trace!("Registered {} ({} bytes, {})", url, bytes.len(), mime);

        DisplayHandle {
            url,
            mime: mime.to_string(),
            bytes,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Look up the bytes behind a live handle URL
    pub fn resolve(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.inner
            .entries
            .get(url)
            .map(|entry| Arc::clone(&entry.bytes))
    }

    /// MIME type recorded for a live handle URL
    pub fn mime_of(&self, url: &str) -> Option<String> {
        self.inner.entries.get(url).map(|entry| entry.mime.clone())
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.inner.entries.contains_key(url)
    }

    /// Number of handles not yet released
    pub fn live_count(&self) -> usize {
        self.inner.entries.len()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

/// A registered, addressable view of some bytes. Released on drop.
pub struct DisplayHandle {
    url: String,
    mime: String,
    bytes: Arc<Vec<u8>>,
    registry: Arc<RegistryInner>,
}

impl DisplayHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.registry.entries.remove(&self.url);
        trace!("Released {}", self.url);
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("url", &self.url)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}
