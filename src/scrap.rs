use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clipboard::ClipboardAdapter;
use crate::storage::StateStore;

/// The maximum number of scrap items kept in the history.
const MAX_ITEMS: usize = 10;

const COUNT_KEY: &str = "scrap_items.count";

fn slot_key(index: usize) -> String {
    format!("scrap_items.{index}")
}

/// One cut/copy capture. `block_size` is present only for column-mode
/// captures and records the block's (width, height) in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapItem {
    pub text: String,
    pub block_size: Option<(usize, usize)>,
}

impl ScrapItem {
    pub fn is_column_content(&self) -> bool {
        self.block_size.is_some()
    }
}

/// Bounded MRU history of clipboard-equivalent snippets. Index 0 is always
/// the most recently used item, whether it got there by copy, cut, or an
/// external paste picked up during synchronization.
pub struct ScrapBuffer {
    items: Vec<ScrapItem>,
}

impl ScrapBuffer {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Load persisted items: a count followed by that many slots. Slots
    /// that fail to decode are pruned from storage and skipped; the rest
    /// still load.
    pub fn load(store: &mut StateStore) -> Self {
        let mut buffer = Self::new();

        let count: usize = match store.get(COUNT_KEY).and_then(|v| v.parse().ok()) {
            Some(count) => count,
            None => return buffer,
        };

        for index in 0..count {
            let key = slot_key(index);
            let Some(blob) = store.get(&key) else { continue };
            match toml::from_str::<ScrapItem>(blob) {
                Ok(item) => {
                    if !buffer.items.contains(&item) {
                        buffer.items.push(item);
                    }
                }
                Err(err) => {
                    warn!("pruning undecodable scrap slot {index}: {err}");
                    store.remove(&key);
                }
            }
        }

        buffer
    }

    /// Persist the current items as count + slots. Stale slots beyond the
    /// current count are cleared. The store itself skips the disk write
    /// when nothing changed.
    pub fn save(&self, store: &mut StateStore) {
        store.put(COUNT_KEY, self.items.len().to_string());
        for (index, item) in self.items.iter().enumerate() {
            match toml::to_string(item) {
                Ok(blob) => store.put(&slot_key(index), blob),
                Err(err) => warn!("failed to serialize scrap slot {index}: {err}"),
            }
        }
        for index in self.items.len()..MAX_ITEMS {
            store.remove(&slot_key(index));
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[ScrapItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&ScrapItem> {
        self.items.get(index)
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.items.len() {
            self.items.remove(index);
        }
    }

    /// Whether the most recent item is a column-mode capture.
    pub fn clipboard_is_column_content(&self) -> bool {
        self.items.first().is_some_and(ScrapItem::is_column_content)
    }

    pub fn clipboard_column_mode_size(&self) -> Option<(usize, usize)> {
        self.items.first().and_then(|item| item.block_size)
    }

    /// Pick up whatever is on the host clipboard. Content copied outside
    /// the editor carries no block size.
    pub fn sync_with_system_clipboard(
        &mut self,
        clipboard: &mut dyn ClipboardAdapter,
        block_size: Option<(usize, usize)>,
    ) {
        if let Some(text) = clipboard.get_text() {
            self.add_item_checked(text, block_size);
        }
    }

    /// Run a copy through the scrap history: synchronize first so an
    /// external copy since the last sync is captured (as non-block), invoke
    /// the copy callback (which performs the host copy and reports the
    /// block dimensions, if any), then synchronize again with those
    /// dimensions — guaranteeing the front item matches what is now on the
    /// clipboard.
    pub fn copy<F>(&mut self, clipboard: &mut dyn ClipboardAdapter, perform_copy: F)
    where
        F: FnOnce(&mut dyn ClipboardAdapter) -> Option<(usize, usize)>,
    {
        self.sync_with_system_clipboard(clipboard, None);
        let block_size = perform_copy(clipboard);
        self.sync_with_system_clipboard(clipboard, block_size);
    }

    /// Identical sequencing with a cut callback.
    pub fn cut<F>(&mut self, clipboard: &mut dyn ClipboardAdapter, perform_cut: F)
    where
        F: FnOnce(&mut dyn ClipboardAdapter) -> Option<(usize, usize)>,
    {
        self.sync_with_system_clipboard(clipboard, None);
        let block_size = perform_cut(clipboard);
        self.sync_with_system_clipboard(clipboard, block_size);
    }

    /// Insert-or-promote by text equality. A re-added item keeps its
    /// original block size; a genuinely new one is tagged with the given
    /// size. The oldest item is evicted past capacity.
    fn add_item_checked(&mut self, text: String, block_size: Option<(usize, usize)>) {
        let existing = self
            .items
            .iter()
            .position(|item| item.text == text)
            .map(|index| self.items.remove(index));

        let item = existing.unwrap_or(ScrapItem { text, block_size });
        self.items.insert(0, item);

        while self.items.len() > MAX_ITEMS {
            self.items.pop();
        }
    }
}

impl Default for ScrapBuffer {
    fn default() -> Self {
        Self::new()
    }
}
