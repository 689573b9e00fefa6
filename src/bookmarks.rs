use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CommandError, CommandResult};
use crate::model::buffer::Buffer;
use crate::storage::StateStore;

pub const MIN_BOOKMARK_NUMBER: u8 = 1;
pub const MAX_BOOKMARK_NUMBER: u8 = 10;

fn slot_key(number: u8) -> String {
    format!("bookmarks.{number}")
}

/// A numbered location in a file. The offset is a document-model offset so
/// it survives folding; `line_column` is recomputed at drop time and kept
/// for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub number: u8,
    pub offset: usize,
    pub line_column: String,
    pub resource: String,
}

/// Up to ten numbered bookmarks, persisted one slot per number.
pub struct BookmarkStore {
    bookmarks: Vec<Bookmark>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        Self {
            bookmarks: Vec::new(),
        }
    }

    /// Load persisted bookmarks. Slots that fail to decode, or that decode
    /// to an out-of-range number, are pruned and skipped.
    pub fn load(store: &mut StateStore) -> Self {
        let mut bookmarks = Self::new();

        for number in MIN_BOOKMARK_NUMBER..=MAX_BOOKMARK_NUMBER {
            let key = slot_key(number);
            let Some(blob) = store.get(&key) else { continue };
            match toml::from_str::<Bookmark>(blob) {
                Ok(bookmark)
                    if bookmark.number == number && !bookmark.resource.is_empty() =>
                {
                    bookmarks.bookmarks.push(bookmark);
                }
                Ok(_) => {
                    warn!("pruning bookmark slot {number}: inconsistent record");
                    store.remove(&key);
                }
                Err(err) => {
                    warn!("pruning undecodable bookmark slot {number}: {err}");
                    store.remove(&key);
                }
            }
        }

        bookmarks
    }

    pub fn save(&self, store: &mut StateStore) {
        for number in MIN_BOOKMARK_NUMBER..=MAX_BOOKMARK_NUMBER {
            let key = slot_key(number);
            match self.get(number) {
                Some(bookmark) => match toml::to_string(bookmark) {
                    Ok(blob) => store.put(&key, blob),
                    Err(err) => warn!("failed to serialize bookmark {number}: {err}"),
                },
                // No bookmark for this number, so clear the slot.
                None => store.remove(&key),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn get(&self, number: u8) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.number == number)
    }

    pub fn remove(&mut self, number: u8) {
        self.bookmarks.retain(|b| b.number != number);
    }

    /// All bookmarks sorted ascending by number, for the bookmarks dialog.
    pub fn list(&self) -> Vec<&Bookmark> {
        let mut list: Vec<&Bookmark> = self.bookmarks.iter().collect();
        list.sort_by_key(|b| b.number);
        list
    }

    /// Record the buffer's current caret position under `number`,
    /// overwriting any existing bookmark with that number in place.
    ///
    /// Out-of-range numbers are an error; a buffer with no backing file is
    /// a silent no-op, since there is no resource to come back to.
    pub fn drop_bookmark(&mut self, number: u8, buffer: &Buffer) -> CommandResult {
        if !(MIN_BOOKMARK_NUMBER..=MAX_BOOKMARK_NUMBER).contains(&number) {
            return Err(CommandError::InvalidArgument(format!(
                "bookmark number {number} is out of range"
            )));
        }

        let Some(resource) = buffer.path.as_ref().map(|p| p.display().to_string()) else {
            return Ok(());
        };

        let offset = buffer.caret();
        let line = buffer.line_of(offset);
        let column = offset - buffer.line_start(line);
        let line_column = format!("{}:{}", line + 1, column + 1);

        if let Some(existing) = self.bookmarks.iter_mut().find(|b| b.number == number) {
            existing.offset = offset;
            existing.resource = resource;
            existing.line_column = line_column;
            return Ok(());
        }

        self.bookmarks.push(Bookmark {
            number,
            offset,
            line_column,
            resource,
        });
        Ok(())
    }
}

impl Default for BookmarkStore {
    fn default() -> Self {
        Self::new()
    }
}
