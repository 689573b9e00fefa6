use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Flat, namespaced key/value store persisted as a single TOML document.
/// Bookmark and scrap slots live here as opaque serialized blobs under keys
/// like `bookmarks.3` and `scrap_items.0`.
pub struct StateStore {
    path: Option<PathBuf>,
    map: BTreeMap<String, String>,
    /// Contents as last read from or written to disk, so an unchanged store
    /// never rewrites its file.
    persisted: BTreeMap<String, String>,
}

impl StateStore {
    /// Open the store at the platform data directory, creating an empty one
    /// when nothing has been persisted yet. A file that fails to parse is
    /// treated as empty; the slots inside it are gone either way.
    pub fn open_default() -> Self {
        let path = directories::ProjectDirs::from("", "", "brief")
            .map(|d| d.data_dir().join("state.toml"));
        Self::open(path)
    }

    pub fn open(path: Option<PathBuf>) -> Self {
        let map = path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|text| match toml::from_str::<BTreeMap<String, String>>(&text) {
                Ok(map) => Some(map),
                Err(err) => {
                    tracing::warn!("state store unreadable, starting empty: {err}");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            path,
            persisted: map.clone(),
            map,
        }
    }

    /// In-memory store for tests and headless use.
    pub fn in_memory() -> Self {
        Self::open(None)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: &str, value: String) {
        self.map.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }

    /// Write the store back to disk, skipping the write entirely when no
    /// slot changed since the last load/save.
    pub fn save(&mut self) -> Result<()> {
        if self.map == self.persisted {
            return Ok(());
        }
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, toml::to_string(&self.map)?)?;
        }
        self.persisted = self.map.clone();
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.map != self.persisted
    }
}
