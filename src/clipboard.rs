use tracing::warn;

/// Host clipboard seam. The scrap buffer only needs get/set of plain text.
pub trait ClipboardAdapter {
    fn get_text(&mut self) -> Option<String>;
    fn set_text(&mut self, text: &str);
}

/// System clipboard backed by arboard. Absence of a clipboard (headless
/// session, wayland quirks) degrades to a no-op rather than failing
/// commands that would otherwise work.
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let inner = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(err) => {
                warn!("system clipboard unavailable: {err}");
                None
            }
        };
        Self { inner }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardAdapter for SystemClipboard {
    fn get_text(&mut self) -> Option<String> {
        self.inner.as_mut()?.get_text().ok()
    }

    fn set_text(&mut self, text: &str) {
        if let Some(clipboard) = self.inner.as_mut() {
            if let Err(err) = clipboard.set_text(text.to_string()) {
                warn!("clipboard write failed: {err}");
            }
        }
    }
}

/// In-memory clipboard for tests and headless runs.
#[derive(Default)]
pub struct MemoryClipboard {
    contents: Option<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(text: &str) -> Self {
        Self {
            contents: Some(text.to_string()),
        }
    }
}

impl ClipboardAdapter for MemoryClipboard {
    fn get_text(&mut self) -> Option<String> {
        self.contents.clone()
    }

    fn set_text(&mut self, text: &str) {
        self.contents = Some(text.to_string());
    }
}
