use ropey::Rope;
use std::path::PathBuf;

use super::position::{CellPoint, CellRect, FoldMap};

/// Viewport state for scroll tracking. `top_line` is a display line index.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub top_line: usize,
    pub height: u16,
    pub width: u16,
    pub scroll_off: u16,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            top_line: 0,
            height: 24,
            width: 80,
            scroll_off: 5,
        }
    }
}

/// A single text buffer backed by a Rope, acting as the text widget the
/// command layer drives: caret, stream selection, block selection, and the
/// cell↔offset arithmetic the marking modes depend on.
///
/// All offsets are char offsets in the document model. Cell points are in
/// display space and go through the fold map, so a bookmark dropped inside a
/// folded region still lands on the right character.
pub struct Buffer {
    pub rope: Rope,
    pub path: Option<PathBuf>,
    pub dirty: bool,
    pub read_only: bool,
    pub viewport: Viewport,
    pub fold: FoldMap,
    caret: usize,
    /// Stream selection anchor. The selection is anchor..caret, normalized.
    anchor: Option<usize>,
    /// Rectangular selection corners, in display cells. Only meaningful while
    /// `block_mode` is on.
    block: Option<(CellPoint, CellPoint)>,
    block_mode: bool,
    /// Caret parked in virtual space. Rendering places the terminal cursor
    /// here instead of at the real caret.
    pub virtual_caret: Option<CellPoint>,
    /// Sticky column for vertical motion.
    pub desired_x: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            rope: Rope::new(),
            path: None,
            dirty: false,
            read_only: false,
            viewport: Viewport::default(),
            fold: FoldMap::new(),
            caret: 0,
            anchor: None,
            block: None,
            block_mode: false,
            virtual_caret: None,
            desired_x: 0,
        }
    }

    pub fn from_str(text: &str) -> Self {
        let mut buf = Self::new();
        buf.rope = Rope::from_str(text);
        buf
    }

    pub fn from_file(path: PathBuf) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)?;
        let read_only = std::fs::metadata(&path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false);
        let mut buf = Self::from_str(&text);
        buf.path = Some(path);
        buf.read_only = read_only;
        Ok(buf)
    }

    pub fn save_to_disk(&mut self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            std::fs::write(path, self.rope.to_string())?;
            self.dirty = false;
        }
        Ok(())
    }

    // ── Line arithmetic ──────────────────────────────────────────

    pub fn char_count(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Get the text of a specific line (without trailing newline).
    pub fn line_text(&self, idx: usize) -> Option<String> {
        if idx >= self.rope.len_lines() {
            return None;
        }
        let line = self.rope.line(idx);
        let mut s: String = line.chunks().collect();
        if s.ends_with('\n') {
            s.pop();
        }
        if s.ends_with('\r') {
            s.pop();
        }
        Some(s)
    }

    /// Line length in chars, excluding the delimiter.
    pub fn line_len(&self, idx: usize) -> usize {
        self.line_text(idx).map(|l| l.chars().count()).unwrap_or(0)
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.rope.line_to_char(line.min(self.line_count() - 1))
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.rope.char_to_line(offset.min(self.char_count()))
    }

    /// Offset of the end of the line containing `offset`, not including the
    /// line delimiter.
    pub fn line_end_offset(&self, offset: usize) -> usize {
        let line = self.line_of(offset);
        self.line_start(line) + self.line_len(line)
    }

    /// The delimiter of the line containing `offset`: empty at end of file,
    /// otherwise the actual terminator characters.
    pub fn line_delimiter(&self, offset: usize) -> &'static str {
        let end = self.line_end_offset(offset);
        if end >= self.char_count() {
            return "";
        }
        if self.rope.char(end) == '\r' {
            "\r\n"
        } else {
            "\n"
        }
    }

    // ── Caret & stream selection ─────────────────────────────────

    pub fn caret(&self) -> usize {
        self.caret
    }

    /// Place the caret, dropping any selection.
    pub fn set_caret(&mut self, offset: usize) {
        self.caret = offset.min(self.char_count());
        self.anchor = None;
        self.block = None;
        self.desired_x = self.cell_at_offset(self.caret).x;
    }

    /// Move the caret; when `extend` is set the selection grows from the
    /// current anchor (established at the old caret if none exists yet).
    pub fn move_caret(&mut self, offset: usize, extend: bool) {
        if extend {
            if self.block_mode {
                let from = self.block.map(|(a, _)| a).unwrap_or_else(|| self.caret_cell());
                self.caret = offset.min(self.char_count());
                self.block = Some((from, self.caret_cell()));
            } else {
                if self.anchor.is_none() {
                    self.anchor = Some(self.caret);
                }
                self.caret = offset.min(self.char_count());
            }
        } else {
            self.set_caret(offset);
        }
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        let len = self.char_count();
        self.anchor = Some(start.min(len));
        self.caret = end.min(len);
    }

    pub fn clear_selection(&mut self) {
        self.anchor = None;
        self.block = None;
    }

    pub fn selection_range(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        if anchor == self.caret {
            return None;
        }
        Some((anchor.min(self.caret), anchor.max(self.caret)))
    }

    pub fn is_text_selected(&self) -> bool {
        if self.block_mode {
            return self.block_rect().is_some_and(|r| !r.is_empty());
        }
        self.selection_range().is_some()
    }

    pub fn selected_text(&self) -> Option<String> {
        if self.block_mode {
            return self.block_rect().map(|r| self.extract_block(r));
        }
        self.selection_range()
            .map(|(s, e)| self.rope.slice(s..e).to_string())
    }

    /// Select the whole line at the caret, including its delimiter, so it
    /// can be cut and pasted as a complete line.
    pub fn select_current_line(&mut self) {
        let line = self.line_of(self.caret);
        let start = self.line_start(line);
        let length = self.line_len(line) + self.line_delimiter(self.caret).chars().count();
        if length == 0 {
            return;
        }
        self.set_selection(start, start + length);
    }

    /// Expand the current stream selection to whole-line boundaries, the
    /// trailing delimiter included.
    pub fn snap_selection_to_lines(&mut self) {
        let (start, end) = match self.selection_range() {
            Some(range) => range,
            None => (self.caret, self.caret),
        };
        let snapped_start = self.line_start(self.line_of(start));
        let end_line = self.line_of(end);
        // A selection ending exactly at a line start already covers that
        // line's delimiter; don't swallow the next line too.
        let end_line = if end > start && end == self.line_start(end_line) {
            end_line - 1
        } else {
            end_line
        };
        let line_end = self.line_start(end_line) + self.line_len(end_line);
        let snapped_end = line_end + self.line_delimiter(line_end).chars().count();
        let forward = self.anchor.is_none_or(|a| a <= self.caret);
        if forward {
            self.set_selection(snapped_start, snapped_end);
        } else {
            self.set_selection(snapped_end, snapped_start);
        }
    }

    // ── Cell space ───────────────────────────────────────────────

    /// Display line of a model line; if the line is hidden inside a fold,
    /// the display line of the fold itself.
    pub fn display_line_of(&self, model_line: usize) -> usize {
        let mut line = model_line;
        loop {
            if let Some(display) = self.fold.display_line(line) {
                return display;
            }
            if line == 0 {
                return 0;
            }
            line -= 1;
        }
    }

    pub fn last_display_line(&self) -> usize {
        self.display_line_of(self.line_count().saturating_sub(1))
    }

    /// Display cell of a real offset.
    pub fn cell_at_offset(&self, offset: usize) -> CellPoint {
        let offset = offset.min(self.char_count());
        let line = self.line_of(offset);
        CellPoint::new(self.display_line_of(line), offset - self.line_start(line))
    }

    /// Real offset at a display cell, or `None` when the cell lies in
    /// virtual space (past the end of its line or past the last line).
    pub fn offset_at_cell(&self, cell: CellPoint) -> Option<usize> {
        let model_line = self.fold.model_line(cell.y);
        if model_line >= self.line_count() {
            return None;
        }
        if cell.x > self.line_len(model_line) {
            return None;
        }
        Some(self.line_start(model_line) + cell.x)
    }

    pub fn caret_cell(&self) -> CellPoint {
        self.virtual_caret.unwrap_or_else(|| self.cell_at_offset(self.caret))
    }

    // ── Block selection ──────────────────────────────────────────

    pub fn block_mode(&self) -> bool {
        self.block_mode
    }

    pub fn set_block_mode(&mut self, on: bool) {
        self.block_mode = on;
        if !on {
            self.block = None;
        }
    }

    pub fn set_block_anchor(&mut self, cell: CellPoint) {
        self.block = Some((cell, cell));
    }

    pub fn extend_block_to(&mut self, cell: CellPoint) {
        let anchor = self.block.map(|(a, _)| a).unwrap_or_else(|| self.caret_cell());
        self.block = Some((anchor, cell));
    }

    pub fn block_rect(&self) -> Option<CellRect> {
        let (a, b) = self.block?;
        Some(CellRect::spanning(a, b))
    }

    pub fn set_block_rect(&mut self, rect: CellRect) {
        self.block = Some((
            CellPoint::new(rect.y, rect.x),
            CellPoint::new(rect.y + rect.height - 1, rect.x + rect.width),
        ));
    }

    /// The rectangle's text, one line per row, short lines padded with
    /// spaces to the full width.
    pub fn extract_block(&self, rect: CellRect) -> String {
        let mut out = String::new();
        for row in rect.y..rect.y + rect.height {
            if row > rect.y {
                out.push('\n');
            }
            let model_line = self.fold.model_line(row);
            let text = self.line_text(model_line).unwrap_or_default();
            let chars: Vec<char> = text.chars().collect();
            for col in rect.x..rect.x + rect.width {
                out.push(chars.get(col).copied().unwrap_or(' '));
            }
        }
        out
    }

    /// Remove the rectangle's characters from every covered line.
    pub fn delete_block(&mut self, rect: CellRect) {
        for row in (rect.y..rect.y + rect.height).rev() {
            let model_line = self.fold.model_line(row);
            if model_line >= self.line_count() {
                continue;
            }
            let len = self.line_len(model_line);
            if rect.x >= len {
                continue;
            }
            let start = self.line_start(model_line) + rect.x;
            let end = self.line_start(model_line) + (rect.x + rect.width).min(len);
            self.rope.remove(start..end);
            self.dirty = true;
        }
        self.block = None;
    }

    /// Insert multi-line text as a rectangle: each line lands on a
    /// successive row at the same column, materializing virtual space with
    /// spaces (and trailing lines at end of file) as needed.
    pub fn insert_block(&mut self, text: &str, at: CellPoint) {
        for (i, segment) in text.split('\n').enumerate() {
            let segment = segment.strip_suffix('\r').unwrap_or(segment);
            let cell = CellPoint::new(at.y + i, at.x);
            let offset = self.materialize_cell(cell);
            self.rope.insert(offset, segment);
        }
        self.dirty = true;
    }

    /// Real offset for a display cell, extending the buffer with spaces or
    /// newlines when the cell is virtual.
    pub fn materialize_cell(&mut self, cell: CellPoint) -> usize {
        let mut model_line = self.fold.model_line(cell.y);
        while model_line >= self.line_count() {
            let len = self.char_count();
            self.rope.insert(len, "\n");
            self.dirty = true;
            model_line = self.fold.model_line(cell.y);
        }
        let len = self.line_len(model_line);
        if cell.x > len {
            let pad: String = " ".repeat(cell.x - len);
            self.rope.insert(self.line_start(model_line) + len, &pad);
            self.dirty = true;
        }
        self.line_start(model_line) + cell.x
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Insert text at the caret, replacing the current selection if any.
    pub fn insert(&mut self, text: &str) {
        let block = self
            .block_mode
            .then(|| self.block_rect())
            .flatten()
            .filter(|r| !r.is_empty());
        if let Some(rect) = block {
            self.delete_block(rect);
            let offset = self.materialize_cell(CellPoint::new(rect.y, rect.x));
            self.rope.insert(offset, text);
            self.caret = offset + text.chars().count();
        } else if let Some((start, end)) = self.selection_range() {
            self.rope.remove(start..end);
            self.rope.insert(start, text);
            self.caret = start + text.chars().count();
            self.anchor = None;
        } else {
            let at = self.caret.min(self.char_count());
            self.rope.insert(at, text);
            self.caret = at + text.chars().count();
        }
        self.dirty = true;
        self.desired_x = self.cell_at_offset(self.caret).x;
    }

    /// Remove and return the selected text (stream or block).
    pub fn cut_selection(&mut self) -> Option<String> {
        if self.block_mode {
            let rect = self.block_rect().filter(|r| !r.is_empty())?;
            let text = self.extract_block(rect);
            self.delete_block(rect);
            self.caret = self
                .offset_at_cell(CellPoint::new(rect.y, rect.x))
                .unwrap_or_else(|| self.line_start(self.fold.model_line(rect.y)));
            return Some(text);
        }
        let (start, end) = self.selection_range()?;
        let text = self.rope.slice(start..end).to_string();
        self.rope.remove(start..end);
        self.caret = start;
        self.anchor = None;
        self.dirty = true;
        Some(text)
    }

    pub fn delete_backward(&mut self) {
        if self.is_text_selected() {
            self.cut_selection();
            return;
        }
        if self.caret == 0 {
            return;
        }
        let start = if self.caret >= 2
            && self.rope.char(self.caret - 1) == '\n'
            && self.rope.char(self.caret - 2) == '\r'
        {
            self.caret - 2
        } else {
            self.caret - 1
        };
        self.rope.remove(start..self.caret);
        self.caret = start;
        self.dirty = true;
    }

    pub fn delete_forward(&mut self) {
        if self.is_text_selected() {
            self.cut_selection();
            return;
        }
        if self.caret >= self.char_count() {
            return;
        }
        let end = if self.rope.char(self.caret) == '\r'
            && self.caret + 1 < self.char_count()
            && self.rope.char(self.caret + 1) == '\n'
        {
            self.caret + 2
        } else {
            self.caret + 1
        };
        self.rope.remove(self.caret..end);
        self.dirty = true;
    }

    // ── Viewport ─────────────────────────────────────────────────

    pub fn top_index(&self) -> usize {
        self.viewport.top_line
    }

    pub fn set_top_index(&mut self, display_line: usize) {
        self.viewport.top_line = display_line.min(self.last_display_line());
    }

    pub fn bottom_index(&self) -> usize {
        (self.viewport.top_line + self.viewport.height.saturating_sub(1) as usize)
            .min(self.last_display_line())
    }

    /// Ensure the viewport keeps the caret visible.
    pub fn scroll_to_caret(&mut self) {
        let off = self.viewport.scroll_off as usize;
        let height = (self.viewport.height as usize).max(1);
        let y = self.caret_cell().y;

        if y < self.viewport.top_line + off {
            self.viewport.top_line = y.saturating_sub(off);
        }
        if y >= self.viewport.top_line + height.saturating_sub(off) {
            self.viewport.top_line = (y + off + 1).saturating_sub(height);
        }
        self.viewport.top_line = self.viewport.top_line.min(self.last_display_line());
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}
