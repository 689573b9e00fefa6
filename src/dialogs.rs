use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::{Duration, Instant};

use crate::keys::Chord;
use crate::repeat::{RepeatOutcome, RepeatSession};

/// How long a captured command stays visible before the repeat dialog
/// closes itself.
const CAPTURE_CLOSE_DELAY: Duration = Duration::from_millis(350);

/// The modal dialogs the command layer can open. While one is up it owns
/// every key event and command dispatch is suspended.
pub enum Dialog {
    Repeat(RepeatDialog),
    Number(NumberDialog),
    Prompt(PromptDialog),
    List(ListDialog),
}

/// What a dialog key event resolved to. Dialogs block command dispatch
/// while open and hand their result back synchronously on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogEvent {
    None,
    Accept,
    Cancel,
}

/// Single-line input field with a protected prompt prefix: neither
/// backspace nor caret motion may cross `min_caret`.
pub struct TextField {
    text: String,
    caret: usize,
    min_caret: usize,
}

impl TextField {
    pub fn new(text: &str, min_caret: usize) -> Self {
        let mut field = Self {
            text: String::new(),
            caret: 0,
            min_caret,
        };
        field.set_text(text);
        field
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text after the protected prompt.
    pub fn entry(&self) -> &str {
        let at = byte_of(&self.text, self.min_caret);
        &self.text[at..]
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.caret = self.text.chars().count();
    }

    pub fn set_min_caret(&mut self, min_caret: usize) {
        self.min_caret = min_caret;
        self.caret = self.caret.max(min_caret);
    }

    pub fn handle_key(&mut self, event: &KeyEvent) {
        if event.kind == KeyEventKind::Release {
            return;
        }
        let len = self.text.chars().count();
        match event.code {
            KeyCode::Char(c)
                if !event
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                let at = byte_of(&self.text, self.caret);
                self.text.insert(at, c);
                self.caret += 1;
            }
            KeyCode::Backspace => {
                if self.caret > self.min_caret {
                    let at = byte_of(&self.text, self.caret - 1);
                    self.text.remove(at);
                    self.caret -= 1;
                }
            }
            KeyCode::Delete => {
                if self.caret >= self.min_caret && self.caret < len {
                    let at = byte_of(&self.text, self.caret);
                    self.text.remove(at);
                }
            }
            KeyCode::Left => self.caret = self.caret.saturating_sub(1).max(self.min_caret),
            KeyCode::Right => self.caret = (self.caret + 1).min(len),
            KeyCode::Home => self.caret = self.min_caret,
            KeyCode::End => self.caret = len,
            _ => {}
        }
    }
}

fn byte_of(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

// ── Repeat dialog ────────────────────────────────────────────────

/// The repeat dialog: a prompt field driven by the four-state repeat
/// machine. A captured command schedules a timed auto-close (the only
/// delayed operation anywhere); closing any other way cancels it.
pub struct RepeatDialog {
    pub session: RepeatSession,
    pub field: TextField,
    close_at: Option<Instant>,
    captured: bool,
    accumulate_entered: bool,
}

impl RepeatDialog {
    pub fn new(invoke_chord: Option<Chord>) -> Self {
        let session = RepeatSession::new(invoke_chord);
        let prompt_len = session.prompt_prefix().chars().count();
        let field = TextField::new(&session.display_text(), prompt_len);
        Self {
            session,
            field,
            close_at: None,
            captured: false,
            accumulate_entered: false,
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> DialogEvent {
        if self.captured {
            // Between capture and the timed close, input is dead.
            return DialogEvent::None;
        }
        if event.kind != KeyEventKind::Release {
            if event.code == KeyCode::Esc {
                self.close_at = None;
                return DialogEvent::Cancel;
            }
            if event.code == KeyCode::Enter && self.session.accumulating_string() {
                return DialogEvent::Accept;
            }
        }

        match self.session.process_key(event) {
            RepeatOutcome::Consumed => {
                self.refresh_field();
            }
            RepeatOutcome::PassToField => {
                if self.session.accumulating_string() && !self.accumulate_entered {
                    // The instructions hint makes way for the string being
                    // accumulated.
                    self.accumulate_entered = true;
                    let prompt = self.session.prompt_prefix();
                    self.field.set_text(&prompt);
                    self.field.set_min_caret(prompt.chars().count());
                }
                self.field.handle_key(event);
                if self.session.accumulating_string() {
                    let text = self.field.text().to_string();
                    self.session.refresh_from_field(&text);
                }
            }
            RepeatOutcome::CommandCaptured => {
                self.captured = true;
                let text = format!(
                    "{}{}",
                    self.session.prompt_prefix(),
                    self.session.command_label()
                );
                self.field.set_text(&text);
                // Set close timer so the user is able to see the command.
                self.close_at = Some(Instant::now() + CAPTURE_CLOSE_DELAY);
            }
        }
        DialogEvent::None
    }

    /// Fires the delayed close after a successful command capture.
    pub fn on_tick(&mut self, now: Instant) -> DialogEvent {
        if self.close_at.is_some_and(|at| now >= at) {
            self.close_at = None;
            return DialogEvent::Accept;
        }
        DialogEvent::None
    }

    fn refresh_field(&mut self) {
        let prompt_len = self.session.prompt_prefix().chars().count();
        self.field.set_text(&self.session.display_text());
        self.field.set_min_caret(prompt_len);
    }
}

// ── Get-a-number dialog ──────────────────────────────────────────

/// Why a number dialog is open; decides what the dispatcher does with the
/// accepted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberPurpose {
    GoToLine,
    JumpBookmark,
}

/// Obtains a number within a given range. Used by jump-to-bookmark and
/// goto-line. The initial number is shown pre-selected: the first digit
/// typed replaces it.
pub struct NumberDialog {
    pub purpose: NumberPurpose,
    pub field: TextField,
    prompt_len: usize,
    min: u32,
    max: u32,
    pristine: bool,
}

impl NumberDialog {
    pub fn new(purpose: NumberPurpose, prompt: &str, initial: u32, min: u32, max: u32) -> Self {
        let prompt_len = prompt.chars().count();
        Self {
            purpose,
            field: TextField::new(&format!("{prompt}{initial}"), prompt_len),
            prompt_len,
            min,
            max,
            pristine: true,
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> DialogEvent {
        if event.kind == KeyEventKind::Release {
            return DialogEvent::None;
        }
        match event.code {
            KeyCode::Esc => DialogEvent::Cancel,
            KeyCode::Enter => DialogEvent::Accept,
            KeyCode::Char(c) if c.is_ascii_digit() => {
                if self.pristine {
                    // The preselected initial number is overwritten.
                    let prompt: String =
                        self.field.text().chars().take(self.prompt_len).collect();
                    self.field.set_text(&prompt);
                    self.pristine = false;
                }
                self.field.handle_key(event);
                DialogEvent::None
            }
            KeyCode::Backspace | KeyCode::Delete | KeyCode::Left | KeyCode::Right => {
                self.pristine = false;
                self.field.handle_key(event);
                DialogEvent::None
            }
            _ => DialogEvent::None,
        }
    }

    /// The entered number, digits only, clamped into [min, max].
    pub fn value(&self) -> u32 {
        let digits: String = self
            .field
            .entry()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        digits
            .parse::<u32>()
            .unwrap_or(self.min)
            .clamp(self.min, self.max)
    }
}

// ── Prompt dialog (search/replace strings) ───────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPurpose {
    SearchForward,
    SearchBackward,
    ReplaceWith,
}

/// One-line free text prompt.
pub struct PromptDialog {
    pub purpose: PromptPurpose,
    pub field: TextField,
}

impl PromptDialog {
    pub fn new(purpose: PromptPurpose, prompt: &str, initial: &str) -> Self {
        let prompt_len = prompt.chars().count();
        Self {
            purpose,
            field: TextField::new(&format!("{prompt}{initial}"), prompt_len),
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> DialogEvent {
        if event.kind == KeyEventKind::Release {
            return DialogEvent::None;
        }
        match event.code {
            KeyCode::Esc => DialogEvent::Cancel,
            KeyCode::Enter => DialogEvent::Accept,
            _ => {
                self.field.handle_key(event);
                DialogEvent::None
            }
        }
    }

    pub fn value(&self) -> &str {
        self.field.entry()
    }
}

// ── List dialogs (bookmarks, scrap) ──────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bookmarks,
    Scrap,
}

pub struct ListEntry {
    /// Bookmark number or scrap index.
    pub key: u32,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent {
    None,
    Accept(u32),
    Delete(u32),
    Cancel,
}

/// Single-selection list over bookmarks or scrap items.
pub struct ListDialog {
    pub kind: ListKind,
    pub title: &'static str,
    pub entries: Vec<ListEntry>,
    pub selected: usize,
}

impl ListDialog {
    pub fn new(kind: ListKind, title: &'static str, entries: Vec<ListEntry>) -> Self {
        Self {
            kind,
            title,
            entries,
            selected: 0,
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> ListEvent {
        if event.kind == KeyEventKind::Release {
            return ListEvent::None;
        }
        match event.code {
            KeyCode::Esc => ListEvent::Cancel,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                ListEvent::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.entries.is_empty() {
                    self.selected = (self.selected + 1).min(self.entries.len() - 1);
                }
                ListEvent::None
            }
            KeyCode::Enter => self
                .entries
                .get(self.selected)
                .map(|e| ListEvent::Accept(e.key))
                .unwrap_or(ListEvent::Cancel),
            KeyCode::Delete | KeyCode::Char('d') => self
                .entries
                .get(self.selected)
                .map(|e| ListEvent::Delete(e.key))
                .unwrap_or(ListEvent::None),
            _ => ListEvent::None,
        }
    }

    /// Drop the entry for `key` after the backing store removed it.
    pub fn remove_entry(&mut self, key: u32) {
        self.entries.retain(|e| e.key != key);
        if self.selected >= self.entries.len() && self.selected > 0 {
            self.selected = self.entries.len() - 1;
        }
    }
}

/// First line of a snippet, delimiters made visible, truncated with an
/// ellipsis to fit a dialog column.
pub fn preview_label(text: &str, max_chars: usize) -> String {
    let first = text.lines().next().unwrap_or("");
    let mut label = first.to_string();
    if text.len() > first.len() {
        label.push_str("\\n…");
    }
    if label.chars().count() > max_chars {
        let truncated: String = label.chars().take(max_chars.saturating_sub(1)).collect();
        label = format!("{truncated}…");
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeat::RepeatState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn field_protects_the_prompt_prefix() {
        let mut field = TextField::new("prompt: abc", 8);
        for _ in 0..10 {
            field.handle_key(&press(KeyCode::Backspace));
        }
        assert_eq!(field.text(), "prompt: ");
        field.handle_key(&press(KeyCode::Left));
        assert_eq!(field.caret(), 8);
        field.handle_key(&press(KeyCode::Char('z')));
        assert_eq!(field.text(), "prompt: z");
    }

    #[test]
    fn repeat_dialog_mirrors_typed_string() {
        let mut dialog = RepeatDialog::new(None);
        dialog.handle_key(&press(KeyCode::Char('h')));
        dialog.handle_key(&press(KeyCode::Char('i')));
        assert_eq!(dialog.session.state(), RepeatState::AccumulateString);
        assert_eq!(dialog.session.repeat_string(), "hi");

        assert_eq!(dialog.handle_key(&press(KeyCode::Enter)), DialogEvent::Accept);
    }

    #[test]
    fn repeat_dialog_closes_on_timer_after_capture() {
        let mut dialog = RepeatDialog::new(None);
        let chord = KeyEvent::new(KeyCode::Char('k'), KeyModifiers::CONTROL);
        dialog.handle_key(&chord);
        assert!(dialog.session.command_chord().is_some());

        // Not yet due.
        assert_eq!(dialog.on_tick(Instant::now()), DialogEvent::None);
        // Due.
        assert_eq!(
            dialog.on_tick(Instant::now() + Duration::from_secs(1)),
            DialogEvent::Accept
        );
        // The timer is one-shot.
        assert_eq!(
            dialog.on_tick(Instant::now() + Duration::from_secs(2)),
            DialogEvent::None
        );
    }

    #[test]
    fn number_dialog_overwrites_preselected_initial() {
        let mut dialog = NumberDialog::new(NumberPurpose::GoToLine, "Go to line: ", 42, 1, 100);
        assert_eq!(dialog.value(), 42);
        dialog.handle_key(&press(KeyCode::Char('7')));
        assert_eq!(dialog.value(), 7);
        dialog.handle_key(&press(KeyCode::Char('3')));
        assert_eq!(dialog.value(), 73);
    }

    #[test]
    fn number_dialog_clamps_into_range() {
        let mut dialog = NumberDialog::new(NumberPurpose::JumpBookmark, "Bookmark: ", 1, 1, 10);
        dialog.handle_key(&press(KeyCode::Char('9')));
        dialog.handle_key(&press(KeyCode::Char('9')));
        assert_eq!(dialog.value(), 10);
    }

    #[test]
    fn list_dialog_delete_reports_selected_key() {
        let entries = vec![
            ListEntry { key: 2, label: "two".into() },
            ListEntry { key: 7, label: "seven".into() },
        ];
        let mut dialog = ListDialog::new(ListKind::Bookmarks, "Bookmarks", entries);
        dialog.handle_key(&press(KeyCode::Down));
        assert_eq!(dialog.handle_key(&press(KeyCode::Char('d'))), ListEvent::Delete(7));
        dialog.remove_entry(7);
        assert_eq!(dialog.entries.len(), 1);
        assert_eq!(dialog.selected, 0);
        assert_eq!(dialog.handle_key(&press(KeyCode::Enter)), ListEvent::Accept(2));
    }

    #[test]
    fn preview_label_shows_first_line_with_ellipsis() {
        assert_eq!(preview_label("short", 20), "short");
        assert_eq!(preview_label("first\nsecond", 20), "first\\n…");
        assert_eq!(preview_label("abcdefghij", 5), "abcd…");
    }
}
