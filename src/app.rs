use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers, ModifierKeyCode, MouseButton,
    MouseEvent, MouseEventKind,
};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::bookmarks::{BookmarkStore, MAX_BOOKMARK_NUMBER, MIN_BOOKMARK_NUMBER};
use crate::clipboard::ClipboardAdapter;
use crate::command::CommandId;
use crate::dialogs::{
    Dialog, DialogEvent, ListDialog, ListEntry, ListEvent, ListKind, NumberDialog, NumberPurpose,
    PromptDialog, PromptPurpose, RepeatDialog, preview_label,
};
use crate::error::{CommandError, CommandResult};
use crate::keys::Chord;
use crate::marking::{KeyVerdict, ModeChords, ModeController};
use crate::model::buffer::Buffer;
use crate::model::config::{AppConfig, Keymap};
use crate::model::mode::Mode;
use crate::model::position::CellPoint;
use crate::msg::Msg;
use crate::repeat::expand_escapes;
use crate::scrap::{ScrapBuffer, ScrapItem};
use crate::search::SearchSupport;
use crate::storage::StateStore;

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

pub struct App {
    pub buffer: Option<Buffer>,
    pub modes: ModeController,
    pub scrap: ScrapBuffer,
    pub bookmarks: BookmarkStore,
    pub search: SearchSupport,
    pub keymap: Keymap,
    pub config: AppConfig,
    pub dialog: Option<Dialog>,
    pub status: Option<String>,
    pub should_quit: bool,
    pub event_tx: mpsc::Sender<Msg>,
    clipboard: Box<dyn ClipboardAdapter>,
    store: StateStore,
    editor_area: Rect,
    last_click: Option<(Instant, CellPoint)>,
    last_mouse_cell: Option<CellPoint>,
    /// Direction remembered while a replace prompt is open.
    pending_replace_forward: bool,
}

impl App {
    pub fn new(
        config: AppConfig,
        event_tx: mpsc::Sender<Msg>,
        mut clipboard: Box<dyn ClipboardAdapter>,
        mut store: StateStore,
    ) -> Result<Self> {
        let keymap = config.keymap();
        let modes = ModeController::new(ModeChords::from_keymap(&keymap));
        let bookmarks = BookmarkStore::load(&mut store);
        let mut scrap = ScrapBuffer::load(&mut store);
        // Pick up anything copied outside the editor before this session;
        // it carries no block size.
        scrap.sync_with_system_clipboard(clipboard.as_mut(), None);
        let search = SearchSupport::new(config.search.clone());

        Ok(Self {
            buffer: None,
            modes,
            scrap,
            bookmarks,
            search,
            keymap,
            config,
            dialog: None,
            status: None,
            should_quit: false,
            event_tx,
            clipboard,
            store,
            editor_area: Rect::new(0, 0, 80, 23),
            last_click: None,
            last_mouse_cell: None,
            pending_replace_forward: true,
        })
    }

    pub fn open_file(&mut self, path: PathBuf) -> Result<()> {
        let mut buffer = Buffer::from_file(path)?;
        buffer.viewport.scroll_off = self.config.editor.scroll_off;
        self.buffer = Some(buffer);
        Ok(())
    }

    pub fn open_empty(&mut self) {
        let mut buffer = Buffer::new();
        buffer.viewport.scroll_off = self.config.editor.scroll_off;
        self.buffer = Some(buffer);
    }

    /// Persist bookmarks, scrap, and any buffer changes at session end.
    pub fn dispose(&mut self) {
        self.bookmarks.save(&mut self.store);
        self.scrap.save(&mut self.store);
        if let Err(err) = self.store.save() {
            tracing::error!("failed to persist state: {err}");
        }
        if let Some(buffer) = &mut self.buffer
            && buffer.dirty
        {
            if let Err(err) = buffer.save_to_disk() {
                tracing::error!("failed to save buffer: {err}");
            }
        }
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key),
            Msg::Mouse(mouse) => self.handle_mouse(mouse),
            Msg::Command(cmd) => self.dispatch(cmd),
            Msg::Tick => self.handle_tick(),
            Msg::Quit => self.should_quit = true,
            Msg::Resize(w, h) => {
                if let Some(buffer) = &mut self.buffer {
                    buffer.viewport.width = w;
                    buffer.viewport.height = h.saturating_sub(1); // status bar
                }
            }
        }
        Ok(())
    }

    /// Route a command identifier to its operation. A single bad command
    /// must never take the session down: failures are logged, surfaced on
    /// the status line, and dropped.
    pub fn dispatch(&mut self, cmd: CommandId) {
        // A modal dialog suspends command dispatch until it closes.
        if self.dialog.is_some() {
            return;
        }

        if let Err(err) = self.try_dispatch(cmd) {
            tracing::error!("command {cmd:?} failed: {err}");
            if matches!(
                err,
                CommandError::NotModifiable | CommandError::SearchNotFound(_)
            ) {
                beep();
            }
            self.status = Some(err.to_string());
        }
    }

    /// Convenience for the external invocation surface: dispatch by
    /// identifier string.
    pub fn dispatch_id(&mut self, id: &str) {
        match CommandId::from_id(id) {
            Some(cmd) => self.dispatch(cmd),
            None => self.status = Some(format!("unknown command: {id}")),
        }
    }

    fn try_dispatch(&mut self, cmd: CommandId) -> CommandResult {
        if self.buffer.is_none() {
            return Err(CommandError::UnsupportedEditor);
        }
        if cmd.needs_modifiable() {
            self.validate_modifiable()?;
        }

        match cmd {
            CommandId::MarkingModeToggle => self.with_buffer(|app, b| {
                app.modes.toggle_marking(b);
                app.status = app.modes.mode().label().map(str::to_string);
                Ok(())
            }),
            CommandId::LineMarkingModeToggle => self.with_buffer(|app, b| {
                app.modes.toggle_line_marking(b);
                app.status = app.modes.mode().label().map(str::to_string);
                Ok(())
            }),
            CommandId::ColumnMarkingModeToggle => self.with_buffer(|app, b| {
                app.modes.toggle_column_marking(b);
                app.status = app.modes.mode().label().map(str::to_string);
                Ok(())
            }),
            CommandId::VirtualCaretModeToggle => self.virtual_caret_mode_toggle(),
            CommandId::NumpadCopy => self.numpad_copy(),
            CommandId::NumpadCut => self.numpad_cut(),
            CommandId::InsertPaste => self.insert_paste(None),
            CommandId::InsertSwap => self.insert_swap(),
            CommandId::Repeat => {
                let invoke = self.keymap.chord_for(CommandId::Repeat);
                self.dialog = Some(Dialog::Repeat(RepeatDialog::new(invoke)));
                Ok(())
            }
            CommandId::ScrollBufferUp => self.scroll_buffer(1),
            CommandId::ScrollBufferDown => self.scroll_buffer(-1),
            CommandId::LineToTopOfWindow => self.with_buffer(|_, b| {
                let y = b.caret_cell().y;
                b.set_top_index(y);
                Ok(())
            }),
            CommandId::CenterLineInWindow => self.center_line_in_window(),
            CommandId::LineToBottomOfWindow => self.line_to_bottom_of_window(),
            CommandId::TopOfBuffer => self.with_buffer(|_, b| {
                b.set_caret(0);
                b.set_top_index(0);
                Ok(())
            }),
            CommandId::BottomOfBuffer => self.with_buffer(|_, b| {
                b.set_caret(b.char_count());
                let last = b.last_display_line();
                b.set_top_index(last);
                Ok(())
            }),
            CommandId::TopOfWindow => self.top_of_window(),
            CommandId::EndOfWindow => self.end_of_window(),
            CommandId::LeftSideOfWindow => self.left_side_of_window(),
            CommandId::RightSideOfWindow => self.right_side_of_window(),
            CommandId::Home => self.home(),
            CommandId::End => self.end(),
            CommandId::GoToLine => self.go_to_line(),
            CommandId::DropBookmark(number) => self.drop_bookmark(number),
            CommandId::JumpBookmark => self.jump_bookmark(),
            CommandId::OpenBookmarksDialog => self.open_bookmarks_dialog(),
            CommandId::OpenScrapDialog => self.open_scrap_dialog(),
            CommandId::SearchForward => self.open_search_prompt(true),
            CommandId::SearchBackward => self.open_search_prompt(false),
            CommandId::ReplaceNext => self.replace_next_previous(true),
            CommandId::ReplacePrevious => self.replace_next_previous(false),
            CommandId::WriteAllAndExit => self.write_all_and_exit(),
        }
    }

    fn with_buffer<F>(&mut self, f: F) -> CommandResult
    where
        F: FnOnce(&mut App, &mut Buffer) -> CommandResult,
    {
        let mut buffer = self.buffer.take().ok_or(CommandError::UnsupportedEditor)?;
        let result = f(self, &mut buffer);
        self.buffer = Some(buffer);
        result
    }

    fn validate_modifiable(&self) -> CommandResult {
        let buffer = self.buffer.as_ref().ok_or(CommandError::UnsupportedEditor)?;
        if buffer.read_only {
            return Err(CommandError::NotModifiable);
        }
        Ok(())
    }

    // ── Key/mouse routing ────────────────────────────────────────

    fn handle_key(&mut self, mut key: KeyEvent) {
        if self.dialog.is_some() {
            self.handle_dialog_key(key);
            return;
        }
        let Some(mut buffer) = self.buffer.take() else {
            return;
        };

        // Active-mode filters see every event first and may rewrite it.
        if self.modes.filter_key(&mut buffer, &mut key) == KeyVerdict::Consume {
            buffer.scroll_to_caret();
            self.buffer = Some(buffer);
            return;
        }

        if key.kind == KeyEventKind::Release {
            self.buffer = Some(buffer);
            return;
        }

        if let Some(cmd) = self.keymap.lookup(Chord::from_event(&key)) {
            self.buffer = Some(buffer);
            self.dispatch(cmd);
            return;
        }

        self.handle_editing_key(&mut buffer, &key);
        buffer.scroll_to_caret();
        self.buffer = Some(buffer);
    }

    /// Default editing behavior underneath the command layer.
    fn handle_editing_key(&mut self, buffer: &mut Buffer, key: &KeyEvent) {
        let extend = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Up => self.move_vertical(buffer, -1, extend),
            KeyCode::Down => self.move_vertical(buffer, 1, extend),
            KeyCode::PageUp => {
                self.move_vertical(buffer, -(buffer.viewport.height as isize), extend)
            }
            KeyCode::PageDown => {
                self.move_vertical(buffer, buffer.viewport.height as isize, extend)
            }
            KeyCode::Left => self.move_horizontal(buffer, -1, extend),
            KeyCode::Right => self.move_horizontal(buffer, 1, extend),
            KeyCode::Esc => {
                self.modes.cancel_all(buffer, true, true);
                self.status = None;
            }
            KeyCode::Enter if !buffer.read_only => {
                buffer.insert("\n");
            }
            KeyCode::Tab if !buffer.read_only => {
                buffer.insert("\t");
            }
            KeyCode::Backspace if !buffer.read_only => buffer.delete_backward(),
            KeyCode::Delete if !buffer.read_only => buffer.delete_forward(),
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                if buffer.read_only {
                    self.status = Some(CommandError::NotModifiable.to_string());
                    beep();
                } else {
                    buffer.insert(&c.to_string());
                }
            }
            _ => {}
        }
        if self.modes.mode() == Mode::LineMarking && is_motion_key(key.code) {
            buffer.snap_selection_to_lines();
        }
    }

    fn move_vertical(&mut self, buffer: &mut Buffer, delta: isize, extend: bool) {
        let cell = buffer.caret_cell();
        let target_y = cell.y.saturating_add_signed(delta).min(buffer.last_display_line());

        if buffer.block_mode() && extend {
            // Column selection may extend into virtual space; the block
            // corner tracks the desired column even past short lines.
            let target = CellPoint::new(target_y, buffer.desired_x.max(cell.x));
            buffer.extend_block_to(target);
            let clamped = buffer
                .offset_at_cell(target)
                .unwrap_or_else(|| clamp_to_line(buffer, target));
            buffer.move_caret(clamped, true);
            return;
        }

        let model_line = buffer.fold.model_line(target_y);
        let x = buffer.desired_x.min(buffer.line_len(model_line));
        let target = buffer.line_start(model_line) + x;
        let sticky = buffer.desired_x;
        buffer.move_caret(target, extend);
        buffer.desired_x = sticky;
    }

    fn move_horizontal(&mut self, buffer: &mut Buffer, delta: isize, extend: bool) {
        let caret = buffer.caret();
        let target = if delta < 0 {
            prev_offset(buffer, caret)
        } else {
            next_offset(buffer, caret)
        };
        buffer.move_caret(target, extend);
    }

    fn handle_mouse(&mut self, mut mouse: MouseEvent) {
        if self.dialog.is_some() {
            return;
        }
        let Some(mut buffer) = self.buffer.take() else {
            return;
        };
        let Some(cell) = self.mouse_cell(&buffer, &mouse) else {
            self.buffer = Some(buffer);
            return;
        };
        self.last_mouse_cell = Some(cell);

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let now = Instant::now();
                let double = self
                    .last_click
                    .is_some_and(|(at, c)| c == cell && now.duration_since(at) < DOUBLE_CLICK_WINDOW);
                self.last_click = Some((now, cell));

                if double {
                    self.modes.on_double_click(&mut buffer);
                } else {
                    self.modes.filter_mouse_down(&mut buffer, &mut mouse, cell);
                    if self.modes.mode() != Mode::VirtualCaret {
                        let extend = mouse.modifiers.contains(KeyModifiers::SHIFT);
                        let offset = buffer
                            .offset_at_cell(cell)
                            .unwrap_or_else(|| clamp_to_line(&buffer, cell));
                        buffer.move_caret(offset, extend);
                        if buffer.block_mode() && extend {
                            buffer.extend_block_to(cell);
                        }
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let offset = buffer
                    .offset_at_cell(cell)
                    .unwrap_or_else(|| clamp_to_line(&buffer, cell));
                buffer.move_caret(offset, true);
                if buffer.block_mode() {
                    buffer.extend_block_to(cell);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.modes.filter_mouse_up(&mut buffer, cell);
            }
            MouseEventKind::ScrollUp => {
                let top = buffer.top_index().saturating_sub(3);
                buffer.set_top_index(top);
            }
            MouseEventKind::ScrollDown => {
                let top = buffer.top_index() + 3;
                buffer.set_top_index(top);
            }
            _ => {}
        }
        self.buffer = Some(buffer);
    }

    fn mouse_cell(&self, buffer: &Buffer, mouse: &MouseEvent) -> Option<CellPoint> {
        let area = self.editor_area;
        if mouse.column < area.x
            || mouse.row < area.y
            || mouse.column >= area.x + area.width
            || mouse.row >= area.y + area.height
        {
            return None;
        }
        Some(CellPoint::new(
            buffer.top_index() + (mouse.row - area.y) as usize,
            (mouse.column - area.x) as usize,
        ))
    }

    fn handle_tick(&mut self) {
        let due = match &mut self.dialog {
            Some(Dialog::Repeat(dialog)) => dialog.on_tick(Instant::now()) == DialogEvent::Accept,
            _ => false,
        };
        if due {
            self.finish_repeat(true);
        }
    }

    // ── Dialog routing ───────────────────────────────────────────

    fn handle_dialog_key(&mut self, key: KeyEvent) {
        enum Resolved {
            Nothing,
            Close,
            Repeat(bool),
            Number(NumberPurpose, u32),
            Prompt(PromptPurpose, String),
            ListAccept(ListKind, u32),
            ListDelete(ListKind, u32),
        }

        let resolved = match &mut self.dialog {
            Some(Dialog::Repeat(dialog)) => match dialog.handle_key(&key) {
                DialogEvent::Accept => Resolved::Repeat(true),
                DialogEvent::Cancel => Resolved::Repeat(false),
                DialogEvent::None => Resolved::Nothing,
            },
            Some(Dialog::Number(dialog)) => match dialog.handle_key(&key) {
                DialogEvent::Accept => Resolved::Number(dialog.purpose, dialog.value()),
                DialogEvent::Cancel => Resolved::Close,
                DialogEvent::None => Resolved::Nothing,
            },
            Some(Dialog::Prompt(dialog)) => match dialog.handle_key(&key) {
                DialogEvent::Accept => {
                    Resolved::Prompt(dialog.purpose, dialog.value().to_string())
                }
                DialogEvent::Cancel => Resolved::Close,
                DialogEvent::None => Resolved::Nothing,
            },
            Some(Dialog::List(dialog)) => match dialog.handle_key(&key) {
                ListEvent::Accept(selected) => Resolved::ListAccept(dialog.kind, selected),
                ListEvent::Delete(selected) => Resolved::ListDelete(dialog.kind, selected),
                ListEvent::Cancel => Resolved::Close,
                ListEvent::None => Resolved::Nothing,
            },
            None => return,
        };

        match resolved {
            Resolved::Nothing => {}
            Resolved::Close => self.dialog = None,
            Resolved::Repeat(accepted) => self.finish_repeat(accepted),
            Resolved::Number(purpose, value) => {
                self.dialog = None;
                self.finish_number(purpose, value);
            }
            Resolved::Prompt(purpose, value) => {
                self.dialog = None;
                self.finish_prompt(purpose, &value);
            }
            Resolved::ListAccept(kind, selected) => {
                self.dialog = None;
                self.finish_list(kind, selected);
            }
            Resolved::ListDelete(kind, selected) => {
                match kind {
                    ListKind::Bookmarks => self.bookmarks.remove(selected as u8),
                    ListKind::Scrap => self.scrap.remove(selected as usize),
                }
                let width = self.editor_area.width.saturating_sub(6) as usize;
                if let Some(Dialog::List(dialog)) = &mut self.dialog {
                    match kind {
                        ListKind::Bookmarks => dialog.remove_entry(selected),
                        // Scrap keys are positional; rebuild rather than
                        // patch around the removed index.
                        ListKind::Scrap => {
                            dialog.entries = scrap_entries(&self.scrap, width);
                            if dialog.selected >= dialog.entries.len() && dialog.selected > 0 {
                                dialog.selected = dialog.entries.len() - 1;
                            }
                        }
                    }
                    if dialog.entries.is_empty() {
                        self.dialog = None;
                    }
                }
            }
        }
    }

    fn finish_repeat(&mut self, accepted: bool) {
        let Some(Dialog::Repeat(dialog)) = self.dialog.take() else {
            return;
        };
        if !accepted {
            return;
        }

        let count = dialog.session.count();
        if let Some(chord) = dialog.session.command_chord() {
            self.replay_chord(chord, count);
            return;
        }

        let string = dialog.session.repeat_string().to_string();
        if string.is_empty() {
            return;
        }
        if self.validate_modifiable().is_err() {
            self.status = Some(CommandError::NotModifiable.to_string());
            beep();
            return;
        }
        let expanded = expand_escapes(&string);
        if let Some(buffer) = &mut self.buffer {
            let complete: String = expanded.repeat(count as usize);
            buffer.insert(&complete);
            buffer.scroll_to_caret();
        }
    }

    /// Replay a captured chord by synthesizing press/release cycles, the
    /// modifiers pressed around the key just as a hand would do it.
    fn replay_chord(&mut self, chord: Chord, count: u32) {
        for _ in 0..count {
            let mut sequence = Vec::new();
            for modifier in modifier_key_codes(chord.mods) {
                sequence.push(key_event(KeyCode::Modifier(modifier), KeyModifiers::NONE, true));
            }
            sequence.push(key_event(chord.code, chord.mods, true));
            sequence.push(key_event(chord.code, chord.mods, false));
            for modifier in modifier_key_codes(chord.mods).into_iter().rev() {
                sequence.push(key_event(KeyCode::Modifier(modifier), KeyModifiers::NONE, false));
            }
            for event in sequence {
                if self.event_tx.send(Msg::Key(event)).is_err() {
                    return;
                }
            }
        }
    }

    fn finish_number(&mut self, purpose: NumberPurpose, value: u32) {
        match purpose {
            NumberPurpose::GoToLine => {
                let Some(buffer) = &mut self.buffer else { return };
                let last_line = buffer.line_count().saturating_sub(1);
                let line = (value as usize).saturating_sub(1).min(last_line);
                let offset = buffer.line_start(line);
                buffer.set_caret(offset);
                buffer.scroll_to_caret();
            }
            NumberPurpose::JumpBookmark => self.jump_to_bookmark(value as u8),
        }
    }

    fn finish_prompt(&mut self, purpose: PromptPurpose, value: &str) {
        match purpose {
            PromptPurpose::SearchForward | PromptPurpose::SearchBackward => {
                if value.is_empty() {
                    return;
                }
                self.search.set_find_string(value);
                self.run_search(purpose == PromptPurpose::SearchForward);
            }
            PromptPurpose::ReplaceWith => {
                self.search.set_replace_string(value);
                let forward = self.pending_replace_forward;
                self.run_replace(forward);
            }
        }
    }

    fn finish_list(&mut self, kind: ListKind, selected: u32) {
        match kind {
            ListKind::Bookmarks => self.jump_to_bookmark(selected as u8),
            ListKind::Scrap => {
                let item = self.scrap.get(selected as usize).cloned();
                if let Some(item) = item {
                    if let Err(err) = self.insert_paste(Some(&item)) {
                        self.status = Some(err.to_string());
                    }
                }
            }
        }
    }

    // ── Clipboard operations ─────────────────────────────────────

    /// Copies the current selection, or the current line if there is no
    /// selection.
    fn numpad_copy(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            // If no text selected, operate on the whole line.
            if !buffer.is_text_selected() {
                buffer.select_current_line();
                let text = buffer.selected_text().unwrap_or_default();
                app.scrap.copy(app.clipboard.as_mut(), |cb| {
                    cb.set_text(&text);
                    None
                });
                app.modes.cancel_all(buffer, true, true);
                return Ok(());
            }

            if app.modes.mode() != Mode::ColumnMarking {
                let text = buffer.selected_text().unwrap_or_default();
                app.scrap.copy(app.clipboard.as_mut(), |cb| {
                    cb.set_text(&text);
                    None
                });
                app.modes.cancel_all(buffer, true, true);
                return Ok(());
            }

            // Column copy: capture the block geometry, then park the caret
            // at the block's lower left so repeated pastes line up.
            let rect = buffer
                .block_rect()
                .ok_or_else(|| CommandError::InvalidArgument("no block selection".to_string()))?;
            let text = buffer.extract_block(rect);
            app.scrap.copy(app.clipboard.as_mut(), |cb| {
                cb.set_text(&text);
                Some((rect.width, rect.height))
            });
            app.modes.cancel_all(buffer, false, true);

            let lower_left = CellPoint::new(rect.y + rect.height, rect.x);
            match buffer.offset_at_cell(lower_left) {
                Some(offset) => buffer.set_caret(offset),
                // Can't place the caret there, so just drop the selection.
                None => buffer.clear_selection(),
            }
            Ok(())
        })
    }

    /// Cuts the current selection, or the current line if there is no
    /// selection.
    fn numpad_cut(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            if !buffer.is_text_selected() {
                buffer.select_current_line();
            }

            if app.modes.mode() != Mode::ColumnMarking {
                let text = buffer.selected_text().unwrap_or_default();
                app.scrap.cut(app.clipboard.as_mut(), |cb| {
                    cb.set_text(&text);
                    None
                });
                buffer.cut_selection();
                app.modes.cancel_all(buffer, true, true);
                return Ok(());
            }

            let rect = buffer
                .block_rect()
                .ok_or_else(|| CommandError::InvalidArgument("no block selection".to_string()))?;
            let text = buffer.extract_block(rect);
            app.scrap.cut(app.clipboard.as_mut(), |cb| {
                cb.set_text(&text);
                Some((rect.width, rect.height))
            });
            buffer.delete_block(rect);
            app.modes.cancel_all(buffer, false, true);
            buffer.clear_selection();
            let offset = buffer
                .offset_at_cell(CellPoint::new(rect.y, rect.x))
                .unwrap_or_else(|| clamp_to_line(buffer, CellPoint::new(rect.y, rect.x)));
            buffer.set_caret(offset);
            Ok(())
        })
    }

    /// Pastes the given scrap item, or the clipboard contents, in either
    /// normal or block mode.
    fn insert_paste(&mut self, scrap_item: Option<&ScrapItem>) -> CommandResult {
        self.validate_modifiable()?;
        let is_column = match scrap_item {
            Some(item) => item.is_column_content(),
            None => self.scrap.clipboard_is_column_content(),
        };

        self.with_buffer(|app, buffer| {
            let text = match scrap_item {
                Some(item) => item.text.clone(),
                None => app.clipboard.get_text().unwrap_or_default(),
            };
            if text.is_empty() {
                return Ok(());
            }

            if !is_column {
                buffer.insert(&text);
                app.modes.cancel_all(buffer, false, true);
                return Ok(());
            }

            // Block paste starts at the caret — the virtual caret if one
            // is parked out in virtual space.
            let at = buffer.caret_cell();
            let size = match scrap_item {
                Some(item) => item.block_size,
                None => app.scrap.clipboard_column_mode_size(),
            }
            .unwrap_or((0, text.lines().count().max(1)));
            buffer.insert_block(&text, at);

            // Caret to the lower left of the pasted block so multiple
            // pastes stack.
            let lower_left = CellPoint::new(at.y + size.1, at.x);
            match buffer.offset_at_cell(lower_left) {
                Some(offset) => buffer.set_caret(offset),
                None => buffer.clear_selection(),
            }
            app.modes.cancel_all(buffer, false, false);
            buffer.scroll_to_caret();
            Ok(())
        })
    }

    /// Swaps the current selection with the contents of the clipboard.
    fn insert_swap(&mut self) -> CommandResult {
        // Feature not for column select mode.
        if self.modes.mode() == Mode::ColumnMarking || self.scrap.clipboard_is_column_content() {
            return Ok(());
        }
        let has_selection = self
            .buffer
            .as_ref()
            .is_some_and(|b| b.is_text_selected());
        // If no current selection, don't assume the whole line.
        if !has_selection {
            return Ok(());
        }

        // Save the clipboard now; the cut below will replace it.
        let saved = self.clipboard.get_text().unwrap_or_default();

        self.numpad_cut()?;

        self.with_buffer(|_, buffer| {
            buffer.insert(&saved);
            Ok(())
        })
    }

    // ── Scrolling & window motion ────────────────────────────────

    /// Scrolls the buffer by the given number of lines; the caret stays.
    fn scroll_buffer(&mut self, lines: isize) -> CommandResult {
        self.with_buffer(|_, buffer| {
            let top = buffer.top_index().saturating_add_signed(lines);
            buffer.set_top_index(top);
            Ok(())
        })
    }

    fn center_line_in_window(&mut self) -> CommandResult {
        self.with_buffer(|_, buffer| {
            let y = buffer.caret_cell().y;
            let top = buffer.top_index();
            let bottom = buffer.bottom_index();
            let middle = top + (bottom - top) / 2;
            let new_top = (top + y).saturating_sub(middle);
            buffer.set_top_index(new_top);
            Ok(())
        })
    }

    fn line_to_bottom_of_window(&mut self) -> CommandResult {
        self.with_buffer(|_, buffer| {
            let y = buffer.caret_cell().y;
            let bottom = buffer.bottom_index();
            let new_top = buffer.top_index().saturating_sub(bottom.saturating_sub(y));
            buffer.set_top_index(new_top);
            Ok(())
        })
    }

    /// Moves the caret to the top visible line, keeping the column.
    fn top_of_window(&mut self) -> CommandResult {
        self.with_buffer(|_, buffer| {
            let column = buffer.caret() - buffer.line_start(buffer.line_of(buffer.caret()));
            let model_line = buffer.fold.model_line(buffer.top_index());
            let target = buffer.line_start(model_line) + column.min(buffer.line_len(model_line));
            buffer.set_caret(target);
            Ok(())
        })
    }

    /// Moves the caret to the bottom visible line, keeping the column.
    fn end_of_window(&mut self) -> CommandResult {
        self.with_buffer(|_, buffer| {
            let column = buffer.caret() - buffer.line_start(buffer.line_of(buffer.caret()));
            let model_line = buffer.fold.model_line(buffer.bottom_index());
            let target = buffer.line_start(model_line) + column.min(buffer.line_len(model_line));
            buffer.set_caret(target);
            Ok(())
        })
    }

    /// Places the caret at the left edge of the window on the current line.
    fn left_side_of_window(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            let cell = CellPoint::new(buffer.caret_cell().y, 0);
            match buffer.offset_at_cell(cell) {
                Some(offset) => buffer.set_caret(offset),
                None => app.reach_virtual_cell(buffer, cell),
            }
            Ok(())
        })
    }

    /// Places the caret at the right edge of the window on the current
    /// line. This is usually virtual space, which needs block selection
    /// representation.
    fn right_side_of_window(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            let x = buffer.viewport.width.saturating_sub(1) as usize;
            let cell = CellPoint::new(buffer.caret_cell().y, x);
            match buffer.offset_at_cell(cell) {
                Some(offset) => buffer.set_caret(offset),
                None => app.reach_virtual_cell(buffer, cell),
            }
            Ok(())
        })
    }

    /// A window-edge destination that landed in virtual space: column
    /// marking stretches the block out to it, anything else re-enters
    /// virtual caret mode there.
    fn reach_virtual_cell(&mut self, buffer: &mut Buffer, cell: CellPoint) {
        if self.modes.mode() == Mode::ColumnMarking {
            if let Some(mut rect) = buffer.block_rect() {
                rect.width = cell.x.saturating_sub(rect.x);
                buffer.set_block_rect(rect);
                return;
            }
        }
        if self.modes.mode() == Mode::VirtualCaret {
            self.modes.cancel_all(buffer, false, true);
        }
        self.modes.enter_virtual_caret(buffer, cell);
    }

    fn virtual_caret_mode_toggle(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            let cell = app.last_mouse_cell.unwrap_or_else(|| {
                // Keyboard fallback: one column past the end of the
                // current line is always virtual.
                let y = buffer.caret_cell().y;
                let model_line = buffer.fold.model_line(y);
                CellPoint::new(y, buffer.line_len(model_line) + 1)
            });
            app.modes.toggle_virtual_caret(buffer, cell);
            app.status = app.modes.mode().label().map(str::to_string);
            Ok(())
        })
    }

    // ── Home/End three-tier motion ───────────────────────────────

    /// Moves the caret to the beginning of the line, or window, or file,
    /// depending on where it already is.
    fn home(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            let caret = buffer.caret();
            let line_start = buffer.line_start(buffer.line_of(caret));
            let window_start = buffer.line_start(buffer.fold.model_line(buffer.top_index()));
            let extend = app.modes.is_marking();

            if caret == 0 {
                return Ok(());
            }
            if caret == window_start {
                buffer.move_caret(0, extend);
                buffer.set_top_index(0);
            } else if caret == line_start {
                buffer.move_caret(window_start, extend);
            } else {
                buffer.move_caret(line_start, extend);
            }
            if app.modes.mode() == Mode::LineMarking {
                buffer.snap_selection_to_lines();
            }
            buffer.scroll_to_caret();
            Ok(())
        })
    }

    /// Moves the caret to the end of the line, or window, or file,
    /// depending on where it already is.
    fn end(&mut self) -> CommandResult {
        self.with_buffer(|app, buffer| {
            let caret = buffer.caret();
            let line_end = buffer.line_end_offset(caret);
            let bottom_model = buffer.fold.model_line(buffer.bottom_index());
            let window_end = buffer.line_start(bottom_model) + buffer.line_len(bottom_model);
            let file_end = buffer.char_count();
            let extend = app.modes.is_marking();

            if caret == file_end {
                return Ok(());
            }
            if caret == window_end {
                buffer.move_caret(file_end, extend);
            } else if caret == line_end {
                buffer.move_caret(window_end, extend);
            } else {
                buffer.move_caret(line_end, extend);
            }
            if app.modes.mode() == Mode::LineMarking {
                buffer.snap_selection_to_lines();
            }
            buffer.scroll_to_caret();
            Ok(())
        })
    }

    // ── Dialog-opening commands ──────────────────────────────────

    fn go_to_line(&mut self) -> CommandResult {
        let buffer = self.buffer.as_ref().ok_or(CommandError::UnsupportedEditor)?;
        let current = buffer.line_of(buffer.caret()) + 1;
        self.dialog = Some(Dialog::Number(NumberDialog::new(
            NumberPurpose::GoToLine,
            "Go to line: ",
            current as u32,
            1,
            999_999,
        )));
        Ok(())
    }

    fn drop_bookmark(&mut self, number: u8) -> CommandResult {
        self.with_buffer(|app, buffer| {
            app.bookmarks.drop_bookmark(number, buffer)?;
            if app.bookmarks.get(number).is_some() {
                app.status = Some(format!("Dropped bookmark {number}"));
            }
            Ok(())
        })
    }

    fn jump_bookmark(&mut self) -> CommandResult {
        if self.bookmarks.is_empty() {
            self.status = Some("No bookmarks dropped".to_string());
            return Ok(());
        }
        self.dialog = Some(Dialog::Number(NumberDialog::new(
            NumberPurpose::JumpBookmark,
            "Jump to bookmark: ",
            MIN_BOOKMARK_NUMBER as u32,
            MIN_BOOKMARK_NUMBER as u32,
            MAX_BOOKMARK_NUMBER as u32,
        )));
        Ok(())
    }

    /// Follow a bookmark: only an already-open buffer whose resource path
    /// matches is activated; bookmarks never open files themselves.
    fn jump_to_bookmark(&mut self, number: u8) {
        let Some(bookmark) = self.bookmarks.get(number) else {
            return;
        };
        let offset = bookmark.offset;
        let resource = bookmark.resource.clone();

        let Some(buffer) = &mut self.buffer else {
            return;
        };
        let matches = buffer
            .path
            .as_ref()
            .is_some_and(|p| p.display().to_string() == resource);
        if !matches {
            self.status = Some(format!("Bookmark {number} is in {resource}"));
            return;
        }
        buffer.set_caret(offset.min(buffer.char_count()));
        buffer.scroll_to_caret();
    }

    fn open_bookmarks_dialog(&mut self) -> CommandResult {
        if self.bookmarks.is_empty() {
            self.status = Some("No bookmarks dropped".to_string());
            return Ok(());
        }
        let width = self.editor_area.width.saturating_sub(6) as usize;
        let entries = self
            .bookmarks
            .list()
            .into_iter()
            .map(|b| ListEntry {
                key: b.number as u32,
                label: format!(
                    "{:>2}  {:<10}  {}",
                    b.number,
                    b.line_column,
                    preview_label(&b.resource, width.saturating_sub(16))
                ),
            })
            .collect();
        self.dialog = Some(Dialog::List(ListDialog::new(
            ListKind::Bookmarks,
            "Bookmarks",
            entries,
        )));
        Ok(())
    }

    fn open_scrap_dialog(&mut self) -> CommandResult {
        if self.scrap.item_count() == 0 {
            self.status = Some("No scrap items".to_string());
            return Ok(());
        }
        let width = self.editor_area.width.saturating_sub(6) as usize;
        let entries = scrap_entries(&self.scrap, width);
        self.dialog = Some(Dialog::List(ListDialog::new(ListKind::Scrap, "Scrap", entries)));
        Ok(())
    }

    // ── Search ───────────────────────────────────────────────────

    fn open_search_prompt(&mut self, forward: bool) -> CommandResult {
        let purpose = if forward {
            PromptPurpose::SearchForward
        } else {
            PromptPurpose::SearchBackward
        };
        let initial = self.search.find_string().unwrap_or_default().to_string();
        let prompt = if forward { "Search: " } else { "Search back: " };
        self.dialog = Some(Dialog::Prompt(PromptDialog::new(purpose, prompt, &initial)));
        Ok(())
    }

    fn run_search(&mut self, forward: bool) {
        let result = {
            let Some(buffer) = self.buffer.as_ref() else { return };
            self.search.find(buffer, forward)
        };
        match result {
            Ok((start, end)) => {
                if let Some(buffer) = &mut self.buffer {
                    buffer.set_selection(start, end);
                    buffer.scroll_to_caret();
                    self.status = None;
                }
            }
            Err(err) => {
                if matches!(err, CommandError::SearchNotFound(_)) {
                    beep();
                }
                self.status = Some(err.to_string());
            }
        }
    }

    fn replace_next_previous(&mut self, forward: bool) -> CommandResult {
        if self.search.find_string().is_none() {
            self.status = Some("no search string".to_string());
            return Ok(());
        }
        if self.search.replace_string().is_none() {
            self.pending_replace_forward = forward;
            self.dialog = Some(Dialog::Prompt(PromptDialog::new(
                PromptPurpose::ReplaceWith,
                "Replace with: ",
                "",
            )));
            return Ok(());
        }
        self.run_replace(forward);
        Ok(())
    }

    fn run_replace(&mut self, forward: bool) {
        let result = {
            let Some(buffer) = self.buffer.as_mut() else { return };
            self.search.replace(buffer, forward)
        };
        match result {
            Ok((_, end)) => {
                if let Some(buffer) = &mut self.buffer {
                    buffer.set_caret(end);
                    buffer.scroll_to_caret();
                }
            }
            Err(err) => {
                if matches!(err, CommandError::SearchNotFound(_)) {
                    beep();
                }
                self.status = Some(err.to_string());
            }
        }
    }

    fn write_all_and_exit(&mut self) -> CommandResult {
        if let Some(buffer) = &mut self.buffer
            && let Err(err) = buffer.save_to_disk()
        {
            return Err(CommandError::InvalidArgument(format!("save failed: {err}")));
        }
        self.should_quit = true;
        Ok(())
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // editor
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        self.editor_area = chunks[0];
        if let Some(buffer) = &mut self.buffer {
            buffer.viewport.width = chunks[0].width;
            buffer.viewport.height = chunks[0].height;
        }

        self.render_editor(frame, chunks[0]);
        self.render_status_bar(frame, chunks[1]);
        self.render_dialog(frame);
    }

    fn render_editor(&self, frame: &mut Frame, area: Rect) {
        let Some(buffer) = &self.buffer else {
            return;
        };

        let top = buffer.top_index();
        let bottom = top + area.height as usize;
        let selection = buffer.selection_range();
        let block_rect = buffer.block_mode().then(|| buffer.block_rect()).flatten();

        let selected_style = Style::default().add_modifier(Modifier::REVERSED);
        let mut lines = Vec::with_capacity(area.height as usize);

        for display_y in top..bottom {
            let model_line = buffer.fold.model_line(display_y);
            if model_line >= buffer.line_count() {
                lines.push(Line::default());
                continue;
            }
            let text = buffer.line_text(model_line).unwrap_or_default();

            // Column-mode highlight takes priority over stream selection.
            if let Some(rect) = block_rect {
                if display_y >= rect.y && display_y < rect.y + rect.height && rect.width > 0 {
                    lines.push(split_line(&text, rect.x, rect.x + rect.width, selected_style));
                    continue;
                }
            } else if let Some((sel_start, sel_end)) = selection {
                let line_start = buffer.line_start(model_line);
                let line_len = text.chars().count();
                let line_end = line_start + line_len;
                if sel_start < line_end + 1 && sel_end > line_start {
                    let from = sel_start.saturating_sub(line_start).min(line_len);
                    let to = sel_end.saturating_sub(line_start).min(line_len);
                    // A selection crossing the delimiter highlights the
                    // full width of the text that is there.
                    lines.push(split_line(&text, from, to.max(from), selected_style));
                    continue;
                }
            }

            lines.push(Line::from(text));
        }

        frame.render_widget(Paragraph::new(lines), area);

        // The terminal cursor sits at the virtual caret when one is
        // parked, otherwise at the real caret.
        let cell = buffer.caret_cell();
        if cell.y >= top && cell.y < bottom {
            let x = area.x + (cell.x as u16).min(area.width.saturating_sub(1));
            let y = area.y + (cell.y - top) as u16;
            frame.set_cursor_position((x, y));
        }
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mode_label = self.modes.mode().label().unwrap_or("EDIT");
        let mode_span = Span::styled(
            format!(" {mode_label} "),
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

        let (file_name, position, dirty) = match &self.buffer {
            Some(buffer) => {
                let name = buffer
                    .path
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "[no file]".to_string());
                let cell = buffer.caret_cell();
                (
                    name,
                    format!("{}:{}", cell.y + 1, cell.x + 1),
                    if buffer.dirty { " [+]" } else { "" },
                )
            }
            None => ("[no editor]".to_string(), String::new(), ""),
        };

        let message = self.status.as_deref().unwrap_or("");
        let info = Span::styled(
            format!(" {file_name}{dirty}  {position}  {message}"),
            Style::default().fg(Color::Gray).bg(Color::DarkGray),
        );

        let bar = Line::from(vec![mode_span, info]);
        frame.render_widget(
            Paragraph::new(bar).style(Style::default().bg(Color::DarkGray)),
            area,
        );
    }

    fn render_dialog(&self, frame: &mut Frame) {
        let Some(dialog) = &self.dialog else { return };
        let area = frame.area();

        match dialog {
            Dialog::Repeat(d) => {
                self.render_prompt_box(frame, area, "Repeat", d.field.text(), d.field.caret())
            }
            Dialog::Number(d) => {
                self.render_prompt_box(frame, area, "Number", d.field.text(), d.field.caret())
            }
            Dialog::Prompt(d) => {
                self.render_prompt_box(frame, area, "Find", d.field.text(), d.field.caret())
            }
            Dialog::List(d) => {
                let height = (d.entries.len() as u16 + 2).min(area.height.saturating_sub(2));
                let width = area.width.saturating_sub(4).min(72);
                let rect = centered(area, width, height);
                frame.render_widget(Clear, rect);
                let lines: Vec<Line> = d
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| {
                        let style = if i == d.selected {
                            Style::default().add_modifier(Modifier::REVERSED)
                        } else {
                            Style::default()
                        };
                        Line::from(Span::styled(entry.label.clone(), style))
                    })
                    .collect();
                let paragraph = Paragraph::new(lines)
                    .block(Block::default().borders(Borders::ALL).title(d.title));
                frame.render_widget(paragraph, rect);
            }
        }
    }

    fn render_prompt_box(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: &str,
        text: &str,
        caret: usize,
    ) {
        let width = area.width.saturating_sub(4).min(72);
        let rect = centered(area, width, 3);
        frame.render_widget(Clear, rect);
        let paragraph = Paragraph::new(Line::from(text.to_string()))
            .block(Block::default().borders(Borders::ALL).title(title.to_string()));
        frame.render_widget(paragraph, rect);

        let inner_width = width.saturating_sub(2) as usize;
        let x = rect.x + 1 + (caret.min(inner_width)) as u16;
        frame.set_cursor_position((x, rect.y + 1));
    }
}

fn scrap_entries(scrap: &ScrapBuffer, width: usize) -> Vec<ListEntry> {
    scrap
        .items()
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let tag = if item.is_column_content() { "▦ " } else { "  " };
            ListEntry {
                key: index as u32,
                label: format!("{tag}{}", preview_label(&item.text, width.saturating_sub(2))),
            }
        })
        .collect()
}

/// A display line with `[from, to)` (char columns) highlighted. Columns
/// past the end of the text render as highlighted blanks, which is how a
/// block selection over a short line shows up.
fn split_line(text: &str, from: usize, to: usize, style: Style) -> Line<'static> {
    let chars: Vec<char> = text.chars().collect();
    let pre: String = chars.iter().take(from.min(chars.len())).collect();
    let mid: String = (from..to)
        .map(|i| chars.get(i).copied().unwrap_or(' '))
        .collect();
    let post: String = chars.iter().skip(to).collect();

    Line::from(vec![
        Span::raw(pre),
        Span::styled(mid, style),
        Span::raw(post),
    ])
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

fn is_motion_key(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Up
            | KeyCode::Down
            | KeyCode::Left
            | KeyCode::Right
            | KeyCode::PageUp
            | KeyCode::PageDown
    )
}

/// One char back, treating CRLF as a single step.
fn prev_offset(buffer: &Buffer, caret: usize) -> usize {
    if caret == 0 {
        return 0;
    }
    if caret >= 2 && buffer.rope.char(caret - 1) == '\n' && buffer.rope.char(caret - 2) == '\r' {
        caret - 2
    } else {
        caret - 1
    }
}

/// One char forward, treating CRLF as a single step.
fn next_offset(buffer: &Buffer, caret: usize) -> usize {
    let len = buffer.char_count();
    if caret >= len {
        return len;
    }
    if buffer.rope.char(caret) == '\r' && caret + 1 < len && buffer.rope.char(caret + 1) == '\n' {
        caret + 2
    } else {
        caret + 1
    }
}

fn clamp_to_line(buffer: &Buffer, cell: CellPoint) -> usize {
    let model_line = buffer.fold.model_line(cell.y);
    if model_line >= buffer.line_count() {
        return buffer.char_count();
    }
    buffer.line_start(model_line) + cell.x.min(buffer.line_len(model_line))
}

fn key_event(code: KeyCode, modifiers: KeyModifiers, press: bool) -> KeyEvent {
    KeyEvent {
        code,
        modifiers,
        kind: if press {
            KeyEventKind::Press
        } else {
            KeyEventKind::Release
        },
        state: KeyEventState::NONE,
    }
}

fn modifier_key_codes(mods: KeyModifiers) -> Vec<ModifierKeyCode> {
    let mut codes = Vec::new();
    if mods.contains(KeyModifiers::CONTROL) {
        codes.push(ModifierKeyCode::LeftControl);
    }
    if mods.contains(KeyModifiers::ALT) {
        codes.push(ModifierKeyCode::LeftAlt);
    }
    if mods.contains(KeyModifiers::SHIFT) {
        codes.push(ModifierKeyCode::LeftShift);
    }
    codes
}

/// Audible bell for NotModifiable and SearchNotFound.
fn beep() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}
