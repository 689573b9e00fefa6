use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, ModifierKeyCode, MouseEvent,
};
use tracing::debug;

use crate::keys::{self, Chord};
use crate::model::buffer::Buffer;
use crate::model::config::Keymap;
use crate::model::mode::Mode;
use crate::model::position::CellPoint;
use crate::command::CommandId;

/// The event streams a mode can hook. Exactly one filter per (mode, kind)
/// pair may be registered at a time; registration and removal are paired
/// once per mode entry/exit. A leaked filter would keep reinterpreting
/// keystrokes after its mode ended, so the registry is the ground truth the
/// dispatch path consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    MouseDown,
    MouseUp,
    DoubleClick,
}

#[derive(Default)]
struct FilterRegistry {
    entries: Vec<(Mode, EventKind)>,
}

impl FilterRegistry {
    fn install(&mut self, mode: Mode, kinds: &[EventKind]) {
        for &kind in kinds {
            debug_assert!(
                !self.entries.contains(&(mode, kind)),
                "duplicate filter registration for {mode:?}/{kind:?}"
            );
            self.entries.push((mode, kind));
        }
    }

    fn remove(&mut self, mode: Mode) {
        self.entries.retain(|(m, _)| *m != mode);
    }

    fn is_installed(&self, mode: Mode, kind: EventKind) -> bool {
        self.entries.contains(&(mode, kind))
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the key filter decided about an event. `Forward` lets normal
/// handling continue with the (possibly modified) event; `Consume` ends its
/// processing here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVerdict {
    Forward,
    Consume,
}

/// Mode-entry chords, resolved once at startup from the keybinding table so
/// the filters never re-consult configuration per keystroke.
#[derive(Debug, Clone, Copy)]
pub struct ModeChords {
    pub modifier: KeyModifiers,
    pub marking: Option<char>,
    pub line_marking: Option<char>,
    pub column_marking: Option<char>,
    pub virtual_caret: Option<char>,
}

impl ModeChords {
    pub fn from_keymap(keymap: &Keymap) -> Self {
        let letter = |cmd: CommandId| -> Option<char> {
            match keymap.chord_for(cmd) {
                Some(Chord {
                    code: KeyCode::Char(c),
                    ..
                }) => Some(c),
                _ => None,
            }
        };
        let modifier = keymap
            .chord_for(CommandId::MarkingModeToggle)
            .map(|c| c.mods)
            .filter(|m| !m.is_empty())
            .unwrap_or(KeyModifiers::ALT);
        Self {
            modifier,
            marking: letter(CommandId::MarkingModeToggle),
            line_marking: letter(CommandId::LineMarkingModeToggle),
            column_marking: letter(CommandId::ColumnMarkingModeToggle),
            virtual_caret: letter(CommandId::VirtualCaretModeToggle),
        }
    }
}

impl Default for ModeChords {
    fn default() -> Self {
        Self {
            modifier: KeyModifiers::ALT,
            marking: Some('m'),
            line_marking: Some('l'),
            column_marking: Some('c'),
            virtual_caret: Some('v'),
        }
    }
}

/// Owns the mutually exclusive marking modes for one buffer and the filter
/// lifecycle each of them needs. Single-active-mode is enforced here, not
/// by caller convention: every entry point exits the other modes first and
/// the start methods assert a clean slate.
pub struct ModeController {
    mode: Mode,
    registry: FilterRegistry,
    chords: ModeChords,
    /// When the terminal cannot deliver key-release events, the start
    /// handshake is skipped and filters interpret keys immediately.
    handshake_enabled: bool,
    got_modifier: bool,
    got_mode_key: bool,
}

impl ModeController {
    pub fn new(chords: ModeChords) -> Self {
        Self {
            mode: Mode::Idle,
            registry: FilterRegistry::default(),
            chords,
            handshake_enabled: true,
            got_modifier: false,
            got_mode_key: false,
        }
    }

    pub fn set_handshake_enabled(&mut self, enabled: bool) {
        self.handshake_enabled = enabled;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Any mode in which navigation keys extend the selection.
    pub fn is_marking(&self) -> bool {
        matches!(
            self.mode,
            Mode::Marking | Mode::LineMarking | Mode::ColumnMarking
        )
    }

    fn reset_handshake(&mut self) {
        self.got_modifier = !self.handshake_enabled;
        self.got_mode_key = !self.handshake_enabled;
    }

    fn handshake_complete(&self) -> bool {
        self.got_modifier && self.got_mode_key
    }

    // ── Mode entry/exit ──────────────────────────────────────────

    fn start_marking(&mut self) {
        debug_assert_eq!(self.mode, Mode::Idle, "mode entry on a dirty slate");
        self.mode = Mode::Marking;
        self.registry.install(
            Mode::Marking,
            &[
                EventKind::KeyDown,
                EventKind::KeyUp,
                EventKind::MouseDown,
                EventKind::DoubleClick,
            ],
        );
        self.reset_handshake();
        debug!("marking mode started");
    }

    fn stop_marking(&mut self) {
        self.registry.remove(Mode::Marking);
        self.mode = Mode::Idle;
    }

    fn start_line_marking(&mut self, buffer: &mut Buffer) {
        debug_assert_eq!(self.mode, Mode::Idle, "mode entry on a dirty slate");
        self.mode = Mode::LineMarking;

        // Line marking mode starts with a full line selection.
        buffer.select_current_line();

        self.registry.install(
            Mode::LineMarking,
            &[
                EventKind::KeyDown,
                EventKind::KeyUp,
                EventKind::MouseDown,
                EventKind::MouseUp,
                EventKind::DoubleClick,
            ],
        );
        self.reset_handshake();
        debug!("line marking mode started");
    }

    fn stop_line_marking(&mut self) {
        self.registry.remove(Mode::LineMarking);
        self.mode = Mode::Idle;
    }

    fn start_column_marking(&mut self, buffer: &mut Buffer) {
        debug_assert_eq!(self.mode, Mode::Idle, "mode entry on a dirty slate");
        self.mode = Mode::ColumnMarking;
        buffer.set_block_mode(true);
        buffer.set_block_anchor(buffer.caret_cell());
        self.registry.install(
            Mode::ColumnMarking,
            &[
                EventKind::KeyDown,
                EventKind::KeyUp,
                EventKind::MouseDown,
                EventKind::DoubleClick,
            ],
        );
        self.reset_handshake();
        debug!("column marking mode started");
    }

    fn stop_column_marking(&mut self, buffer: &mut Buffer, disable_block_mode: bool) {
        self.registry.remove(Mode::ColumnMarking);
        if disable_block_mode {
            buffer.set_block_mode(false);
        }
        self.mode = Mode::Idle;
    }

    fn start_virtual_caret(&mut self, buffer: &mut Buffer, cell: CellPoint) {
        debug_assert_eq!(self.mode, Mode::Idle, "mode entry on a dirty slate");
        self.mode = Mode::VirtualCaret;
        buffer.set_block_mode(true);
        buffer.virtual_caret = Some(cell);
        self.registry.install(
            Mode::VirtualCaret,
            &[
                EventKind::KeyDown,
                EventKind::KeyUp,
                EventKind::MouseDown,
                EventKind::MouseUp,
            ],
        );
        self.reset_handshake();
        debug!("virtual caret mode started at {cell:?}");
    }

    fn stop_virtual_caret(&mut self, buffer: &mut Buffer, disable_block_mode: bool) {
        self.registry.remove(Mode::VirtualCaret);
        buffer.virtual_caret = None;
        if disable_block_mode {
            buffer.set_block_mode(false);
        }
        self.mode = Mode::Idle;
    }

    /// Idempotently exit every active mode. Used as a precondition by every
    /// mode entry and by any command that needs a clean slate.
    pub fn cancel_all(&mut self, buffer: &mut Buffer, remove_selection: bool, reset_block_mode: bool) {
        match self.mode {
            Mode::Idle => {}
            Mode::Marking => self.stop_marking(),
            Mode::LineMarking => self.stop_line_marking(),
            Mode::ColumnMarking => self.stop_column_marking(buffer, reset_block_mode),
            Mode::VirtualCaret => self.stop_virtual_caret(buffer, true),
        }
        debug_assert!(self.registry.is_empty(), "filters leaked past mode exit");

        if remove_selection {
            buffer.clear_selection();
        }
    }

    /// Starts or stops the normal marking mode.
    pub fn toggle_marking(&mut self, buffer: &mut Buffer) {
        let was_active = self.mode == Mode::Marking;
        self.cancel_all(buffer, false, true);
        buffer.clear_selection();
        if !was_active {
            self.start_marking();
        }
    }

    /// Starts or stops the line marking mode.
    pub fn toggle_line_marking(&mut self, buffer: &mut Buffer) {
        let was_active = self.mode == Mode::LineMarking;
        self.cancel_all(buffer, false, true);
        buffer.clear_selection();
        if !was_active {
            self.start_line_marking(buffer);
        }
    }

    /// Starts or stops the column marking mode. A transition directly from
    /// virtual caret mode keeps block selection on so the representation
    /// never flickers off and back.
    pub fn toggle_column_marking(&mut self, buffer: &mut Buffer) {
        let was_active = self.mode == Mode::ColumnMarking;
        let virtual_cell = (self.mode == Mode::VirtualCaret)
            .then_some(buffer.virtual_caret)
            .flatten();

        match self.mode {
            Mode::Marking => self.stop_marking(),
            Mode::LineMarking => self.stop_line_marking(),
            Mode::ColumnMarking => self.stop_column_marking(buffer, true),
            Mode::VirtualCaret => self.stop_virtual_caret(buffer, false),
            Mode::Idle => {}
        }
        if virtual_cell.is_none() {
            buffer.clear_selection();
        }

        if !was_active {
            self.start_column_marking(buffer);
            // Coming out of virtual caret mode the block anchors where the
            // virtual caret sat, not at the real caret behind it.
            if let Some(cell) = virtual_cell {
                buffer.set_block_anchor(cell);
            }
        }
    }

    /// Starts or stops the virtual caret mode. Entry requires a cell that
    /// maps to no real offset; on a real offset the toggle is a no-op, not
    /// an error.
    pub fn toggle_virtual_caret(&mut self, buffer: &mut Buffer, cell: CellPoint) {
        if self.mode == Mode::VirtualCaret {
            self.stop_virtual_caret(buffer, true);
            return;
        }
        if buffer.offset_at_cell(cell).is_some() {
            return;
        }
        self.cancel_all(buffer, false, false);
        self.start_virtual_caret(buffer, cell);
    }

    /// Enter virtual caret mode from a command (window-edge motions) that
    /// already knows the destination is virtual.
    pub fn enter_virtual_caret(&mut self, buffer: &mut Buffer, cell: CellPoint) {
        self.toggle_virtual_caret(buffer, cell);
    }

    // ── Event filters ────────────────────────────────────────────

    /// Run the active mode's key filter over an event. The event may be
    /// modified in place (selection promotion, arrow remapping); a
    /// `Consume` verdict ends its processing.
    pub fn filter_key(&mut self, buffer: &mut Buffer, event: &mut KeyEvent) -> KeyVerdict {
        let kind = match event.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => EventKind::KeyDown,
            KeyEventKind::Release => EventKind::KeyUp,
        };
        if !self.registry.is_installed(self.mode, kind) {
            return KeyVerdict::Forward;
        }

        match self.mode {
            Mode::Marking | Mode::ColumnMarking => self.marking_key_filter(buffer, event, kind),
            Mode::LineMarking => self.line_marking_key_filter(buffer, event, kind),
            Mode::VirtualCaret => self.virtual_caret_key_filter(buffer, event, kind),
            Mode::Idle => KeyVerdict::Forward,
        }
    }

    /// Advance the start handshake. Returns true while the handshake is
    /// still pending and the event must not be interpreted: the key-down
    /// that invoked the mode toggle is itself delivered to the filter, so
    /// nothing is acted on until both the chord modifier and the mode's
    /// letter key have been seen released.
    fn handshake_pending(&mut self, event: &KeyEvent, kind: EventKind, letter: Option<char>) -> bool {
        if self.handshake_complete() {
            return false;
        }

        if kind == EventKind::KeyUp {
            if !self.got_modifier && is_modifier_release(event.code, self.chords.modifier) {
                self.got_modifier = true;
            }
            if !self.got_mode_key
                && letter.is_some_and(|l| {
                    matches!(event.code, KeyCode::Char(c) if c.eq_ignore_ascii_case(&l))
                })
            {
                self.got_mode_key = true;
            }
        }

        !self.handshake_complete()
    }

    fn active_mode_letter(&self) -> Option<char> {
        match self.mode {
            Mode::Marking => self.chords.marking,
            Mode::LineMarking => self.chords.line_marking,
            Mode::ColumnMarking => self.chords.column_marking,
            Mode::VirtualCaret => self.chords.virtual_caret,
            Mode::Idle => None,
        }
    }

    fn marking_key_filter(
        &mut self,
        buffer: &mut Buffer,
        event: &mut KeyEvent,
        kind: EventKind,
    ) -> KeyVerdict {
        let letter = self.active_mode_letter();
        if self.handshake_pending(event, kind, letter) {
            return KeyVerdict::Forward;
        }

        if is_selection_adjusting(event.code) {
            // Modify the keystroke to be a selection event.
            event.modifiers |= KeyModifiers::SHIFT;
            return KeyVerdict::Forward;
        }

        if is_mode_cancelling(event) {
            if kind == EventKind::KeyDown {
                self.cancel_all(buffer, false, true);
            }
            return KeyVerdict::Forward;
        }

        KeyVerdict::Forward
    }

    fn line_marking_key_filter(
        &mut self,
        buffer: &mut Buffer,
        event: &mut KeyEvent,
        kind: EventKind,
    ) -> KeyVerdict {
        if self.handshake_pending(event, kind, self.chords.line_marking) {
            return KeyVerdict::Forward;
        }

        if is_selection_adjusting(event.code) {
            event.modifiers |= KeyModifiers::SHIFT;

            // Arrow right or left is translated to down or up instead:
            // selection stays at whole-line granularity.
            if event.code == KeyCode::Right {
                event.code = KeyCode::Down;
            } else if event.code == KeyCode::Left {
                event.code = KeyCode::Up;
            }

            if kind == EventKind::KeyDown {
                let caret = buffer.caret();
                let line = buffer.line_of(caret);
                let last_line = buffer.line_count() - 1;
                let line_start = buffer.line_start(line);

                if line != last_line {
                    if caret != line_start {
                        buffer.move_caret(line_start, true);
                    }
                } else if caret != line_start && event.code == KeyCode::Up {
                    // On the last line, an up arrow first only pulls the
                    // caret back to the start of that line.
                    buffer.move_caret(line_start, true);
                    return KeyVerdict::Consume;
                }
            }
            return KeyVerdict::Forward;
        }

        if is_mode_cancelling(event) {
            if kind == EventKind::KeyDown {
                self.cancel_all(buffer, false, false);
            }
            return KeyVerdict::Forward;
        }

        KeyVerdict::Forward
    }

    fn virtual_caret_key_filter(
        &mut self,
        buffer: &mut Buffer,
        event: &mut KeyEvent,
        kind: EventKind,
    ) -> KeyVerdict {
        if self.handshake_pending(event, kind, self.chords.virtual_caret) {
            return KeyVerdict::Forward;
        }

        // Any keystroke stops the mode, but ignore the bare modifiers.
        if !keys::is_modifier_key(event.code) && kind == EventKind::KeyDown {
            self.stop_virtual_caret(buffer, true);
        }
        KeyVerdict::Forward
    }

    /// Mouse-down filter shared by the marking modes: a plain click becomes
    /// a selection-extending click, so drag-select coexists with keyboard
    /// marking. In virtual caret mode a click that resolves to a real
    /// offset ends the mode instead.
    pub fn filter_mouse_down(
        &mut self,
        buffer: &mut Buffer,
        event: &mut MouseEvent,
        cell: CellPoint,
    ) {
        if !self.registry.is_installed(self.mode, EventKind::MouseDown) {
            return;
        }
        match self.mode {
            Mode::Marking | Mode::LineMarking | Mode::ColumnMarking => {
                event.modifiers |= KeyModifiers::SHIFT;
            }
            Mode::VirtualCaret => {
                if buffer.offset_at_cell(cell).is_some() {
                    self.stop_virtual_caret(buffer, true);
                }
            }
            Mode::Idle => {}
        }
    }

    /// Mouse-up filter: line marking re-snaps the selection to whole lines
    /// after any drag; virtual caret mode ends on a click at a real offset.
    pub fn filter_mouse_up(&mut self, buffer: &mut Buffer, cell: CellPoint) {
        if !self.registry.is_installed(self.mode, EventKind::MouseUp) {
            return;
        }
        match self.mode {
            Mode::LineMarking => buffer.snap_selection_to_lines(),
            Mode::VirtualCaret => {
                if buffer.offset_at_cell(cell).is_some() {
                    self.stop_virtual_caret(buffer, true);
                }
            }
            _ => {}
        }
    }

    /// Double-click cancels every mode.
    pub fn on_double_click(&mut self, buffer: &mut Buffer) {
        if !self.registry.is_installed(self.mode, EventKind::DoubleClick) {
            return;
        }
        self.cancel_all(buffer, false, true);
    }
}

fn is_selection_adjusting(code: KeyCode) -> bool {
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

/// Keys that stop the marking modes: pretty much any printable character,
/// plus BS, DEL, and ENTER.
fn is_mode_cancelling(event: &KeyEvent) -> bool {
    keys::is_printable(event)
        || matches!(
            event.code,
            KeyCode::Backspace | KeyCode::Delete | KeyCode::Enter
        )
}

fn is_modifier_release(code: KeyCode, modifier: KeyModifiers) -> bool {
    let KeyCode::Modifier(m) = code else {
        return false;
    };
    match modifier {
        KeyModifiers::ALT => matches!(m, ModifierKeyCode::LeftAlt | ModifierKeyCode::RightAlt),
        KeyModifiers::CONTROL => matches!(
            m,
            ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl
        ),
        KeyModifiers::SHIFT => {
            matches!(m, ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift)
        }
        KeyModifiers::SUPER => {
            matches!(m, ModifierKeyCode::LeftSuper | ModifierKeyCode::RightSuper)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn controller() -> ModeController {
        let mut c = ModeController::new(ModeChords::default());
        c.set_handshake_enabled(false);
        c
    }

    fn buffer() -> Buffer {
        Buffer::from_str("alpha\nbeta\ngamma\ndelta\n")
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn release(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn exactly_one_mode_survives_any_transition() {
        let toggles: Vec<fn(&mut ModeController, &mut Buffer)> = vec![
            |c, b| c.toggle_marking(b),
            |c, b| c.toggle_line_marking(b),
            |c, b| c.toggle_column_marking(b),
        ];

        for (i, enter_a) in toggles.iter().enumerate() {
            for (j, enter_b) in toggles.iter().enumerate() {
                if i == j {
                    continue;
                }
                let mut c = controller();
                let mut b = buffer();
                enter_a(&mut c, &mut b);
                enter_b(&mut c, &mut b);
                assert_ne!(c.mode(), Mode::Idle);
                // The first mode's filters must be fully gone.
                let active = c.mode();
                for m in [Mode::Marking, Mode::LineMarking, Mode::ColumnMarking] {
                    if m != active {
                        assert!(!c.registry.is_installed(m, EventKind::KeyDown));
                    }
                }
            }
        }
    }

    #[test]
    fn toggling_twice_returns_to_idle_with_no_filters() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_marking(&mut b);
        assert_eq!(c.mode(), Mode::Marking);
        c.toggle_marking(&mut b);
        assert_eq!(c.mode(), Mode::Idle);
        assert!(c.registry.is_empty());
    }

    #[test]
    fn navigation_keys_get_shift_injected_while_marking() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_marking(&mut b);

        let mut ev = press(KeyCode::Down);
        assert_eq!(c.filter_key(&mut b, &mut ev), KeyVerdict::Forward);
        assert!(ev.modifiers.contains(KeyModifiers::SHIFT));
    }

    #[test]
    fn printable_key_cancels_all_modes_but_still_types() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_marking(&mut b);

        let mut ev = press(KeyCode::Char('x'));
        assert_eq!(c.filter_key(&mut b, &mut ev), KeyVerdict::Forward);
        assert_eq!(c.mode(), Mode::Idle);
        assert!(c.registry.is_empty());
    }

    #[test]
    fn handshake_defers_interpretation_until_entry_keys_released() {
        let mut c = ModeController::new(ModeChords::default());
        c.set_handshake_enabled(true);
        let mut b = buffer();
        c.toggle_marking(&mut b);

        // The tail of the activating Alt+M chord arrives first; navigation
        // stays untouched until both releases are seen.
        let mut nav = press(KeyCode::Down);
        c.filter_key(&mut b, &mut nav);
        assert!(!nav.modifiers.contains(KeyModifiers::SHIFT));

        let mut m_up = release(KeyCode::Char('m'));
        c.filter_key(&mut b, &mut m_up);
        let mut alt_up = release(KeyCode::Modifier(ModifierKeyCode::LeftAlt));
        c.filter_key(&mut b, &mut alt_up);

        let mut nav = press(KeyCode::Down);
        c.filter_key(&mut b, &mut nav);
        assert!(nav.modifiers.contains(KeyModifiers::SHIFT));
    }

    #[test]
    fn line_marking_selects_current_line_on_entry() {
        let mut c = controller();
        let mut b = buffer();
        b.set_caret(7); // inside "beta"
        c.toggle_line_marking(&mut b);
        assert_eq!(b.selected_text().as_deref(), Some("beta\n"));
    }

    #[test]
    fn line_marking_remaps_horizontal_arrows_to_vertical() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_line_marking(&mut b);

        let mut ev = press(KeyCode::Right);
        c.filter_key(&mut b, &mut ev);
        assert_eq!(ev.code, KeyCode::Down);
        assert!(ev.modifiers.contains(KeyModifiers::SHIFT));

        let mut ev = press(KeyCode::Left);
        c.filter_key(&mut b, &mut ev);
        assert_eq!(ev.code, KeyCode::Up);
    }

    #[test]
    fn column_marking_drives_block_selection_representation() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_column_marking(&mut b);
        assert!(b.block_mode());
        c.toggle_column_marking(&mut b);
        assert!(!b.block_mode());
    }

    #[test]
    fn virtual_caret_entry_rejected_at_real_offsets() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_virtual_caret(&mut b, CellPoint::new(0, 2));
        assert_eq!(c.mode(), Mode::Idle);

        c.toggle_virtual_caret(&mut b, CellPoint::new(0, 40));
        assert_eq!(c.mode(), Mode::VirtualCaret);
        assert_eq!(b.virtual_caret, Some(CellPoint::new(0, 40)));
        assert!(b.block_mode());
    }

    #[test]
    fn virtual_caret_ends_on_any_non_modifier_key() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_virtual_caret(&mut b, CellPoint::new(1, 30));
        assert_eq!(c.mode(), Mode::VirtualCaret);

        // A bare modifier is ignored.
        let mut ev = press(KeyCode::Modifier(ModifierKeyCode::LeftShift));
        c.filter_key(&mut b, &mut ev);
        assert_eq!(c.mode(), Mode::VirtualCaret);

        let mut ev = press(KeyCode::Char('a'));
        c.filter_key(&mut b, &mut ev);
        assert_eq!(c.mode(), Mode::Idle);
        assert_eq!(b.virtual_caret, None);
    }

    #[test]
    fn virtual_caret_ends_on_click_at_real_offset() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_virtual_caret(&mut b, CellPoint::new(1, 30));

        let mut ev = MouseEvent {
            kind: crossterm::event::MouseEventKind::Down(crossterm::event::MouseButton::Left),
            column: 1,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        // Click in virtual space keeps the mode alive.
        c.filter_mouse_down(&mut b, &mut ev, CellPoint::new(2, 30));
        assert_eq!(c.mode(), Mode::VirtualCaret);
        // Click on a real character ends it.
        c.filter_mouse_down(&mut b, &mut ev, CellPoint::new(0, 1));
        assert_eq!(c.mode(), Mode::Idle);
    }

    #[test]
    fn plain_click_becomes_selection_click_while_marking() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_marking(&mut b);

        let mut ev = MouseEvent {
            kind: crossterm::event::MouseEventKind::Down(crossterm::event::MouseButton::Left),
            column: 3,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        c.filter_mouse_down(&mut b, &mut ev, CellPoint::new(0, 3));
        assert!(ev.modifiers.contains(KeyModifiers::SHIFT));
    }

    #[test]
    fn double_click_cancels_modes() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_column_marking(&mut b);
        c.on_double_click(&mut b);
        assert_eq!(c.mode(), Mode::Idle);
        assert!(!b.block_mode());
    }

    #[test]
    fn column_to_virtual_transition_keeps_block_mode_on() {
        let mut c = controller();
        let mut b = buffer();
        c.toggle_virtual_caret(&mut b, CellPoint::new(0, 40));
        assert!(b.block_mode());
        c.toggle_column_marking(&mut b);
        assert_eq!(c.mode(), Mode::ColumnMarking);
        assert!(b.block_mode());
    }
}
