use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::keys::{self, Chord};

/// Limit the repeat count.
pub const MAX_COMMAND_COUNT: u32 = 1024;

const INSTRUCTIONS: &str = "<enter a command or a string>";

/// The key event processor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatState {
    Idle,
    FormCommandString,
    WaitForCommandOrStringStart,
    AccumulateString,
}

/// What the state machine decided about a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatOutcome {
    /// Event fully handled here; the prompt display may have changed.
    Consumed,
    /// Let the event through to the dialog's input field.
    PassToField,
    /// Terminal: a complete command chord was captured. The dialog shows
    /// the chord briefly and schedules its own close.
    CommandCaptured,
}

/// State machine behind the repeat dialog: parses a live keystroke stream
/// into either a repeat count plus a single command chord to replay, or a
/// repeat count plus a free-form string to insert. Exactly one of the two
/// results is non-empty when the dialog closes.
pub struct RepeatSession {
    state: RepeatState,
    count: u32,
    command_label: String,
    command_chord: Option<Chord>,
    repeat_string: String,
    /// The chord that opened the dialog; seeing it again doubles the count.
    invoke_chord: Option<Chord>,
}

impl RepeatSession {
    pub fn new(invoke_chord: Option<Chord>) -> Self {
        Self {
            state: RepeatState::Idle,
            count: 1,
            command_label: String::new(),
            command_chord: None,
            repeat_string: String::new(),
            invoke_chord,
        }
    }

    pub fn state(&self) -> RepeatState {
        self.state
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn command_label(&self) -> &str {
        &self.command_label
    }

    pub fn command_chord(&self) -> Option<Chord> {
        self.command_chord
    }

    pub fn repeat_string(&self) -> &str {
        &self.repeat_string
    }

    pub fn accumulating_string(&self) -> bool {
        self.state == RepeatState::AccumulateString
    }

    /// The fixed prompt the input field must never let the caret cross.
    pub fn prompt_prefix(&self) -> String {
        format!("Repeat [{}] times: ", self.count)
    }

    /// Full field contents for the states in which the machine owns the
    /// display. While accumulating, the field itself is authoritative.
    pub fn display_text(&self) -> String {
        let suffix = match self.state {
            RepeatState::Idle | RepeatState::WaitForCommandOrStringStart => {
                if self.state == RepeatState::Idle {
                    INSTRUCTIONS
                } else {
                    ""
                }
            }
            RepeatState::FormCommandString => "",
            RepeatState::AccumulateString => &self.repeat_string,
        };
        format!("{}{}", self.prompt_prefix(), suffix)
    }

    /// Mirror the live input field back into the result string, minus the
    /// prompt prefix.
    pub fn refresh_from_field(&mut self, field_text: &str) {
        let prefix = self.prompt_prefix();
        self.repeat_string = field_text
            .strip_prefix(prefix.as_str())
            .unwrap_or(field_text)
            .to_string();
    }

    /// Feed one key event through the state machine.
    pub fn process_key(&mut self, event: &KeyEvent) -> RepeatOutcome {
        if event.kind == KeyEventKind::Release {
            return RepeatOutcome::Consumed;
        }

        let chord = Chord::from_event(event);
        let key_is_modifier = keys::is_modifier_key(event.code);
        let is_printable = keys::is_printable(event);

        // The state machine can advance itself: a chord seen in Idle is
        // reprocessed as the command to capture.
        loop {
            match self.state {
                RepeatState::Idle => {
                    // A modified key sequence: either the dialog's own
                    // binding (doubles the count) or a command to repeat.
                    if !chord.mods.is_empty() && !key_is_modifier {
                        if self
                            .invoke_chord
                            .is_some_and(|invoke| chord.normalized() == invoke.normalized())
                        {
                            self.count = (self.count * 2).min(MAX_COMMAND_COUNT);
                            return RepeatOutcome::Consumed;
                        }
                        self.state = RepeatState::FormCommandString;
                        continue;
                    }

                    if key_is_modifier
                        || matches!(event.code, KeyCode::NumLock | KeyCode::CapsLock)
                    {
                        return RepeatOutcome::PassToField;
                    }

                    if event.code == KeyCode::Right {
                        // The current repeat count has been accepted.
                        self.state = RepeatState::WaitForCommandOrStringStart;
                        return RepeatOutcome::Consumed;
                    }

                    if let KeyCode::Char(c) = event.code
                        && let Some(digit) = c.to_digit(10)
                    {
                        self.count = if self.count == 1 {
                            digit
                        } else {
                            self.count * 10 + digit
                        };
                        self.count = self.count.min(MAX_COMMAND_COUNT).max(1);
                        return RepeatOutcome::Consumed;
                    }

                    if !is_printable {
                        self.state = RepeatState::FormCommandString;
                        continue;
                    }

                    self.state = RepeatState::AccumulateString;
                    continue;
                }

                RepeatState::FormCommandString => {
                    if matches!(event.code, KeyCode::NumLock | KeyCode::CapsLock) {
                        return RepeatOutcome::PassToField;
                    }
                    // A bare modifier is the head of a chord still being
                    // pressed; keep waiting for the non-modifier key.
                    if key_is_modifier {
                        return RepeatOutcome::Consumed;
                    }

                    self.command_label = chord.label();
                    self.command_chord = Some(chord);

                    // A modifier plus key is assumed to be a complete
                    // command.
                    self.state = RepeatState::Idle;
                    return RepeatOutcome::CommandCaptured;
                }

                RepeatState::WaitForCommandOrStringStart => {
                    if matches!(event.code, KeyCode::NumLock | KeyCode::CapsLock) {
                        return RepeatOutcome::PassToField;
                    }

                    if !chord.mods.is_empty() {
                        self.state = RepeatState::FormCommandString;
                        continue;
                    }

                    if !key_is_modifier {
                        self.state = RepeatState::AccumulateString;
                        continue;
                    }

                    return RepeatOutcome::Consumed;
                }

                RepeatState::AccumulateString => {
                    return RepeatOutcome::PassToField;
                }
            }
        }
    }
}

/// Expand the user-level escapes allowed in a repeated string.
pub fn expand_escapes(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn digit(session: &mut RepeatSession, c: char) {
        session.process_key(&press(KeyCode::Char(c), KeyModifiers::NONE));
    }

    #[test]
    fn digits_accumulate_decimally_and_clamp_at_1024() {
        let mut session = RepeatSession::new(None);
        digit(&mut session, '9');
        assert_eq!(session.count(), 9);
        digit(&mut session, '9');
        assert_eq!(session.count(), 99);
        digit(&mut session, '9');
        assert_eq!(session.count(), 999);
        digit(&mut session, '9');
        assert_eq!(session.count(), 1024);
        assert_eq!(session.state(), RepeatState::Idle);
    }

    #[test]
    fn invoke_chord_doubles_the_count() {
        let invoke = Chord::new(KeyModifiers::CONTROL, KeyCode::Char('r'));
        let mut session = RepeatSession::new(Some(invoke));
        digit(&mut session, '3');

        let outcome = session.process_key(&press(KeyCode::Char('r'), KeyModifiers::CONTROL));
        assert_eq!(outcome, RepeatOutcome::Consumed);
        assert_eq!(session.count(), 6);

        for _ in 0..20 {
            session.process_key(&press(KeyCode::Char('r'), KeyModifiers::CONTROL));
        }
        assert_eq!(session.count(), 1024);
    }

    #[test]
    fn modifier_chord_is_captured_as_a_command() {
        let mut session = RepeatSession::new(None);
        let outcome = session.process_key(&press(KeyCode::Char('k'), KeyModifiers::CONTROL));
        assert_eq!(outcome, RepeatOutcome::CommandCaptured);
        assert_eq!(session.command_label(), "CTRL+K");
        assert_eq!(
            session.command_chord(),
            Some(Chord::new(KeyModifiers::CONTROL, KeyCode::Char('k')))
        );
        assert!(session.repeat_string().is_empty());
    }

    #[test]
    fn non_printable_key_is_captured_as_a_command() {
        let mut session = RepeatSession::new(None);
        let outcome = session.process_key(&press(KeyCode::F(5), KeyModifiers::NONE));
        assert_eq!(outcome, RepeatOutcome::CommandCaptured);
        assert_eq!(session.command_label(), "F5");
    }

    #[test]
    fn printable_character_starts_string_accumulation() {
        let mut session = RepeatSession::new(None);
        let outcome = session.process_key(&press(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(outcome, RepeatOutcome::PassToField);
        assert_eq!(session.state(), RepeatState::AccumulateString);

        // The field mirrors back; the prompt prefix is excluded.
        let field = format!("{}abc", session.prompt_prefix());
        session.refresh_from_field(&field);
        assert_eq!(session.repeat_string(), "abc");
        assert!(session.command_label().is_empty());
    }

    #[test]
    fn right_arrow_confirms_count_then_any_key_starts_string() {
        let mut session = RepeatSession::new(None);
        digit(&mut session, '5');
        let outcome = session.process_key(&press(KeyCode::Right, KeyModifiers::NONE));
        assert_eq!(outcome, RepeatOutcome::Consumed);
        assert_eq!(session.state(), RepeatState::WaitForCommandOrStringStart);

        // Even a digit now seeds the string instead of the count.
        let outcome = session.process_key(&press(KeyCode::Char('7'), KeyModifiers::NONE));
        assert_eq!(outcome, RepeatOutcome::PassToField);
        assert_eq!(session.state(), RepeatState::AccumulateString);
        assert_eq!(session.count(), 5);
    }

    #[test]
    fn wait_state_promotes_modifier_chords_to_command_capture() {
        let mut session = RepeatSession::new(None);
        session.process_key(&press(KeyCode::Right, KeyModifiers::NONE));
        let outcome = session.process_key(&press(KeyCode::Char('s'), KeyModifiers::ALT));
        assert_eq!(outcome, RepeatOutcome::CommandCaptured);
        assert_eq!(session.command_label(), "ALT+S");
    }

    #[test]
    fn escape_expansion_applies_to_repeated_strings() {
        assert_eq!(expand_escapes("a\\nb\\tc"), "a\nb\tc");
        assert_eq!(expand_escapes("plain"), "plain");
    }
}
