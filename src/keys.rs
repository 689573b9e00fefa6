use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A modifier-mask + key-code pair representing one keyboard command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub mods: KeyModifiers,
    pub code: KeyCode,
}

impl Chord {
    pub fn new(mods: KeyModifiers, code: KeyCode) -> Self {
        Self { mods, code }
    }

    /// The raw chord a key event represents. Keymap lookups should go
    /// through [`Chord::normalized`] as well.
    pub fn from_event(event: &KeyEvent) -> Self {
        let mods = event.modifiers
            & (KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SHIFT | KeyModifiers::SUPER);
        Self { mods, code: event.code }
    }

    /// Fold SHIFT into the character itself for printable keys, so `Alt+M`
    /// and `Alt+Shift+m` land on the same keymap entry.
    pub fn normalized(mut self) -> Self {
        if let KeyCode::Char(c) = self.code {
            self.code = KeyCode::Char(c.to_ascii_lowercase());
            self.mods -= KeyModifiers::SHIFT;
        }
        self
    }

    /// Parse a configuration chord such as `"alt+m"`, `"ctrl+pageup"` or
    /// `"f5"`. Returns `None` on anything unrecognized.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut mods = KeyModifiers::NONE;
        let mut code = None;
        for part in spec.split('+').filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => mods |= KeyModifiers::CONTROL,
                "alt" => mods |= KeyModifiers::ALT,
                "shift" => mods |= KeyModifiers::SHIFT,
                "super" | "cmd" => mods |= KeyModifiers::SUPER,
                name => code = Some(parse_key_name(name)?),
            }
        }
        // "alt+=" splits into ["alt", "="], but "alt++" leaves the key
        // itself on the separator.
        if code.is_none() && spec.ends_with('+') {
            code = Some(KeyCode::Char('+'));
        }
        Some(Self::new(mods, code?).normalized())
    }

    /// Human-readable label, e.g. `CTRL+ALT+K`.
    pub fn label(&self) -> String {
        let mut out = String::new();
        if self.mods.contains(KeyModifiers::CONTROL) {
            out.push_str("CTRL+");
        }
        if self.mods.contains(KeyModifiers::ALT) {
            out.push_str("ALT+");
        }
        if self.mods.contains(KeyModifiers::SHIFT) {
            out.push_str("SHIFT+");
        }
        out.push_str(&key_name(self.code));
        out
    }
}

fn parse_key_name(name: &str) -> Option<KeyCode> {
    let code = match name {
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "insert" => KeyCode::Insert,
        "delete" => KeyCode::Delete,
        "backspace" => KeyCode::Backspace,
        "enter" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "esc" | "escape" => KeyCode::Esc,
        "space" => KeyCode::Char(' '),
        _ => {
            if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                KeyCode::F(n)
            } else {
                let mut chars = name.chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                KeyCode::Char(c)
            }
        }
    };
    Some(code)
}

/// Formal key name, uppercased, for command-capture display.
pub fn key_name(code: KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "SPACE".to_string(),
        KeyCode::Char(c) => c.to_uppercase().to_string(),
        KeyCode::F(n) => format!("F{n}"),
        KeyCode::Up => "UP".to_string(),
        KeyCode::Down => "DOWN".to_string(),
        KeyCode::Left => "LEFT".to_string(),
        KeyCode::Right => "RIGHT".to_string(),
        KeyCode::Home => "HOME".to_string(),
        KeyCode::End => "END".to_string(),
        KeyCode::PageUp => "PAGEUP".to_string(),
        KeyCode::PageDown => "PAGEDOWN".to_string(),
        KeyCode::Insert => "INSERT".to_string(),
        KeyCode::Delete => "DEL".to_string(),
        KeyCode::Backspace => "BS".to_string(),
        KeyCode::Enter => "CR".to_string(),
        KeyCode::Tab => "TAB".to_string(),
        KeyCode::Esc => "ESC".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

/// Whether the key itself is a modifier (Shift, Ctrl, Alt, ...).
pub fn is_modifier_key(code: KeyCode) -> bool {
    matches!(code, KeyCode::Modifier(_))
}

/// Whether a key event would produce a visible character: an unmodified
/// (shift aside) character key.
pub fn is_printable(event: &KeyEvent) -> bool {
    if event
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
    {
        return false;
    }
    matches!(event.code, KeyCode::Char(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modified_chords() {
        assert_eq!(
            Chord::parse("alt+m"),
            Some(Chord::new(KeyModifiers::ALT, KeyCode::Char('m')))
        );
        assert_eq!(
            Chord::parse("ctrl+pageup"),
            Some(Chord::new(KeyModifiers::CONTROL, KeyCode::PageUp))
        );
        assert_eq!(Chord::parse("f5"), Some(Chord::new(KeyModifiers::NONE, KeyCode::F(5))));
        assert_eq!(
            Chord::parse("alt+="),
            Some(Chord::new(KeyModifiers::ALT, KeyCode::Char('=')))
        );
        assert_eq!(Chord::parse("alt+bogus"), None);
    }

    #[test]
    fn event_normalization_folds_shift_into_chars() {
        let upper = KeyEvent::new(
            KeyCode::Char('M'),
            KeyModifiers::ALT | KeyModifiers::SHIFT,
        );
        assert_eq!(
            Chord::from_event(&upper).normalized(),
            Chord::new(KeyModifiers::ALT, KeyCode::Char('m'))
        );
    }

    #[test]
    fn labels_order_modifiers() {
        let chord = Chord::new(
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
            KeyCode::Char('k'),
        );
        assert_eq!(chord.label(), "CTRL+SHIFT+K");
    }

    #[test]
    fn printable_excludes_control_chords() {
        assert!(is_printable(&KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE)));
        assert!(is_printable(&KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)));
        assert!(!is_printable(&KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL)));
        assert!(!is_printable(&KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
    }
}
