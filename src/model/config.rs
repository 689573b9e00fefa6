use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::command::CommandId;
use crate::keys::Chord;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub editor: EditorConfig,
    pub search: SearchConfig,
    /// Raw chord -> command-name table; resolved once into a [`Keymap`].
    pub bindings: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct EditorConfig {
    pub scroll_off: u16,
    pub tab_width: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub wrap: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub regex: bool,
}

impl AppConfig {
    /// The compiled-in defaults, untouched by any user file.
    pub fn defaults() -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        Ok(toml::from_str(defaults)?)
    }

    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let mut config = Self::defaults()?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "brief") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                let user_str = fs::read_to_string(&config_path)?;
                config = toml::from_str(&user_str)?;
            }
        }

        Ok(config)
    }

    /// Resolve the binding table. Unparseable chords and unknown command
    /// names are logged and skipped rather than failing startup.
    pub fn keymap(&self) -> Keymap {
        let mut map = HashMap::new();
        for (spec, name) in &self.bindings {
            let Some(chord) = Chord::parse(spec) else {
                tracing::warn!("ignoring unparseable binding chord {spec:?}");
                continue;
            };
            let Some(cmd) = CommandId::from_id(name) else {
                tracing::warn!("ignoring binding to unknown command {name:?}");
                continue;
            };
            map.insert(chord, cmd);
        }
        Keymap { map }
    }
}

/// Resolved chord -> command map.
pub struct Keymap {
    map: HashMap<Chord, CommandId>,
}

impl Keymap {
    pub fn lookup(&self, chord: Chord) -> Option<CommandId> {
        self.map.get(&chord.normalized()).copied()
    }

    pub fn chord_for(&self, cmd: CommandId) -> Option<Chord> {
        self.map
            .iter()
            .find(|(_, c)| **c == cmd)
            .map(|(chord, _)| *chord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};

    fn defaults() -> AppConfig {
        toml::from_str(include_str!("../../config/default.toml")).expect("valid defaults")
    }

    #[test]
    fn default_config_parses() {
        let config = defaults();
        assert_eq!(config.editor.scroll_off, 5);
        assert!(config.search.wrap);
    }

    #[test]
    fn keymap_resolves_default_bindings() {
        let keymap = defaults().keymap();
        assert_eq!(
            keymap.lookup(Chord::new(KeyModifiers::ALT, KeyCode::Char('m'))),
            Some(CommandId::MarkingModeToggle)
        );
        assert_eq!(
            keymap.lookup(Chord::new(KeyModifiers::CONTROL, KeyCode::Char('r'))),
            Some(CommandId::Repeat)
        );
        assert_eq!(
            keymap.lookup(Chord::new(KeyModifiers::ALT, KeyCode::Char('3'))),
            Some(CommandId::DropBookmark(3))
        );
        assert_eq!(
            keymap.chord_for(CommandId::LineMarkingModeToggle),
            Some(Chord::new(KeyModifiers::ALT, KeyCode::Char('l')))
        );
    }
}
