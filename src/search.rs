use regex::Regex;

use crate::error::{CommandError, CommandResult};
use crate::model::buffer::Buffer;
use crate::model::config::SearchConfig;

/// Find/replace support: case, whole-word and regex flags come from
/// configuration; direction comes from the command, not the dialog. When
/// wrap-around is enabled a failed pass retries exactly once from the far
/// end before reporting failure.
pub struct SearchSupport {
    config: SearchConfig,
    find_string: Option<String>,
    replace_string: Option<String>,
    find_history: Vec<String>,
}

impl SearchSupport {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            find_string: None,
            replace_string: None,
            find_history: Vec::new(),
        }
    }

    pub fn find_string(&self) -> Option<&str> {
        self.find_string.as_deref()
    }

    pub fn replace_string(&self) -> Option<&str> {
        self.replace_string.as_deref()
    }

    pub fn find_history(&self) -> &[String] {
        &self.find_history
    }

    pub fn set_find_string(&mut self, pattern: &str) {
        self.find_history.retain(|p| p != pattern);
        self.find_history.insert(0, pattern.to_string());
        self.find_string = Some(pattern.to_string());
    }

    pub fn set_replace_string(&mut self, replacement: &str) {
        self.replace_string = Some(replacement.to_string());
    }

    fn compiled_pattern(&self, pattern: &str) -> CommandResult<Regex> {
        let mut source = if self.config.regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        if self.config.whole_word {
            source = format!(r"\b(?:{source})\b");
        }
        if !self.config.case_sensitive {
            source = format!("(?i){source}");
        }
        Regex::new(&source)
            .map_err(|err| CommandError::InvalidArgument(format!("bad search pattern: {err}")))
    }

    /// Find the stored pattern in the given direction from the caret.
    /// Returns the match as a (start, end) char range; the caller selects
    /// it and moves the caret.
    pub fn find(&self, buffer: &Buffer, forward: bool) -> CommandResult<(usize, usize)> {
        let pattern = self
            .find_string
            .as_deref()
            .ok_or_else(|| CommandError::InvalidArgument("no search string".to_string()))?;
        let regex = self.compiled_pattern(pattern)?;

        let text = buffer.rope.to_string();
        let caret_byte = byte_at(&text, buffer.caret());

        let matched = if forward {
            regex
                .find_iter(&text)
                .find(|m| m.start() >= caret_byte)
                // One wrap retry from the top.
                .or_else(|| self.config.wrap.then(|| regex.find(&text)).flatten())
        } else {
            let mut before = None;
            let mut last = None;
            for m in regex.find_iter(&text) {
                if m.end() <= caret_byte {
                    before = Some(m);
                }
                last = Some(m);
            }
            // One wrap retry from the bottom.
            before.or_else(|| self.config.wrap.then_some(last).flatten())
        };

        let m = matched.ok_or_else(|| CommandError::SearchNotFound(pattern.to_string()))?;
        Ok((char_at(&text, m.start()), char_at(&text, m.end())))
    }

    /// Find in the given direction, then substitute the stored replacement
    /// into the match. Regex mode honors capture-group references in the
    /// replacement. Returns the char range now holding the replacement.
    pub fn replace(&self, buffer: &mut Buffer, forward: bool) -> CommandResult<(usize, usize)> {
        let replacement = self
            .replace_string
            .as_deref()
            .ok_or_else(|| CommandError::InvalidArgument("no replace string".to_string()))?;
        let (start, end) = self.find(buffer, forward)?;

        let replaced = if self.config.regex {
            let pattern = self.find_string.as_deref().unwrap_or_default();
            let regex = self.compiled_pattern(pattern)?;
            let matched: String = buffer.rope.slice(start..end).to_string();
            regex.replace(&matched, replacement).into_owned()
        } else {
            replacement.to_string()
        };

        buffer.set_selection(start, end);
        buffer.insert(&replaced);
        Ok((start, start + replaced.chars().count()))
    }
}

fn byte_at(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

fn char_at(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx].chars().count()
}
