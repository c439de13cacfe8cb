//! Decoded process output

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::LazyLock;

/// CSI sequences (colors, cursor movement), OSC sequences (titles,
/// hyperlinks) and the remaining two-byte escapes.
static ANSI_ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]|\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)|\x1B[@-Z\\-_]")
        .expect("valid ansi escape regex")
});

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// stdout and stderr share one pipe
    #[default]
    Combined,
    Stdout,
    Stderr,
}

/// One line of process output, newline removed, escapes preserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

impl OutputLine {
    #[must_use]
    pub fn new(stream: StreamKind, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }

    /// Text with terminal escape sequences removed, for display
    #[must_use]
    pub fn display_text(&self) -> Cow<'_, str> {
        strip_ansi(&self.text)
    }
}

/// Remove ANSI escape sequences from `text`. Borrows when there is nothing to
/// strip.
#[must_use]
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1B') {
        return Cow::Borrowed(text);
    }
    ANSI_ESCAPE_RE.replace_all(text, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_colors() {
        let line = "\x1b[34m==>\x1b[0m \x1b[1mInstalling foo\x1b[0m";
        assert_eq!(strip_ansi(line), "==> Installing foo");
    }

    #[test]
    fn test_strip_osc_hyperlink() {
        let line = "see \x1b]8;;https://brew.sh\x07brew.sh\x1b]8;;\x07 now";
        assert_eq!(strip_ansi(line), "see brew.sh now");
    }

    #[test]
    fn test_plain_text_is_borrowed() {
        let out = strip_ansi("Installing foo");
        assert!(matches!(out, Cow::Borrowed("Installing foo")));
    }

    #[test]
    fn test_display_text() {
        let line = OutputLine::new(StreamKind::Stderr, "\x1b[31mError:\x1b[0m boom");
        assert_eq!(line.display_text(), "Error: boom");
        assert_eq!(line.text, "\x1b[31mError:\x1b[0m boom");
    }
}
