//! The chat surface the driver talks to

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::HarnessResult;

/// One chat session.
///
/// Incoming fragments are numbered from the start of the session and the
/// count never decreases, even across [`Transport::reset_conversation`].
#[async_trait]
pub trait Transport: Send {
    /// Type and submit a message
    async fn send_text(&mut self, text: &str) -> HarnessResult<()>;

    /// Number of incoming fragments received so far
    async fn fragment_count(&mut self) -> HarnessResult<usize>;

    /// Sanitized text of every fragment with index >= `baseline`, in
    /// arrival order. Fragments that sanitize to nothing are dropped.
    async fn fragments_since(&mut self, baseline: usize) -> HarnessResult<Vec<String>>;

    /// Clear the visible conversation. Callers treat failures as non-fatal.
    async fn reset_conversation(&mut self) -> HarnessResult<()>;
}

static PICTOGRAPHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{FE0E}\x{FE0F}\x{200D}]").expect("pictograph regex")
});

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}[ \t\x{A0}\x{202F}]*(?:a\.[ \t\x{A0}]?m\.?|p\.[ \t\x{A0}]?m\.?|am\b|pm\b)")
        .expect("timestamp regex")
});

static HORIZONTAL_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\S\n]+").expect("space regex"));

static LINE_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\n\s*").expect("line break regex"));

static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([.,;:!?])").expect("punctuation regex"));

/// Clean the raw text of one chat bubble.
///
/// Removes emoji and `hh:mm am/pm` stamps (`3:05 p. m.`, `10:41 PM`),
/// collapses runs of spaces and blank lines, drops spaces before
/// punctuation and trims. Line breaks inside a bubble are kept as single
/// newlines so numbered option lists stay one item per line.
pub fn sanitize_message(raw: &str) -> String {
    let text = PICTOGRAPHS.replace_all(raw, "");
    let text = TIMESTAMP.replace_all(&text, "");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = LINE_BREAKS.replace_all(&text, "\n");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    text.trim().to_string()
}

/// Sanitize a batch of bubbles, dropping the empty ones
pub fn sanitize_all<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| sanitize_message(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Nombre del cultivo. 10:41 PM", "Nombre del cultivo." ; "english pm")]
    #[test_case("Nombre del cultivo.3:05 p. m.", "Nombre del cultivo." ; "spanish pm")]
    #[test_case("Hola 👋🏻 ¿qué tal?", "Hola ¿qué tal?" ; "emoji")]
    #[test_case("  Cultivo   creado  exitosamente !  ", "Cultivo creado exitosamente!" ; "spacing")]
    #[test_case("Elige una:\n\n  1) trigo \n2) cebada", "Elige una:\n1) trigo\n2) cebada" ; "lines kept")]
    #[test_case("Reunión a las 14:30", "Reunión a las 14:30" ; "bare time kept")]
    fn test_sanitize_message(raw: &str, expected: &str) {
        assert_eq!(sanitize_message(raw), expected);
    }

    #[test]
    fn test_sanitize_all_drops_empty() {
        let out = sanitize_all(["✅", "Hecho 9:15 am", "   "]);
        assert_eq!(out, vec!["Hecho".to_string()]);
    }
}
