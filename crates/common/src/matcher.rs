//! Text matchers used by classification rules

use regex::{Regex, RegexBuilder};
use std::fmt;

use crate::error::{Error, Result};

/// Decides whether a rule's text pattern applies to a piece of bot output
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Whether the text matches
    fn is_match(&self, text: &str) -> bool;

    /// Short description for listings and logs
    fn describe(&self) -> String;
}

/// Case-insensitive regular expression
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    source: String,
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Matcher for PatternMatcher {
    fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    fn describe(&self) -> String {
        format!("/{}/i", self.source)
    }
}

/// Whole-message phrase, compared case-insensitively.
///
/// Surrounding whitespace and trailing punctuation (`.:?!`) on the message are
/// ignored, so `"Nombre del cultivo."` matches the phrase `"nombre del cultivo"`.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrase: String,
    normalized: String,
}

impl PhraseMatcher {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            normalized: normalize_phrase(phrase),
        }
    }
}

fn normalize_phrase(text: &str) -> String {
    text.trim()
        .trim_start_matches('¿')
        .trim_end_matches(|c: char| matches!(c, '.' | ':' | '?' | '!') || c.is_whitespace())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Matcher for PhraseMatcher {
    fn is_match(&self, text: &str) -> bool {
        normalize_phrase(text) == self.normalized
    }

    fn describe(&self) -> String {
        format!("phrase {:?}", self.phrase)
    }
}
