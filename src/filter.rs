// src/filter.rs
// =============================================================================
// Decides whether a post's text actually matches a query.
//
// The platform's own search is fuzzy (stemming, relevance ranking), so every
// item it returns is checked again here:
// - Exact:   the phrase must appear as standalone words, case-insensitive.
//            "AI" matches "AI research lab" but "rain" does not match
//            "brainwave".
// - Partial: plain case-insensitive substring, so "rain" matches "brainwave".
//
// Empty text never matches anything.
//
// Rust concepts:
// - regex::escape: turns user input into a literal pattern
// - Compiling once in new() and reusing the Regex for every post
// =============================================================================

use crate::error::MatchError;
use crate::model::{MatchMode, Query};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct MatchFilter {
    mode: MatchMode,
    needle: String,
    // Only built for Exact mode
    phrase: Option<Regex>,
}

impl MatchFilter {
    pub fn new(query: &Query) -> Result<Self, MatchError> {
        let words: Vec<&str> = query.text.split_whitespace().collect();
        if words.is_empty() {
            return Err(MatchError::EmptyQuery);
        }

        let phrase = match query.mode {
            MatchMode::Exact => {
                // Any run of whitespace between words is fine; the edges must
                // be the start/end of the text or a non-word character.
                let body = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join(r"\s+");
                Some(Regex::new(&format!(r"(?i)(?:^|[^\w]){}(?:[^\w]|$)", body))?)
            }
            MatchMode::Partial => None,
        };

        Ok(Self {
            mode: query.mode,
            needle: query.text.trim().to_lowercase(),
            phrase,
        })
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        match &self.phrase {
            Some(phrase) => phrase.is_match(text),
            None => text.to_lowercase().contains(&self.needle),
        }
    }
}

/// One-off check; compiles the query every call, so prefer MatchFilter in loops
pub fn matches(text: Option<&str>, query: &Query) -> bool {
    match (text, MatchFilter::new(query)) {
        (Some(text), Ok(filter)) => filter.matches(text),
        _ => false,
    }
}
