use ahash::AHashMap;
use regex::Regex;

use crate::error::{Result, TopicError};

/// words of two or more characters, unicode aware
const TERM_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Splits raw text into lowercase terms for the TF-IDF branch
#[derive(Debug, Clone)]
pub struct TermAnalyzer {
    pattern: Regex,
}

impl TermAnalyzer {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(TERM_PATTERN)
            .map_err(|err| TopicError::InvalidConfig(format!("term pattern: {err}")))?;
        Ok(Self { pattern })
    }

    /// Terms of a document in order of appearance
    pub fn terms<'a>(&'a self, lowered: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pattern.find_iter(lowered).map(|m| m.as_str())
    }

    /// Count every term of a document
    pub fn term_counts(&self, text: &str) -> AHashMap<String, u64> {
        let lowered = text.to_lowercase();
        let mut counts: AHashMap<String, u64> = AHashMap::new();
        for term in self.terms(&lowered) {
            *counts.entry(term.to_owned()).or_insert(0) += 1;
        }
        counts
    }
}
