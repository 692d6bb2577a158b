//! Prefix-then-substring matching shared by the locality and index adapters.

use std::{hash::Hash, ops::Range};

use itertools::Itertools;
use regex::{Regex, RegexBuilder};

use crate::{Result, SourceError};

/// Case-insensitive matcher for one query string.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    prefix: Regex,
    anywhere: Regex,
}

impl QueryMatcher {
    pub fn new(query: &str) -> Result<Self> {
        let escaped = regex::escape(query);
        let build = |pattern: String| {
            RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| SourceError::Malformed {
                    source_name: "query".into(),
                    reason: e.to_string(),
                })
        };
        Ok(Self {
            prefix: build(format!("^{escaped}"))?,
            anywhere: build(escaped)?,
        })
    }

    pub fn is_prefix_of(&self, text: &str) -> bool {
        self.prefix.is_match(text)
    }

    pub fn occurs_in(&self, text: &str) -> bool {
        self.anywhere.is_match(text)
    }

    /// Byte ranges of every occurrence of the query in `text`.
    pub fn ranges(&self, text: &str) -> Vec<Range<usize>> {
        self.anywhere.find_iter(text).map(|m| m.range()).collect()
    }
}

/// Two-pass selection.
///
/// Pass one keeps items where any searchable text starts with the query. When that
/// yields fewer than `limit` items, pass two appends items where the query occurs
/// anywhere. Duplicates by `key` are removed afterwards, keeping the first occurrence,
/// so prefix matches win over their own substring re-match.
pub fn prefix_then_substring<'a, T, K, F, G>(
    items: &'a [T],
    matcher: &QueryMatcher,
    limit: usize,
    texts: F,
    key: G,
) -> Vec<&'a T>
where
    K: Eq + Hash,
    F: Fn(&T) -> Vec<String>,
    G: Fn(&T) -> K,
{
    let mut matches: Vec<&T> = items
        .iter()
        .filter(|item| texts(item).iter().any(|t| matcher.is_prefix_of(t)))
        .collect();

    if matches.len() < limit {
        matches.extend(
            items
                .iter()
                .filter(|item| texts(item).iter().any(|t| matcher.occurs_in(t))),
        );
    }

    matches.into_iter().unique_by(|item| key(item)).collect()
}

/// Byte ranges in `text` that match `query`, case-insensitively.
///
/// Renderers use this to mark the typed text inside a suggestion.
pub fn highlight_ranges(text: &str, query: &str) -> Vec<Range<usize>> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    QueryMatcher::new(query)
        .map(|matcher| matcher.ranges(text))
        .unwrap_or_default()
}
