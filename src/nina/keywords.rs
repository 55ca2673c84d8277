//! Ordered keyword tables.
//!
//! A table is a list of `(label, patterns)` entries. Lookup walks the entries
//! in insertion order and returns the first label with any matching pattern,
//! so table order is the tie-break between overlapping vocabularies.

use std::fmt::Debug;

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// One labelled group of case-insensitive patterns.
#[derive(Debug, Clone)]
struct KeywordRule<L> {
    label: L,
    patterns: Vec<Regex>,
}

/// Ordered `(label, patterns)` lookup table.
#[derive(Debug, Clone)]
pub struct KeywordTable<L> {
    rules: Vec<KeywordRule<L>>,
}

impl<L> Default for KeywordTable<L> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<L: Copy + Debug> KeywordTable<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from static entries.
    pub fn from_entries(entries: &[(L, &[&str])]) -> Self {
        entries
            .iter()
            .fold(Self::new(), |table, (label, patterns)| {
                table.with(*label, patterns.iter().copied())
            })
    }

    /// Builder: append an entry. Patterns that fail to compile are skipped
    /// with a warning.
    pub fn with<P: AsRef<str>>(mut self, label: L, patterns: impl IntoIterator<Item = P>) -> Self {
        let compiled = patterns
            .into_iter()
            .filter_map(|p| {
                let source = p.as_ref();
                match RegexBuilder::new(source).case_insensitive(true).build() {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        warn!(label = ?label, pattern = source, error = %e, "Skipping invalid keyword pattern");
                        None
                    }
                }
            })
            .collect();
        self.rules.push(KeywordRule {
            label,
            patterns: compiled,
        });
        self
    }

    /// First label, in table order, with a pattern matching `text`.
    pub fn first_match(&self, text: &str) -> Option<L> {
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| p.is_match(text)))
            .map(|rule| rule.label)
    }

    /// Labels in table order.
    pub fn labels(&self) -> Vec<L> {
        self.rules.iter().map(|rule| rule.label).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Topic {
        A,
        B,
    }

    #[test]
    fn first_entry_wins_on_overlap() {
        let table = KeywordTable::from_entries(&[
            (Topic::A, &["quanto custa"]),
            (Topic::B, &["consulta"]),
        ]);
        assert_eq!(table.first_match("Quanto custa a consulta?"), Some(Topic::A));
        assert_eq!(table.first_match("minha consulta"), Some(Topic::B));
        assert_eq!(table.first_match("nada"), None);
        assert_eq!(table.labels(), vec![Topic::A, Topic::B]);
    }

    #[test]
    fn matching_ignores_case() {
        let table = KeywordTable::from_entries(&[(Topic::A, &[r"hor[aá]rio"])]);
        assert_eq!(table.first_match("HORÁRIO"), Some(Topic::A));
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let table = KeywordTable::new()
            .with(Topic::A, ["(unclosed", "ok"])
            .with(Topic::B, Vec::<String>::new());
        assert_eq!(table.first_match("(unclosed ok"), Some(Topic::A));
        assert_eq!(table.first_match("(unclosed"), None);
        assert!(!table.is_empty());
    }
}
