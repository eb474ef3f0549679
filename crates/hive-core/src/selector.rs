//! Glob selection over named rows.
//!
//! A row is a primary name plus any extra searchable attributes (for an
//! instance: its system name and tags). A pattern selects a row when it matches
//! any of the row's attributes, the name included. Hits come out grouped by
//! pattern, in lexical name order within each group, and each name at most once.
//!
//! Every pattern is checked against every attribute of every row. That is fine
//! for fleets in the low thousands; larger inventories would want an index.

use std::collections::HashSet;

use glob::{MatchOptions, Pattern};

use crate::error::{HiveError, Result};

/// Pattern used when the caller supplies none.
pub const MATCH_ALL: &str = "*";

/// Path-style matching: wildcards do not cross `/`.
const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A selectable row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a> {
    name: &'a str,
    extra: Vec<&'a str>,
}

impl<'a> Row<'a> {
    pub fn new(name: &'a str) -> Self {
        Row {
            name,
            extra: Vec::new(),
        }
    }

    /// Add a searchable attribute.
    pub fn with(mut self, attribute: &'a str) -> Self {
        self.extra.push(attribute);
        self
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    fn attributes(&self) -> impl Iterator<Item = &'a str> + '_ {
        std::iter::once(self.name).chain(self.extra.iter().copied())
    }
}

/// Resolve `patterns` against `rows`.
///
/// Patterns use `glob` syntax: `*`, `?`, `[abc]`, ranges like `[0-9]`, and
/// `[!abc]` for a negated class (`[^abc]` is not negation). There is no
/// backslash escaping; wrap a metacharacter in brackets (`[*]`) to match it
/// literally.
///
/// An empty pattern list selects everything. A malformed pattern, or one that
/// selects no row, is an error naming the pattern.
pub fn match_patterns<S: AsRef<str>>(patterns: &[S], mut rows: Vec<Row<'_>>) -> Result<Vec<String>> {
    let patterns: Vec<&str> = if patterns.is_empty() {
        vec![MATCH_ALL]
    } else {
        patterns.iter().map(AsRef::as_ref).collect()
    };

    rows.sort_by(|a, b| a.name.cmp(b.name));

    let mut added = HashSet::with_capacity(rows.len());
    let mut hits = Vec::with_capacity(rows.len());
    for raw in patterns {
        let pattern = Pattern::new(raw).map_err(|source| HiveError::InvalidPattern {
            pattern: raw.to_string(),
            source,
        })?;
        let mut used = false;
        for row in &rows {
            if !row.attributes().any(|item| pattern.matches_with(item, OPTIONS)) {
                continue;
            }
            used = true;
            if added.insert(row.name) {
                hits.push(row.name.to_string());
            }
        }
        if !used {
            return Err(HiveError::NoMatch {
                pattern: raw.to_string(),
            });
        }
    }
    Ok(hits)
}
