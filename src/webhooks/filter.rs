//! Kind-based request filtering.
//!
//! Requests whose resource kind appears in the filter are never handed to a
//! handler; they are admitted with the default allow response.

use std::collections::BTreeSet;

/// Set of resource kinds excluded from admission processing.
///
/// Built once at server construction and shared read-only between request
/// tasks. Matching is exact and case-sensitive (`Pod` does not match `pod`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KindFilter {
    kinds: BTreeSet<String>,
}

impl KindFilter {
    /// Build a filter from human-supplied kind names.
    ///
    /// Surrounding whitespace is trimmed and empty entries are dropped.
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = kinds
            .into_iter()
            .map(|kind| kind.as_ref().trim().to_string())
            .filter(|kind| !kind.is_empty())
            .collect();
        Self { kinds }
    }

    /// Whether requests for `kind` skip processing.
    pub fn is_excluded(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    /// Excluded kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
