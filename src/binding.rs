//! BindingMap
//!
//! A name-keyed, insertion-ordered store of raw occurrences for a single
//! command scope (§3, §4.2). Built on `IndexMap` — already a teacher
//! dependency — specifically because the "BindingMap ordering preserves
//! command-line occurrence order" invariant requires an ordered multimap,
//! not a `HashMap`.

use indexmap::IndexMap;

/// A single appearance of a flag or arg in the argument vector: the raw
/// tokens bound to it, and whether it arrived via an implicit
/// environment/file fallback rather than literally on the command line
/// (§4.2 "Environment/file fallback", `seenImplied`).
#[derive(Debug, Clone, Default)]
pub struct Occurrence {
    pub raw: Vec<String>,
    pub implicit: bool,
}

impl Occurrence {
    pub fn explicit(raw: Vec<String>) -> Self {
        Occurrence { raw, implicit: false }
    }

    pub fn implicit(raw: Vec<String>) -> Self {
        Occurrence { raw, implicit: true }
    }
}

/// The ordered store of occurrences for one command scope.
#[derive(Debug, Clone, Default)]
pub struct BindingMap {
    entries: IndexMap<String, Vec<Occurrence>>,
}

impl BindingMap {
    pub fn new() -> Self {
        BindingMap::default()
    }

    /// Record a fresh occurrence under `name`, preserving arrival order.
    pub fn push(&mut self, name: &str, occurrence: Occurrence) {
        self.entries.entry(name.to_string()).or_default().push(occurrence);
    }

    pub fn occurrences(&self, name: &str) -> &[Occurrence] {
        self.entries.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn occurrence_count(&self, name: &str) -> usize {
        self.occurrences(name).len()
    }

    pub fn is_seen(&self, name: &str) -> bool {
        self.occurrences(name).iter().any(|o| !o.implicit)
    }

    pub fn is_implicitly_set(&self, name: &str) -> bool {
        let occs = self.occurrences(name);
        !occs.is_empty() && occs.iter().all(|o| o.implicit)
    }

    /// All raw tokens across every occurrence, flattened in arrival order —
    /// `RawOccurrences` from §4.4 excludes the flag name itself, which the
    /// caller is responsible for not having included in `raw`.
    pub fn raw_flat(&self, name: &str) -> Vec<String> {
        self.occurrences(name).iter().flat_map(|o| o.raw.iter().cloned()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_occurrence_order() {
        let mut b = BindingMap::new();
        b.push("f", Occurrence::explicit(vec!["1".to_string()]));
        b.push("f", Occurrence::explicit(vec!["2".to_string()]));
        b.push("f", Occurrence::explicit(vec!["3".to_string()]));
        assert_eq!(b.occurrence_count("f"), 3);
        assert_eq!(b.raw_flat("f"), vec!["1", "2", "3"]);
    }

    #[test]
    fn implicit_only_is_implicitly_set_not_seen() {
        let mut b = BindingMap::new();
        b.push("host", Occurrence::implicit(vec!["h1".to_string()]));
        assert!(!b.is_seen("host"));
        assert!(b.is_implicitly_set("host"));
    }

    #[test]
    fn explicit_after_implicit_marks_seen() {
        let mut b = BindingMap::new();
        b.push("host", Occurrence::implicit(vec!["h1".to_string()]));
        b.push("host", Occurrence::explicit(vec!["h2".to_string()]));
        assert!(b.is_seen("host"));
        assert!(!b.is_implicitly_set("host"));
    }
}
