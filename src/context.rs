//! Context Graph
//!
//! A parent-linked lookup chain exposing values, raw bindings, and timing to
//! actions (§4.4). Contexts are cheap to clone (an `Arc` around the actual
//! state) and are created transiently per traversal frame; they are not
//! expected to outlive the enclosing action (§3 "Context" lifecycle).

use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::binding::BindingMap;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::lifecycle::{check_timing, ActionOf};
use crate::value::{Value, ValueCell};

/// The four lifecycle phases, totally ordered (§3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timing {
    Initial,
    Before,
    Action,
    After,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry in a `ContextPath` (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Command(String),
    Flag(String),
    Arg(String),
    Expr(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Command(n) => write!(f, "{n}"),
            PathSegment::Flag(n) => write!(f, "-{n}"),
            PathSegment::Arg(n) => write!(f, "<{n}>"),
            PathSegment::Expr(n) => write!(f, "<-{n}>"),
        }
    }
}

/// The textual breadcrumb of a Context: `app sub -flag <arg>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPath(pub Vec<PathSegment>);

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", rendered.join(" "))
    }
}

impl ContextPath {
    pub fn matches(&self, pattern: &Pattern) -> bool {
        pattern.matches(self, &[])
    }
}

/// One segment of a compiled `Pattern` (§4.4, §6 "ContextPath pattern grammar").
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Command(Option<String>),
    Flag(Option<String>),
    Arg(Option<String>),
    Expr(Option<String>),
    Tag { key: String, val: Option<String> },
}

/// A compiled `ContextPath` pattern: `*`, `-flag`, `<arg>`, `<-expr>`,
/// `{key}`/`{key:val}`, concatenated with spaces, matched right-aligned and
/// anchored to the end of the path (§6).
#[derive(Debug, Clone)]
pub struct Pattern {
    segments: Vec<PatternSegment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Pattern {
        let segments = raw.split_whitespace().map(Pattern::parse_segment).collect();
        Pattern { segments }
    }

    fn parse_segment(tok: &str) -> PatternSegment {
        if let Some(rest) = tok.strip_prefix("<-") {
            let inner = rest.strip_suffix('>').unwrap_or(rest);
            return PatternSegment::Expr(if inner.is_empty() { None } else { Some(inner.to_string()) });
        }
        if tok.starts_with('<') && tok.ends_with('>') && tok.len() >= 2 {
            let inner = &tok[1..tok.len() - 1];
            return PatternSegment::Arg(if inner.is_empty() { None } else { Some(inner.to_string()) });
        }
        if tok.starts_with('{') && tok.ends_with('}') && tok.len() >= 2 {
            let inner = &tok[1..tok.len() - 1];
            return match inner.split_once(':') {
                Some((k, v)) => PatternSegment::Tag { key: k.to_string(), val: Some(v.to_string()) },
                None => PatternSegment::Tag { key: inner.to_string(), val: None },
            };
        }
        if tok == "-" || tok == "--" {
            return PatternSegment::Flag(None);
        }
        if let Some(rest) = tok.strip_prefix("--") {
            return PatternSegment::Flag(Some(rest.to_string()));
        }
        if let Some(rest) = tok.strip_prefix('-') {
            return PatternSegment::Flag(Some(rest.to_string()));
        }
        if tok == "*" {
            return PatternSegment::Command(None);
        }
        PatternSegment::Command(Some(tok.to_string()))
    }

    /// `tags` supplies, per path segment (same length/order as the path
    /// being matched), the metadata keys that segment's target carries —
    /// needed to resolve `{key}`/`{key:val}` segments. An empty slice
    /// disables tag matching (such segments never match).
    pub fn matches(&self, path: &ContextPath, tags: &[&IndexMap<String, serde_json::Value>]) -> bool {
        if self.segments.len() > path.0.len() {
            return false;
        }
        let offset = path.0.len() - self.segments.len();
        for (i, seg) in self.segments.iter().enumerate() {
            let path_seg = &path.0[offset + i];
            let path_tags = tags.get(offset + i).copied();
            if !Pattern::segment_matches(seg, path_seg, path_tags) {
                return false;
            }
        }
        true
    }

    fn segment_matches(
        pattern: &PatternSegment,
        actual: &PathSegment,
        tags: Option<&IndexMap<String, serde_json::Value>>,
    ) -> bool {
        match (pattern, actual) {
            (PatternSegment::Command(None), PathSegment::Command(_)) => true,
            (PatternSegment::Command(Some(n)), PathSegment::Command(a)) => n == a,
            (PatternSegment::Flag(None), PathSegment::Flag(_)) => true,
            (PatternSegment::Flag(Some(n)), PathSegment::Flag(a)) => n == a,
            (PatternSegment::Arg(None), PathSegment::Arg(_)) => true,
            (PatternSegment::Arg(Some(n)), PathSegment::Arg(a)) => n == a,
            (PatternSegment::Expr(None), PathSegment::Expr(_)) => true,
            (PatternSegment::Expr(Some(n)), PathSegment::Expr(a)) => n == a,
            (PatternSegment::Tag { key, val }, _) => match tags.and_then(|t| t.get(key)) {
                Some(v) => match val {
                    Some(expected) => v.as_str() == Some(expected.as_str()) || v.to_string() == *expected,
                    None => true,
                },
                None => false,
            },
            _ => false,
        }
    }
}

/// The Go-`context.Context`-shaped cancellation contract (§5): `Done`,
/// `Err`, `Deadline`, built on `tokio::sync::watch` (already a teacher
/// dependency via the `sync` feature) rather than `tokio_util`'s
/// `CancellationToken`, which is not in the dependency pack.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<tokio::sync::watch::Sender<bool>>,
    rx: tokio::sync::watch::Receiver<bool>,
    deadline: Option<std::time::Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::watch::channel(false);
        CancelToken { tx: Arc::new(tx), rx, deadline: None }
    }

    pub fn with_deadline(deadline: std::time::Instant) -> Self {
        let mut c = CancelToken::new();
        c.deadline = Some(deadline);
        c
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_done(&self) -> bool {
        *self.rx.borrow() || self.deadline.map(|d| std::time::Instant::now() >= d).unwrap_or(false)
    }

    pub fn err(&self) -> Option<&'static str> {
        if *self.rx.borrow() {
            Some("context canceled")
        } else if self.deadline.map(|d| std::time::Instant::now() >= d).unwrap_or(false) {
            Some("deadline exceeded")
        } else {
            None
        }
    }

    pub fn deadline(&self) -> Option<std::time::Instant> {
        self.deadline
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelToken(done={})", self.is_done())
    }
}

/// The three internal variants backing a Context (§4.4, §9). `commandContext`
/// owns a scope's `BindingMap` and its resolved (own + inherited-persistent)
/// value table; `optionContext` is a Flag/Arg/Expr target, delegating
/// unmatched lookups to its parent; `valueContext` wraps an ad-hoc value
/// (an `EachOccurrence` snapshot, or an expression operator's bound value).
enum ContextKind {
    Command { binding: Mutex<BindingMap>, values: IndexMap<String, ValueCell> },
    Option_ { own_name: String, own_value: ValueCell },
    Value_ { own_value: ValueCell },
}

struct ContextInner {
    parent: Option<Context>,
    timing: Mutex<Timing>,
    segment: Option<PathSegment>,
    data: IndexMap<String, serde_json::Value>,
    kind: ContextKind,
    cancel: CancelToken,
    fs: Arc<dyn FileSystem>,
}

/// A node in the context graph. Cheap to clone (reference-counted).
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn root(fs: Arc<dyn FileSystem>) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                parent: None,
                timing: Mutex::new(Timing::Initial),
                segment: None,
                data: IndexMap::new(),
                kind: ContextKind::Command { binding: Mutex::new(BindingMap::new()), values: IndexMap::new() },
                cancel: CancelToken::new(),
                fs,
            }),
        }
    }

    pub fn child_command(
        &self,
        name: &str,
        values: IndexMap<String, ValueCell>,
        data: IndexMap<String, serde_json::Value>,
    ) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                parent: Some(self.clone()),
                timing: Mutex::new(self.timing()),
                segment: Some(PathSegment::Command(name.to_string())),
                data,
                kind: ContextKind::Command { binding: Mutex::new(BindingMap::new()), values },
                cancel: self.inner.cancel.clone(),
                fs: self.inner.fs.clone(),
            }),
        }
    }

    pub fn child_option(
        &self,
        segment: PathSegment,
        own_name: &str,
        own_value: ValueCell,
        data: IndexMap<String, serde_json::Value>,
    ) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                parent: Some(self.clone()),
                timing: Mutex::new(self.timing()),
                segment: Some(segment),
                data,
                kind: ContextKind::Option_ { own_name: own_name.to_string(), own_value },
                cancel: self.inner.cancel.clone(),
                fs: self.inner.fs.clone(),
            }),
        }
    }

    pub fn child_value(&self, segment: Option<PathSegment>, own_value: ValueCell) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                parent: Some(self.clone()),
                timing: Mutex::new(self.timing()),
                segment,
                data: IndexMap::new(),
                kind: ContextKind::Value_ { own_value },
                cancel: self.inner.cancel.clone(),
                fs: self.inner.fs.clone(),
            }),
        }
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    pub fn timing(&self) -> Timing {
        *self.inner.timing.lock().unwrap()
    }

    pub fn set_timing(&self, timing: Timing) {
        *self.inner.timing.lock().unwrap() = timing;
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.inner.fs
    }

    pub fn data(&self) -> &IndexMap<String, serde_json::Value> {
        &self.inner.data
    }

    /// `Path()` (§4.4): the breadcrumb from the root down to this context.
    pub fn path(&self) -> ContextPath {
        let mut segs = Vec::new();
        let mut cur = Some(self);
        let mut stack = Vec::new();
        while let Some(c) = cur {
            if let Some(s) = &c.inner.segment {
                stack.push(s.clone());
            }
            cur = c.parent();
        }
        stack.reverse();
        segs.extend(stack);
        ContextPath(segs)
    }

    /// `Match(pattern)` (§4.4).
    pub fn matches(&self, pattern: &Pattern) -> bool {
        let path = self.path();
        let mut cur = Some(self);
        let mut tag_maps = Vec::new();
        let mut stack = Vec::new();
        while let Some(c) = cur {
            if c.inner.segment.is_some() {
                stack.push(&c.inner.data);
            }
            cur = c.parent();
        }
        stack.reverse();
        tag_maps.extend(stack);
        pattern.matches(&path, &tag_maps)
    }

    /// The root command context for this scope: `binding` is only present on
    /// `Command`-kind contexts.
    pub fn binding_map(&self) -> Option<std::sync::MutexGuard<'_, BindingMap>> {
        match &self.inner.kind {
            ContextKind::Command { binding, .. } => Some(binding.lock().unwrap()),
            _ => None,
        }
    }

    /// Resolve a value cell by name per §4.4's lookup order: current scope's
    /// table, then the parent, recursively. An empty `name` means "my own
    /// value" and only resolves against `Option_`/`Value_` contexts.
    pub fn value_cell(&self, name: &str) -> Option<ValueCell> {
        if name.is_empty() {
            return match &self.inner.kind {
                ContextKind::Option_ { own_value, .. } => Some(own_value.clone()),
                ContextKind::Value_ { own_value } => Some(own_value.clone()),
                ContextKind::Command { .. } => None,
            };
        }
        match &self.inner.kind {
            ContextKind::Command { values, .. } => {
                if let Some(cell) = values.get(name) {
                    return Some(cell.clone());
                }
            }
            ContextKind::Option_ { own_name, own_value } => {
                if own_name == name {
                    return Some(own_value.clone());
                }
            }
            ContextKind::Value_ { .. } => {}
        }
        self.parent().and_then(|p| p.value_cell(name))
    }

    /// A typed snapshot of the named value, cloned out of its cell.
    pub fn value<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        let cell = self.value_cell(name)?;
        let guard = cell.lock().unwrap();
        guard.as_any().downcast_ref::<T>().cloned()
    }

    pub fn value_display(&self, name: &str) -> Option<String> {
        let cell = self.value_cell(name)?;
        Some(cell.lock().unwrap().display())
    }

    /// `Raw(name)`/`RawOccurrences(name)` (§4.4): the unparsed tokens for a
    /// name bound in the *nearest enclosing command scope's* BindingMap.
    pub fn raw(&self, name: &str) -> Vec<String> {
        let mut cur = Some(self);
        while let Some(c) = cur {
            if let ContextKind::Command { binding, .. } = &c.inner.kind {
                return binding.lock().unwrap().raw_flat(name);
            }
            cur = c.parent();
        }
        Vec::new()
    }

    pub fn is_seen(&self, name: &str) -> bool {
        let mut cur = Some(self);
        while let Some(c) = cur {
            if let ContextKind::Command { binding, .. } = &c.inner.kind {
                return binding.lock().unwrap().is_seen(name);
            }
            cur = c.parent();
        }
        false
    }

    pub fn is_implicitly_set(&self, name: &str) -> bool {
        let mut cur = Some(self);
        while let Some(c) = cur {
            if let ContextKind::Command { binding, .. } = &c.inner.kind {
                return binding.lock().unwrap().is_implicitly_set(name);
            }
            cur = c.parent();
        }
        false
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// `Context.At(timing, action)` (§4.3, §7 `ErrTimingTooLate`): run
    /// `action` against this Context, but only if `timing` has not already
    /// elapsed relative to this Context's current phase. Rejects scheduling
    /// work into a phase the traversal has already passed.
    pub async fn at(&self, timing: Timing, action: ActionOf) -> Result<()> {
        check_timing(self.timing(), timing)?;
        action.execute(self).await
    }
}

/// `Value` trait object accessor used to downcast a locked cell — kept as a
/// free function so `Context::value` above can call it without borrowing
/// issues across the `MutexGuard`.
#[allow(dead_code)]
fn assert_value_object_safe(_: &dyn Value) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{new_cell, BoolValue, StringValue};

    fn fs() -> Arc<dyn FileSystem> {
        Arc::new(crate::fs::InMemoryFs::new())
    }

    #[test]
    fn pattern_matches_right_aligned_named_command_and_flag() {
        let path = ContextPath(vec![
            PathSegment::Command("app".to_string()),
            PathSegment::Command("c".to_string()),
            PathSegment::Flag("f".to_string()),
        ]);
        assert!(Pattern::parse("c -f").matches(&path, &[]));

        let other = ContextPath(vec![PathSegment::Command("app".to_string()), PathSegment::Flag("f".to_string())]);
        assert!(!Pattern::parse("c -f").matches(&other, &[]));
    }

    #[test]
    fn pattern_wildcards_match_any_command_and_flag() {
        let path1 = ContextPath(vec![
            PathSegment::Command("app".to_string()),
            PathSegment::Command("c".to_string()),
            PathSegment::Flag("f".to_string()),
        ]);
        let path2 = ContextPath(vec![
            PathSegment::Command("app".to_string()),
            PathSegment::Command("d".to_string()),
            PathSegment::Flag("g".to_string()),
        ]);
        let pattern = Pattern::parse("* -");
        assert!(pattern.matches(&path1, &[]));
        assert!(pattern.matches(&path2, &[]));
    }

    #[test]
    fn tag_pattern_matches_metadata() {
        let mut data = IndexMap::new();
        data.insert("tag".to_string(), serde_json::Value::String("t".to_string()));
        let path = ContextPath(vec![PathSegment::Flag("f".to_string())]);
        let pattern = Pattern::parse("{tag:t}");
        assert!(pattern.matches(&path, &[&data]));
        let mismatched = Pattern::parse("{tag:other}");
        assert!(!mismatched.matches(&path, &[&data]));
    }

    #[test]
    fn value_lookup_falls_through_to_parent() {
        let root = Context::root(fs());
        let mut values = IndexMap::new();
        values.insert("host".to_string(), new_cell(StringValue("h1".to_string())));
        let child = root.child_command("sub", values, IndexMap::new());
        assert_eq!(child.value::<StringValue>("host").unwrap().0, "h1");
    }

    #[test]
    fn own_value_lookup_with_empty_name() {
        let root = Context::root(fs());
        let cell = new_cell(BoolValue(true));
        let option_ctx = root.child_option(PathSegment::Flag("verbose".to_string()), "verbose", cell, IndexMap::new());
        assert!(option_ctx.value::<BoolValue>("").unwrap().0);
    }

    #[test]
    fn timing_is_inherited_from_parent_at_creation() {
        let root = Context::root(fs());
        root.set_timing(Timing::Before);
        let child = root.child_command("sub", IndexMap::new(), IndexMap::new());
        assert_eq!(child.timing(), Timing::Before);
    }

    #[tokio::test]
    async fn at_rejects_scheduling_into_an_elapsed_phase() {
        let root = Context::root(fs());
        root.set_timing(Timing::After);
        let result = root.at(Timing::Before, crate::lifecycle::ActionOf::noop()).await;
        assert!(matches!(result, Err(crate::error::CliError::TimingTooLate(Timing::Before))));
    }

    #[tokio::test]
    async fn at_runs_the_action_when_timing_has_not_elapsed() {
        let root = Context::root(fs());
        root.set_timing(Timing::Before);
        assert!(root.at(Timing::After, crate::lifecycle::ActionOf::noop()).await.is_ok());
    }
}
