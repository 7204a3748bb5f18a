//! Options and Filters — the predicate half (§4.5)
//!
//! `ContextFilter` is a predicate over a `Context`. `FilterModes` packs the
//! common no-argument checks (segment kind, Seen, HasValue, RootCommand,
//! timing) into a hand-rolled bitmask the same way `Options` does (§4.5,
//! `src/options.rs`). Parameterized predicates — `HasSeen(name)`,
//! `HasData(key[,val])`, a `ContextPath` pattern — can't fit in a bitmask bit,
//! so they're built as standalone `ContextFilter`s instead. `Any`/`All`
//! compose filters; `IfMatch` wraps an `ActionOf` with a guard.

use std::sync::Arc;

use crate::context::{Context, Pattern, PathSegment, Timing};
use crate::lifecycle::ActionOf;

/// A predicate over a `Context` (§4.5). Cheap to clone, an `Arc`'d closure.
#[derive(Clone)]
pub struct ContextFilter {
    inner: Arc<dyn Fn(&Context) -> bool + Send + Sync>,
}

impl ContextFilter {
    pub fn new(f: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        ContextFilter { inner: Arc::new(f) }
    }

    pub fn matches(&self, ctx: &Context) -> bool {
        (self.inner)(ctx)
    }

    /// Matches when `ctx`'s path satisfies `pattern` (§6 pattern grammar).
    pub fn pattern(pattern: Pattern) -> Self {
        ContextFilter::new(move |ctx| ctx.matches(&pattern))
    }

    /// Matches when `name` was explicitly or implicitly bound in the
    /// nearest enclosing command scope.
    pub fn has_seen(name: impl Into<String>) -> Self {
        let name = name.into();
        ContextFilter::new(move |ctx| ctx.is_seen(&name))
    }

    /// Matches when `ctx`'s own data carries `key`, optionally equal to `val`.
    pub fn has_data(key: impl Into<String>, val: Option<serde_json::Value>) -> Self {
        let key = key.into();
        ContextFilter::new(move |ctx| match ctx.data().get(&key) {
            Some(found) => val.as_ref().map(|want| found == want).unwrap_or(true),
            None => false,
        })
    }
}

/// `Any(filters...)`: true if at least one filter matches (§4.5).
pub fn any(filters: Vec<ContextFilter>) -> ContextFilter {
    ContextFilter::new(move |ctx| filters.iter().any(|f| f.matches(ctx)))
}

/// `All(filters...)`: true only if every filter matches (§4.5).
pub fn all(filters: Vec<ContextFilter>) -> ContextFilter {
    ContextFilter::new(move |ctx| filters.iter().all(|f| f.matches(ctx)))
}

/// `IfMatch(filter, action)`: runs `action` only when `filter` matches the
/// Context it's invoked with, otherwise a no-op (§4.5).
pub fn if_match(filter: ContextFilter, action: ActionOf) -> ActionOf {
    ActionOf::from_async(move |ctx| {
        let filter = filter.clone();
        let action = action.clone();
        async move {
            if filter.matches(&ctx) {
                action.execute(&ctx).await
            } else {
                Ok(())
            }
        }
    })
}

/// Bitmask predicate over the no-argument Context checks (§4.5). Hand-rolled
/// the same way as `Options` rather than pulled in from a crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterModes(u64);

macro_rules! filter_bits {
    ($($name:ident = $bit:expr),+ $(,)?) => {
        impl FilterModes {
            $(pub const $name: FilterModes = FilterModes(1u64 << $bit);)+
        }
    };
}

filter_bits! {
    ANY_FLAG = 0,
    ANY_ARG = 1,
    ANY_COMMAND = 2,
    ANY_EXPR = 3,
    SEEN = 4,
    HAS_VALUE = 5,
    ROOT_COMMAND = 6,
    TIMING_INITIAL = 7,
    TIMING_BEFORE = 8,
    TIMING_ACTION = 9,
    TIMING_AFTER = 10,
}

impl FilterModes {
    pub const NONE: FilterModes = FilterModes(0);

    pub fn contains(self, other: FilterModes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: FilterModes) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: FilterModes) -> FilterModes {
        FilterModes(self.0 | other.0)
    }

    fn timing_matches(self, timing: Timing) -> bool {
        let wants_any_timing = self.intersects(
            FilterModes::TIMING_INITIAL | FilterModes::TIMING_BEFORE | FilterModes::TIMING_ACTION | FilterModes::TIMING_AFTER,
        );
        if !wants_any_timing {
            return true;
        }
        match timing {
            Timing::Initial => self.contains(FilterModes::TIMING_INITIAL),
            Timing::Before => self.contains(FilterModes::TIMING_BEFORE),
            Timing::Action => self.contains(FilterModes::TIMING_ACTION),
            Timing::After => self.contains(FilterModes::TIMING_AFTER),
        }
    }

    /// Compile into a `ContextFilter` for use with `IfMatch` or `Any`/`All`.
    pub fn to_filter(self) -> ContextFilter {
        ContextFilter::new(move |ctx| {
            let segment = ctx.path().0.last().cloned();
            if self.contains(FilterModes::ANY_FLAG) && !matches!(segment, Some(PathSegment::Flag(_))) {
                return false;
            }
            if self.contains(FilterModes::ANY_ARG) && !matches!(segment, Some(PathSegment::Arg(_))) {
                return false;
            }
            if self.contains(FilterModes::ANY_COMMAND) && !matches!(segment, Some(PathSegment::Command(_))) {
                return false;
            }
            if self.contains(FilterModes::ANY_EXPR) && !matches!(segment, Some(PathSegment::Expr(_))) {
                return false;
            }
            if self.contains(FilterModes::ROOT_COMMAND) && !ctx.is_root() {
                return false;
            }
            if self.contains(FilterModes::SEEN) {
                let name = match &segment {
                    Some(PathSegment::Flag(n)) | Some(PathSegment::Arg(n)) | Some(PathSegment::Expr(n)) => Some(n.clone()),
                    _ => None,
                };
                match name {
                    Some(n) => {
                        if !ctx.is_seen(&n) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            if self.contains(FilterModes::HAS_VALUE) {
                let has = ctx.value_display("").map(|d| !d.is_empty()).unwrap_or(false);
                if !has {
                    return false;
                }
            }
            self.timing_matches(ctx.timing())
        })
    }
}

impl std::ops::BitOr for FilterModes {
    type Output = FilterModes;

    fn bitor(self, rhs: FilterModes) -> FilterModes {
        FilterModes(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FilterModes {
    fn bitor_assign(&mut self, rhs: FilterModes) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::value::{new_cell, BoolValue};
    use std::sync::Arc;

    fn fs() -> Arc<dyn crate::fs::FileSystem> {
        Arc::new(InMemoryFs::new())
    }

    #[test]
    fn filter_modes_any_flag_matches_flag_segment() {
        let root = Context::root(fs());
        let cell = new_cell(BoolValue(true));
        let opt = root.child_option(PathSegment::Flag("verbose".to_string()), "verbose", cell, indexmap::IndexMap::new());
        assert!(FilterModes::ANY_FLAG.to_filter().matches(&opt));
        assert!(!FilterModes::ANY_ARG.to_filter().matches(&opt));
    }

    #[test]
    fn filter_modes_root_command_matches_only_root() {
        let root = Context::root(fs());
        let child = root.child_command("sub", indexmap::IndexMap::new(), indexmap::IndexMap::new());
        assert!(FilterModes::ROOT_COMMAND.to_filter().matches(&root));
        assert!(!FilterModes::ROOT_COMMAND.to_filter().matches(&child));
    }

    #[test]
    fn any_matches_when_one_filter_matches() {
        let root = Context::root(fs());
        let f = any(vec![ContextFilter::has_seen("bogus"), FilterModes::ROOT_COMMAND.to_filter()]);
        assert!(f.matches(&root));
    }

    #[test]
    fn all_requires_every_filter() {
        let root = Context::root(fs());
        let f = all(vec![FilterModes::ROOT_COMMAND.to_filter(), ContextFilter::has_seen("bogus")]);
        assert!(!f.matches(&root));
    }

    #[test]
    fn has_data_matches_exact_value() {
        let mut data = indexmap::IndexMap::new();
        data.insert("category".to_string(), serde_json::Value::String("net".to_string()));
        let root = Context::root(fs());
        let child = root.child_command("sub", indexmap::IndexMap::new(), data);
        assert!(ContextFilter::has_data("category", Some(serde_json::Value::String("net".to_string()))).matches(&child));
        assert!(!ContextFilter::has_data("category", Some(serde_json::Value::String("other".to_string()))).matches(&child));
    }
}
