//! Flag
//!
//! A declared named option: short/long names, env-var and file-path
//! fallback, a typed value destination, and the four lifecycle pipelines
//! (§3 "Flag"). Persistent flags share their destination cell with every
//! descendant command scope that references them (§3 invariant).

use std::sync::Arc;

use crate::argcounter::{ArgCounter, Exactly, ZeroOrOne};
use crate::context::PathSegment;
use crate::lifecycle::Pipelines;
use crate::options::Options;
use crate::value::{new_cell, BoolValue, Value, ValueCell, ValueKind};

/// The short/long-name record and consumption policy for a Flag, mirroring
/// the teacher's habit (`src/interpreter/helpers/shellopts.rs`) of keeping
/// option bookkeeping in one small struct rather than scattering it across
/// the owning type.
#[derive(Clone, Debug)]
pub struct InternalOption {
    pub short_names: Vec<char>,
    pub long_names: Vec<String>,
    pub counter: Arc<dyn ArgCounter>,
}

impl InternalOption {
    fn for_value(kind: ValueKind, optional: bool) -> Arc<dyn ArgCounter> {
        if optional {
            return Arc::new(ZeroOrOne);
        }
        match kind {
            ValueKind::Bool => Arc::new(Exactly(0)),
            _ => Arc::new(Exactly(1)),
        }
    }
}

/// A declared flag. Cheap to clone: every field that must be shared across
/// a persistent-flag clone (the value destination, the counter, the
/// pipelines) is already behind an `Arc`.
#[derive(Clone)]
pub struct Flag {
    pub name: String,
    pub aliases: Vec<String>,
    pub short_aliases: Vec<char>,
    pub help_text: String,
    pub usage_text: String,
    pub category: String,
    pub env_vars: Vec<String>,
    pub file_paths: Vec<String>,
    pub value: ValueCell,
    pub default_text: Option<String>,
    pub options: Options,
    pub data: indexmap::IndexMap<String, serde_json::Value>,
    pub pipelines: Pipelines,
    pub internal: InternalOption,
    pub persistent: bool,
}

impl Flag {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let value = new_cell(BoolValue::default());
        let internal = InternalOption {
            short_names: Vec::new(),
            long_names: vec![name.clone()],
            counter: InternalOption::for_value(ValueKind::Bool, false),
        };
        Flag {
            name,
            aliases: Vec::new(),
            short_aliases: Vec::new(),
            help_text: String::new(),
            usage_text: String::new(),
            category: String::new(),
            env_vars: Vec::new(),
            file_paths: Vec::new(),
            value,
            default_text: None,
            options: Options::NONE,
            data: indexmap::IndexMap::new(),
            pipelines: Pipelines::default(),
            internal,
            persistent: true,
        }
    }

    pub fn value(mut self, value: impl Value + 'static) -> Self {
        let kind = value.kind();
        let optional_ok = value.allows_optional();
        self.value = new_cell(value);
        self.internal.counter = InternalOption::for_value(kind, self.options.contains(Options::OPTIONAL));
        self.assert_optional_supported(optional_ok, kind);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.internal.long_names.push(alias.clone());
        self.aliases.push(alias);
        self
    }

    pub fn short(mut self, c: char) -> Self {
        self.internal.short_names.push(c);
        self.short_aliases.push(c);
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    pub fn usage(mut self, text: impl Into<String>) -> Self {
        self.usage_text = text.into();
        self
    }

    pub fn env(mut self, name: impl Into<String>) -> Self {
        self.env_vars.push(name.into());
        self
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        let (kind, optional_ok) = {
            let guard = self.value.lock().unwrap();
            (guard.kind(), guard.allows_optional())
        };
        self.internal.counter = InternalOption::for_value(kind, options.contains(Options::OPTIONAL));
        self.persistent = !options.contains(Options::NON_PERSISTENT);
        self.assert_optional_supported(optional_ok, kind);
        self
    }

    /// §4.5 `Optional`: enforced at declaration time, regardless of whether
    /// `.value(..)` or `.options(..)` is called first, rather than left for
    /// the parser to discover only when a bare occurrence is actually seen.
    fn assert_optional_supported(&self, optional_ok: bool, kind: ValueKind) {
        assert!(
            optional_ok || !self.options.contains(Options::OPTIONAL),
            "flag `{}`: `Optional` is not supported for {} values",
            self.name,
            kind,
        );
    }

    pub fn data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn action(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.action.push(action);
        self
    }

    pub fn before(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.before.push(action);
        self
    }

    pub fn after(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.after.push(action);
        self
    }

    /// Clone for use in a descendant command scope: metadata is duplicated
    /// but the value destination (and its counter) is the same `Arc`, so
    /// writes from any scope are visible to all (§3 persistent-flag
    /// invariant).
    pub fn clone_persistent(&self) -> Flag {
        Flag { value: self.value.clone(), internal: self.internal.clone(), ..self.clone_metadata() }
    }

    fn clone_metadata(&self) -> Flag {
        Flag {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            short_aliases: self.short_aliases.clone(),
            help_text: self.help_text.clone(),
            usage_text: self.usage_text.clone(),
            category: self.category.clone(),
            env_vars: self.env_vars.clone(),
            file_paths: self.file_paths.clone(),
            value: self.value.clone(),
            default_text: self.default_text.clone(),
            options: self.options,
            data: self.data.clone(),
            pipelines: self.pipelines.clone(),
            internal: self.internal.clone(),
            persistent: self.persistent,
        }
    }

    pub fn matches_long(&self, name: &str) -> bool {
        self.internal.long_names.iter().any(|n| n == name)
    }

    pub fn matches_short(&self, c: char) -> bool {
        self.internal.short_names.contains(&c)
    }

    pub fn is_boolean(&self) -> bool {
        self.value.lock().unwrap().kind() == ValueKind::Bool
    }

    pub fn path_segment(&self) -> PathSegment {
        PathSegment::Flag(self.name.clone())
    }

    pub fn counter(&self) -> Arc<dyn ArgCounter> {
        self.internal.counter.clone()
    }
}
