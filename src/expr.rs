//! Expr / Expression
//!
//! `find(1)`-style expression operators (§3 "Expr", "Expression"; §4.2
//! "Expression pipeline parse"). An `Expr` is a declared operator (`-name`)
//! with its own Args and an `Evaluate` function; an `Expression` is the
//! value destination an Arg binds onto, holding the recognized operator
//! vocabulary and the parsed sequence of bound instances.
//!
//! Grounded on the teacher's `src/commands/find/{parser,ops}.rs`: that
//! module's hand-rolled operator table and per-operator arg counts are the
//! direct ancestor of `Expr`/`ExprTable` below, generalized from a fixed
//! `find` operator set to a program-author-declared one.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::argcounter::{ArgCounter, Exactly};
use crate::context::PathSegment;
use crate::error::ValueError;
use crate::lifecycle::{EvaluateOf, Pipelines};
use crate::options::Options;
use crate::value::{Value, ValueCell, ValueKind};

/// A declared expression operator.
#[derive(Clone)]
pub struct Expr {
    pub name: String,
    pub aliases: Vec<String>,
    pub help_text: String,
    pub usage_text: String,
    pub args: Vec<crate::arg::Arg>,
    pub options: Options,
    pub data: IndexMap<String, serde_json::Value>,
    pub pipelines: Pipelines,
    pub evaluate: Option<EvaluateOf>,
    pub counter: Arc<dyn ArgCounter>,
}

impl Expr {
    pub fn new(name: impl Into<String>) -> Self {
        Expr {
            name: name.into(),
            aliases: Vec::new(),
            help_text: String::new(),
            usage_text: String::new(),
            args: Vec::new(),
            options: Options::NONE,
            data: IndexMap::new(),
            pipelines: Pipelines::default(),
            evaluate: None,
            counter: Arc::new(Exactly(0)),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn arg(mut self, arg: crate::arg::Arg) -> Self {
        let total = self.counter.min() + arg.counter.min();
        self.args.push(arg);
        self.counter = Arc::new(Exactly(total));
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    pub fn evaluate(mut self, evaluate: EvaluateOf) -> Self {
        self.evaluate = Some(evaluate);
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    pub fn path_segment(&self) -> PathSegment {
        PathSegment::Expr(self.name.clone())
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expr").field("name", &self.name).finish()
    }
}

/// One resolved occurrence of an expression operator: its declaration, the
/// raw tokens bound to its own Args, and a fresh value cell per own-Arg
/// (§3 "independent" invariant — each occurrence owns its own binding and
/// its own value storage, never shared with a sibling occurrence of the
/// same operator, even though every occurrence resolves against the same
/// `Expr` declaration).
#[derive(Debug, Clone)]
pub struct BoundExpr {
    pub expr_name: String,
    pub raw: Vec<String>,
    pub binding: crate::binding::BindingMap,
    pub values: IndexMap<String, ValueCell>,
}

impl BoundExpr {
    pub fn render(&self) -> String {
        let mut out = format!("-{}", self.expr_name);
        for token in &self.raw {
            out.push(' ');
            out.push_str(token);
        }
        out
    }
}

/// The value destination an `Expression`-typed Arg binds onto: the
/// recognized operator table plus the parsed sequence of bound occurrences
/// (§3 "Expression", §4.2 "Expression pipeline parse").
#[derive(Debug, Clone, Default)]
pub struct Expression {
    pub bound: Vec<BoundExpr>,
}

impl Expression {
    pub fn new() -> Self {
        Expression::default()
    }

    pub fn push(&mut self, bound: BoundExpr) {
        self.bound.push(bound);
    }

    /// `String()` rendering used by S3: `"arg -multi a b -offset 2"` style,
    /// minus the leading arg name (the caller prefixes that).
    pub fn render(&self) -> String {
        self.bound.iter().map(BoundExpr::render).collect::<Vec<_>>().join(" ")
    }
}

impl Value for Expression {
    fn set(&mut self, _raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        // Expression values are populated by the expression sub-parser
        // directly via `push`, not through the generic `Set` entry point.
        Ok(())
    }

    fn reset(&mut self) {
        self.bound.clear();
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(Expression::default())
    }

    fn display(&self) -> String {
        self.render()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Expression
    }

    fn is_collection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_expr_renders_name_and_raw_tokens() {
        let bound = BoundExpr {
            expr_name: "multi".to_string(),
            raw: vec!["a".to_string(), "b".to_string()],
            binding: crate::binding::BindingMap::new(),
            values: IndexMap::new(),
        };
        assert_eq!(bound.render(), "-multi a b");
    }

    #[test]
    fn expression_joins_multiple_bound_occurrences_in_order() {
        let mut expression = Expression::new();
        expression.push(BoundExpr {
            expr_name: "multi".to_string(),
            raw: vec!["a".to_string(), "b".to_string()],
            binding: crate::binding::BindingMap::new(),
            values: IndexMap::new(),
        });
        expression.push(BoundExpr {
            expr_name: "offset".to_string(),
            raw: vec!["2".to_string()],
            binding: crate::binding::BindingMap::new(),
            values: IndexMap::new(),
        });
        assert_eq!(expression.render(), "-multi a b -offset 2");
    }
}
