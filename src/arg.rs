//! Arg
//!
//! A declared positional argument: an ArgCounter-governed value destination
//! owned by a Command (or, for an expression operator's own positionals, by
//! an Expr) plus its own four lifecycle pipelines (§3 "Arg").

use std::sync::Arc;

use crate::argcounter::{ArgCounter, Exactly};
use crate::context::PathSegment;
use crate::expr::Expr;
use crate::lifecycle::Pipelines;
use crate::options::Options;
use crate::value::{new_cell, StringValue, Value, ValueCell, ValueKind};

#[derive(Clone)]
pub struct Arg {
    pub name: String,
    pub help_text: String,
    pub usage_text: String,
    pub value: ValueCell,
    pub options: Options,
    pub data: indexmap::IndexMap<String, serde_json::Value>,
    pub pipelines: Pipelines,
    pub counter: Arc<dyn ArgCounter>,
    /// The recognized operator vocabulary when `value` is `Expression`-typed
    /// (§3 "Expr", §4.2 "Expression pipeline parse"). Empty for ordinary Args.
    pub exprs: Vec<Expr>,
}

impl Arg {
    pub fn new(name: impl Into<String>) -> Self {
        Arg {
            name: name.into(),
            help_text: String::new(),
            usage_text: String::new(),
            value: new_cell(StringValue::default()),
            options: Options::NONE,
            data: indexmap::IndexMap::new(),
            pipelines: Pipelines::default(),
            counter: Arc::new(Exactly(1)),
            exprs: Vec::new(),
        }
    }

    pub fn value(mut self, value: impl Value + 'static) -> Self {
        let kind = value.kind();
        self.value = new_cell(value);
        if kind == ValueKind::Expression {
            // An Expression-typed Arg is populated by the expression
            // sub-parser, never by ordinary positional binding.
            self.counter = Arc::new(Exactly(0));
        }
        self
    }

    /// Declare a recognized expression operator (§4.2). Only meaningful when
    /// this Arg's value is `Expression`-typed.
    pub fn expr(mut self, expr: Expr) -> Self {
        self.exprs.push(expr);
        self
    }

    pub fn is_expression(&self) -> bool {
        self.value.lock().unwrap().kind() == ValueKind::Expression
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    pub fn usage(mut self, text: impl Into<String>) -> Self {
        self.usage_text = text.into();
        self
    }

    pub fn counter(mut self, counter: impl ArgCounter + 'static) -> Self {
        self.counter = Arc::new(counter);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
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

    /// Per §9's resolution of the "required positional arguments" Open
    /// Question: an Arg whose counter demands at least one token is
    /// required, no separate `Required` option needed.
    pub fn is_required(&self) -> bool {
        self.counter.min() >= 1
    }

    pub fn path_segment(&self) -> PathSegment {
        PathSegment::Arg(self.name.clone())
    }
}
