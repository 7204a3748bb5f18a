//! argtree - a declarative command-line application framework
//!
//! An application is defined as a tree of `Command`s, each with `Flag`s,
//! positional `Arg`s, and optional `find(1)`-style expression pipelines.
//! The framework parses an argument vector against that tree, binds values
//! onto user-owned destinations, and drives a four-phase lifecycle
//! (Initial → Before → Action → After) through which user-supplied actions
//! customize behavior.

pub mod app;
pub mod arg;
pub mod argcounter;
pub mod binding;
pub mod command;
pub mod context;
pub mod error;
pub mod expr;
pub mod filter;
pub mod flag;
pub mod fs;
pub mod lifecycle;
pub mod options;
pub mod parser;
pub mod token;
pub mod value;

pub use app::App;
pub use arg::Arg;
pub use command::Command;
pub use context::{CancelToken, Context, ContextPath, Pattern, Timing};
pub use error::{CliError, ErrorCode, ParseError, Result};
pub use expr::{BoundExpr, Expr, Expression};
pub use filter::{ContextFilter, FilterModes};
pub use flag::Flag;
pub use fs::{FileSystem, InMemoryFs, OsFs};
pub use lifecycle::{ActionOf, EvaluateOf};
pub use options::Options;
pub use parser::{parse, ParseOptions, ParseOutcome};
