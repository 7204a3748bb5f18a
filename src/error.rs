//! Error Taxonomy
//!
//! The closed set of error kinds a running App can produce, and how each one
//! maps onto a process exit code.

use std::fmt;
use thiserror::Error;

use crate::context::Timing;

/// The structured reason a parse failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnexpectedArgument,
    CommandNotFound,
    UnknownOption,
    MissingArgument,
    InvalidArgument,
    ExpectedArgument,
    UnknownExpr,
    ArgsMustPrecedeExprs,
    FlagUsedAfterArgs,
    ExpectedRequiredOption,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::UnexpectedArgument => "unexpected argument",
            ErrorCode::CommandNotFound => "command not found",
            ErrorCode::UnknownOption => "unknown option",
            ErrorCode::MissingArgument => "missing argument",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::ExpectedArgument => "expected argument",
            ErrorCode::UnknownExpr => "unknown expression",
            ErrorCode::ArgsMustPrecedeExprs => "arguments must precede expressions",
            ErrorCode::FlagUsedAfterArgs => "flag used after arguments",
            ErrorCode::ExpectedRequiredOption => "expected required option",
        };
        f.write_str(s)
    }
}

/// A parse-time failure, carrying enough context for a robust-parse caller
/// (completion, help) to recover.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub code: ErrorCode,
    pub item: Option<String>,
    pub value: Option<String>,
    pub remaining: Vec<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(item) = &self.item {
            write!(f, ": `{item}`")?;
        }
        if let Some(value) = &self.value {
            write!(f, " (value `{value}`)")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub fn new(code: ErrorCode) -> Self {
        ParseError { code, item: None, value: None, remaining: Vec::new() }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_remaining(mut self, remaining: Vec<String>) -> Self {
        self.remaining = remaining;
        self
    }
}

/// A framework-invariant violation: wrong-timing invocation, scheduling work
/// in the past, or a structural error detected during Initialize.
#[derive(Error, Debug, Clone)]
#[error("internal error at {path} (timing {timing:?}): {message}")]
pub struct InternalError {
    pub path: String,
    pub timing: Timing,
    pub message: String,
}

impl InternalError {
    pub fn new(path: impl Into<String>, timing: Timing, message: impl Into<String>) -> Self {
        InternalError { path: path.into(), timing, message: message.into() }
    }
}

/// A terminal error that carries its own process exit code.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        ExitError { code, message: message.into() }
    }
}

/// Failures from the value-binding engine: bad literals, disallowed
/// `Optional` requests, file-reference read failures.
#[derive(Error, Debug, Clone)]
pub enum ValueError {
    #[error("invalid {kind} value: `{raw}`")]
    InvalidLiteral { kind: &'static str, raw: String },

    #[error("`Optional` is not supported for {kind} values")]
    OptionalNotSupported { kind: &'static str },

    #[error("failed to read file reference `{path}`: {message}")]
    FileReference { path: String, message: String },

    #[error("path `{path}` does not exist")]
    MustExist { path: String },

    #[error("path `{path}` is not a directory")]
    NotADirectory { path: String },

    #[error("`{option}` requires a boolean value")]
    RequiresBoolean { option: &'static str },

    #[error("`{option}` cannot be combined with `{other}` on a non-boolean flag")]
    IncompatibleOptions { option: &'static str, other: &'static str },
}

/// The crate's public error type.
#[derive(Error, Debug, Clone)]
pub enum CliError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Exit(#[from] ExitError),

    #[error(transparent)]
    Value(#[from] ValueError),

    /// Sentinel requesting the executor skip the current command's Action
    /// without treating it as a failure.
    #[error("skip command")]
    Skip,

    /// Re-entry into a timing phase that has already elapsed.
    #[error("timing too late: cannot schedule work at or before {0:?}")]
    TimingTooLate(Timing),

    /// Escape hatch for user actions that just want to fail with a message.
    #[error("{0}")]
    Message(String),
}

impl CliError {
    /// Map a terminal error to the process exit code described in §7/§8.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Exit(e) => e.code,
            CliError::Parse(_) => 2,
            CliError::Skip => 0,
            _ => 1,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError::Message(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError::Message(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
