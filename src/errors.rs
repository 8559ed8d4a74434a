use std::fmt;
use thiserror::Error;

/// Raised while tokenizing or parsing an expression. Always detected at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset} (near `{near}`)")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
    pub near: String,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, source: &str, offset: usize) -> Self {
        let near = source
            .get(offset..)
            .unwrap_or_default()
            .chars()
            .take(16)
            .collect();
        Self {
            message: message.into(),
            offset,
            near,
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("no registered adapter accepts the supplied root")]
    NoAdapter,
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    #[error("function `{name}`: {message}")]
    Function { name: String, message: String },
}

/// The guard that tripped when a render is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Iterations,
    IncludeDepth,
    OutputSize,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LimitKind::Iterations => "iterations",
            LimitKind::IncludeDepth => "include depth",
            LimitKind::OutputSize => "output size",
        })
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("template limit exceeded: {kind} above {limit}")]
    LimitExceeded { kind: LimitKind, limit: usize },
    #[error("no includer configured to resolve `{0}`")]
    NoIncluder(String),
    #[error("cannot include `{name}`: {source}")]
    Include {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("in included template `{name}`: {source}")]
    Included {
        name: String,
        #[source]
        source: Box<TemplateError>,
    },
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("failed to write template output")]
    Fmt(#[from] fmt::Error),
}

impl TemplateError {
    pub fn is_limit(&self) -> bool {
        match self {
            TemplateError::LimitExceeded { .. } => true,
            TemplateError::Included { source, .. } => source.is_limit(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

pub type Result<T> = std::result::Result<T, Error>;
