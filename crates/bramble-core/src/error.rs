use std::fmt;

use thiserror::Error;

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";
pub const WARN_TAG: &str = "\x1b[33m[WARN]\x1b[0m";

#[derive(Clone, Debug, Default)]
pub struct ParseErrorData {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for ParseErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.col)
    }
}

#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    #[error("Parse error: {0}")]
    Parse(ParseErrorData),

    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Runtime error: {0}")]
    Other(String),
}

impl ScriptError {
    pub fn parse(message: impl Into<String>, line: usize, col: usize) -> Self {
        ScriptError::Parse(ParseErrorData {
            message: message.into(),
            line,
            col,
        })
    }

    pub fn unbound_symbol(name: impl Into<String>) -> Self {
        ScriptError::UnboundSymbol(name.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ScriptError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Other(message.into())
    }
}

impl From<String> for ScriptError {
    fn from(s: String) -> Self {
        ScriptError::runtime(s)
    }
}

impl From<&str> for ScriptError {
    fn from(s: &str) -> Self {
        ScriptError::runtime(s.to_string())
    }
}

pub fn format_error(err: &ScriptError) -> Vec<String> {
    vec![format!("{} {}", ERROR_TAG, err)]
}
