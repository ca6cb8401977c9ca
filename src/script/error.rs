//! Script error types
//!
//! Parse errors are fatal to loading a script and always carry the 1-based
//! line number. Keyword errors are raised while executing one line; the
//! interpreter reports them and moves on to the next line.

use thiserror::Error;

use crate::remote::ArgError;
use crate::rpc::RpcError;

/// Load-time failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: missing closing quote")]
    UnterminatedQuote { line: usize },

    #[error("line {line}: malformed \"as\" binding: {reason}")]
    MalformedAsBinding { line: usize, reason: String },

    #[error("line {line}: variable ${name} is not defined")]
    UndefinedVariable { line: usize, name: String },

    #[error("line {line}: keyword {name:?} is not defined")]
    UnknownKeyword { line: usize, name: String },

    #[error("line {line}: no keyword library named {name:?}")]
    UnknownLibrary { line: usize, name: String },

    #[error("line {line}: import expects exactly one library name, got {got}")]
    MalformedImport { line: usize, got: usize },
}

impl ParseError {
    /// Line the error refers to
    pub fn line(&self) -> usize {
        match self {
            Self::UnterminatedQuote { line }
            | Self::MalformedAsBinding { line, .. }
            | Self::UndefinedVariable { line, .. }
            | Self::UnknownKeyword { line, .. }
            | Self::UnknownLibrary { line, .. }
            | Self::MalformedImport { line, .. } => *line,
        }
    }
}

/// Failures raised by a keyword invocation
#[derive(Debug, Error)]
pub enum KeywordError {
    #[error("check failed: expected {expected:?}, got {actual:?}")]
    CheckFailed { expected: String, actual: String },

    #[error("{keyword} expects {expected} argument(s), got {got}")]
    Arity {
        keyword: String,
        expected: String,
        got: usize,
    },

    #[error("{keyword}: {message}")]
    InvalidArgument { keyword: String, message: String },

    #[error("variable ${0} is not defined")]
    UndefinedVariable(String),

    #[error("${name} ({kind}) has no attribute {attr:?}")]
    MissingAttribute {
        name: String,
        attr: String,
        kind: &'static str,
    },

    #[error("{0} is not a callable keyword")]
    NotCallable(String),

    #[error("no device session attached to device {0}")]
    NoSession(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Argument(#[from] ArgError),

    #[error("keyword {keyword} panicked: {message}")]
    Panicked { keyword: String, message: String },

    #[error("{0}")]
    Failed(String),
}

impl KeywordError {
    /// Free-form failure from a user keyword
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid(keyword: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            keyword: keyword.to_string(),
            message: message.into(),
        }
    }

    /// Fail unless `got` equals `expected`.
    pub fn check_exact(keyword: &str, expected: usize, got: usize) -> Result<(), Self> {
        if got == expected {
            return Ok(());
        }
        Err(Self::Arity {
            keyword: keyword.to_string(),
            expected: expected.to_string(),
            got,
        })
    }

    /// Fail unless `got` is at least `min`.
    pub fn check_min(keyword: &str, min: usize, got: usize) -> Result<(), Self> {
        if got >= min {
            return Ok(());
        }
        Err(Self::Arity {
            keyword: keyword.to_string(),
            expected: format!("at least {}", min),
            got,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_line() {
        let err = ParseError::UnterminatedQuote { line: 7 };
        assert_eq!(err.line(), 7);
        assert_eq!(err.to_string(), "line 7: missing closing quote");

        let err = ParseError::UndefinedVariable {
            line: 2,
            name: "v".into(),
        };
        assert_eq!(err.line(), 2);
        assert_eq!(err.to_string(), "line 2: variable $v is not defined");
    }

    #[test]
    fn test_arity_helpers() {
        assert!(KeywordError::check_exact("check", 2, 2).is_ok());
        let err = KeywordError::check_exact("check", 2, 1).unwrap_err();
        assert_eq!(err.to_string(), "check expects 2 argument(s), got 1");

        let err = KeywordError::check_min("call", 2, 0).unwrap_err();
        assert_eq!(err.to_string(), "call expects at least 2 argument(s), got 0");
    }
}
