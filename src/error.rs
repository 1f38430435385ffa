//! Error kinds shared across the engine.
//!
//! Lex and parse errors carry the position they occurred at. Everything the
//! parser accepts but the executor cannot handle surfaces as `Unsupported`
//! rather than a panic, so a rule file never takes the process down.

use thiserror::Error;

use crate::rule::lexer::Pos;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad character or unterminated literal in rule text.
    #[error("lex error at {pos}: {message}")]
    Lex { pos: Pos, message: String },

    /// Unexpected token while parsing rule text.
    #[error("parse error at {pos}: {message}")]
    Parse { pos: Pos, message: String },

    /// Target source or an inserted snippet failed to parse.
    #[error("target parse error: {0}")]
    TargetParse(String),

    /// An action or predicate referenced a name no matcher introduced.
    #[error("binding ${0} not found")]
    BindingNotFound(String),

    /// A binding had the wrong shape for the operation applied to it.
    #[error("{0}")]
    TypeMismatch(String),

    /// A construct the grammar accepts but the executor does not implement.
    #[error("{0} not supported")]
    Unsupported(&'static str),
}

impl Error {
    pub fn lex(pos: Pos, message: impl Into<String>) -> Self {
        Error::Lex {
            pos,
            message: message.into(),
        }
    }

    pub fn parse(pos: Pos, message: impl Into<String>) -> Self {
        Error::Parse {
            pos,
            message: message.into(),
        }
    }
}
