//! Error taxonomy for query parsing, evaluation and index access.

use thiserror::Error;

/// Lexical failure while splitting a query into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated quoted tag starting at offset {offset}")]
    UnterminatedQuote { offset: usize },
}

/// Syntax failure while building the expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {expected} but found {found} at position {position}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },
    #[error("unexpected end of query at position {position}, expected {expected}")]
    UnexpectedEnd { expected: String, position: usize },
    #[error("empty tag at position {position}")]
    EmptyTag { position: usize },
    #[error("query nested too deeply at position {position}")]
    TooDeep { position: usize },
}

/// The tag index could not be read. Fatal to the current call only.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("index lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("syntax error: {0}")]
    Lex(#[from] LexError),
    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("query task failed: {0}")]
    Task(String),
}

impl QueryError {
    /// Lex and parse errors are a pure function of the input; retrying is pointless.
    pub fn is_syntax(&self) -> bool {
        matches!(self, QueryError::Lex(_) | QueryError::Parse(_))
    }
}

impl From<tokio::task::JoinError> for QueryError {
    fn from(err: tokio::task::JoinError) -> Self {
        QueryError::Task(err.to_string())
    }
}
