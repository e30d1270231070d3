//! Core library: tag query parsing, evaluation, suggestions and similarity.

pub mod ast;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod index;
pub mod models;
pub mod parser;
pub mod similarity;
pub mod store;
pub mod suggester;
pub mod tokenizer;

pub use ast::Expr;
pub use engine::QueryEngine;
pub use error::{IndexError, LexError, ParseError, QueryError};
pub use parser::parse;
