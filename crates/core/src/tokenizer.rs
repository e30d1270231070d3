//! Splits a raw query string into tokens.
//!
//! Offsets are character offsets into the original query, so they can be
//! shown to the user directly under the text they typed.

use crate::error::LexError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Tag(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Tag(text) => write!(f, "tag {text:?}"),
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Not => f.write_str("NOT"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Eof => f.write_str("end of query"),
        }
    }
}

/// A token together with the character offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

impl Spanned {
    fn new(token: Token, offset: usize) -> Self {
        Self { token, offset }
    }
}

/// Tokenize `query`. The returned sequence always ends with [`Token::Eof`].
pub fn tokenize(query: &str) -> Result<Vec<Spanned>, LexError> {
    let chars: Vec<char> = query.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Spanned::new(Token::LParen, pos));
                pos += 1;
            }
            ')' => {
                tokens.push(Spanned::new(Token::RParen, pos));
                pos += 1;
            }
            '"' => {
                let (text, next) = read_quoted(&chars, pos)?;
                tokens.push(Spanned::new(Token::Tag(text), pos));
                pos = next;
            }
            '-' if starts_tag(chars.get(pos + 1)) => {
                // `-tag` is shorthand for `NOT tag`; the operand is always a tag.
                tokens.push(Spanned::new(Token::Not, pos));
                let start = pos + 1;
                let (text, next) = if chars[start] == '"' {
                    read_quoted(&chars, start)?
                } else {
                    read_word(&chars, start)
                };
                tokens.push(Spanned::new(Token::Tag(text), start));
                pos = next;
            }
            _ => {
                let (word, next) = read_word(&chars, pos);
                tokens.push(Spanned::new(keyword_or_tag(word), pos));
                pos = next;
            }
        }
    }

    tokens.push(Spanned::new(Token::Eof, chars.len()));
    Ok(tokens)
}

fn starts_tag(next: Option<&char>) -> bool {
    match next {
        Some(c) => !c.is_whitespace() && *c != '(' && *c != ')',
        None => false,
    }
}

fn is_word_end(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')' || c == '"'
}

/// Reads a bare word starting at `start`. Returns the word and the offset after it.
fn read_word(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && !is_word_end(chars[end]) {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Reads a quoted tag whose opening quote sits at `open`.
fn read_quoted(chars: &[char], open: usize) -> Result<(String, usize), LexError> {
    let body = open + 1;
    match chars[body..].iter().position(|&c| c == '"') {
        Some(len) => Ok((chars[body..body + len].iter().collect(), body + len + 1)),
        None => Err(LexError::UnterminatedQuote { offset: open }),
    }
}

fn keyword_or_tag(word: String) -> Token {
    if word.eq_ignore_ascii_case("and") {
        Token::And
    } else if word.eq_ignore_ascii_case("or") {
        Token::Or
    } else if word.eq_ignore_ascii_case("not") {
        Token::Not
    } else {
        Token::Tag(word)
    }
}
