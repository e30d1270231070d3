//! Recursive-descent parser for tag queries.
//!
//! Precedence, lowest first: `OR`, `AND` (explicit or by juxtaposition),
//! `NOT`, then atoms (a tag or a parenthesized expression). Binary
//! connectives associate to the left. `-tag` comes out of the tokenizer as
//! `NOT tag` and therefore binds like any other atom: `a -b c` is
//! `(a AND NOT b) AND c`.

use crate::ast::Expr;
use crate::error::{ParseError, QueryError};
use crate::models::normalize_tag;
use crate::tokenizer::{tokenize, Spanned, Token};

/// Tokenize and parse `query`. An empty query yields [`Expr::MatchAll`].
pub fn parse(query: &str) -> Result<Expr, QueryError> {
    let tokens = tokenize(query)?;
    Ok(parse_tokens(&tokens)?)
}

/// Parentheses and `NOT`s open at once.
const MAX_NESTING: usize = 256;
/// Height of the finished tree; long flat chains count too.
const MAX_TREE_DEPTH: usize = 1024;

/// Parse an already tokenized query. `tokens` must end with [`Token::Eof`].
///
/// Queries nested deeper than the parser accepts fail with
/// [`ParseError::TooDeep`] instead of exhausting the stack.
pub fn parse_tokens(tokens: &[Spanned]) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    if parser.peek() == &Token::Eof {
        return Ok(Expr::MatchAll);
    }
    let (expr, _) = parser.or_expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        _ => Err(parser.unexpected("end of query")),
    }
}

/// A subtree and its height.
type Node = (Expr, usize);

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &'a Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some(s) => s.offset,
            None => self.tokens.last().map(|s| s.offset).unwrap_or(0),
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Token::Eof => ParseError::UnexpectedEnd {
                expected: expected.to_string(),
                position: self.offset(),
            },
            found => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
                position: self.offset(),
            },
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(ParseError::TooDeep {
                position: self.offset(),
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn grow(&self, height: usize) -> Result<usize, ParseError> {
        if height > MAX_TREE_DEPTH {
            return Err(ParseError::TooDeep {
                position: self.offset(),
            });
        }
        Ok(height)
    }

    fn or_expr(&mut self) -> Result<Node, ParseError> {
        let (mut node, mut height) = self.and_expr()?;
        while self.peek() == &Token::Or {
            self.advance();
            let (right, right_height) = self.and_expr()?;
            height = self.grow(height.max(right_height) + 1)?;
            node = Expr::or(node, right);
        }
        Ok((node, height))
    }

    fn and_expr(&mut self) -> Result<Node, ParseError> {
        let (mut node, mut height) = self.not_expr()?;
        loop {
            match self.peek() {
                Token::And => self.advance(),
                // Juxtaposition is an implicit AND.
                Token::Tag(_) | Token::Not | Token::LParen => {}
                _ => break,
            }
            let (right, right_height) = self.not_expr()?;
            height = self.grow(height.max(right_height) + 1)?;
            node = Expr::and(node, right);
        }
        Ok((node, height))
    }

    fn not_expr(&mut self) -> Result<Node, ParseError> {
        if self.peek() == &Token::Not {
            self.enter()?;
            self.advance();
            let (operand, height) = self.not_expr()?;
            self.leave();
            let height = self.grow(height + 1)?;
            return Ok((Expr::not(operand), height));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Node, ParseError> {
        match self.peek() {
            Token::Tag(text) => {
                let name = normalize_tag(text);
                if name.is_empty() {
                    return Err(ParseError::EmptyTag {
                        position: self.offset(),
                    });
                }
                self.advance();
                Ok((Expr::Tag(name), 1))
            }
            Token::LParen => {
                self.enter()?;
                self.advance();
                let inner = self.or_expr()?;
                if self.peek() != &Token::RParen {
                    return Err(self.unexpected("')'"));
                }
                self.advance();
                self.leave();
                Ok(inner)
            }
            _ => Err(self.unexpected("tag, NOT or '('")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LexError;

    fn t(name: &str) -> Expr {
        Expr::tag(name)
    }

    fn parse_err(query: &str) -> ParseError {
        match parse(query) {
            Err(QueryError::Parse(err)) => err,
            other => panic!("expected parse error for {query:?}, got {other:?}"),
        }
    }

    #[test]
    fn empty_query_matches_all() {
        assert_eq!(parse("").unwrap(), Expr::MatchAll);
        assert_eq!(parse("   ").unwrap(), Expr::MatchAll);
    }

    #[test]
    fn tags_are_normalized() {
        assert_eq!(parse("Cat").unwrap(), t("cat"));
        assert_eq!(parse(r#"" Night Time ""#).unwrap(), t("night time"));
    }

    #[test]
    fn implicit_and_matches_explicit_and() {
        assert_eq!(parse("cat dog").unwrap(), parse("cat AND dog").unwrap());
        assert_eq!(parse("cat dog").unwrap(), Expr::and(t("cat"), t("dog")));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            parse("a OR b c").unwrap(),
            Expr::or(t("a"), Expr::and(t("b"), t("c")))
        );
        assert_eq!(
            parse("a b OR c").unwrap(),
            Expr::or(Expr::and(t("a"), t("b")), t("c"))
        );
    }

    #[test]
    fn not_binds_tightest() {
        assert_eq!(
            parse("NOT a b").unwrap(),
            Expr::and(Expr::not(t("a")), t("b"))
        );
        assert_eq!(
            parse("NOT NOT a").unwrap(),
            Expr::not(Expr::not(t("a")))
        );
    }

    #[test]
    fn connectives_associate_left() {
        assert_eq!(
            parse("a OR b OR c").unwrap(),
            Expr::or(Expr::or(t("a"), t("b")), t("c"))
        );
    }

    #[test]
    fn parentheses_group() {
        assert_eq!(
            parse(r#"cat AND (outdoor OR "night time") NOT blurry"#).unwrap(),
            Expr::and(
                Expr::and(t("cat"), Expr::or(t("outdoor"), t("night time"))),
                Expr::not(t("blurry"))
            )
        );
    }

    #[test]
    fn dash_tag_is_an_atomic_not_leaf() {
        assert_eq!(parse("-blurry").unwrap(), parse("NOT blurry").unwrap());
        assert_eq!(
            parse("a -b c").unwrap(),
            Expr::and(Expr::and(t("a"), Expr::not(t("b"))), t("c"))
        );
        assert_eq!(
            parse("a OR -b").unwrap(),
            Expr::or(t("a"), Expr::not(t("b")))
        );
    }

    #[test]
    fn unclosed_paren_is_an_error() {
        assert_eq!(
            parse_err("(a AND b"),
            ParseError::UnexpectedEnd {
                expected: "')'".to_string(),
                position: 8
            }
        );
    }

    #[test]
    fn stray_close_paren_names_found_token() {
        assert_eq!(
            parse_err("a b)"),
            ParseError::UnexpectedToken {
                expected: "end of query".to_string(),
                found: "')'".to_string(),
                position: 3
            }
        );
        assert_eq!(
            parse_err("()"),
            ParseError::UnexpectedToken {
                expected: "tag, NOT or '('".to_string(),
                found: "')'".to_string(),
                position: 1
            }
        );
    }

    #[test]
    fn dangling_operators_are_unexpected_end() {
        for query in ["cat AND", "cat OR", "NOT", "cat NOT", "(cat OR"] {
            assert!(
                matches!(parse_err(query), ParseError::UnexpectedEnd { .. }),
                "{query}"
            );
        }
    }

    #[test]
    fn leading_binary_operator_is_rejected() {
        assert!(matches!(
            parse_err("AND cat"),
            ParseError::UnexpectedToken { position: 0, .. }
        ));
        assert!(matches!(
            parse_err("cat OR OR dog"),
            ParseError::UnexpectedToken { position: 7, .. }
        ));
    }

    #[test]
    fn empty_quoted_tag_is_rejected() {
        assert_eq!(
            parse_err(r#"cat "  ""#),
            ParseError::EmptyTag { position: 4 }
        );
    }

    #[test]
    fn lex_errors_pass_through() {
        assert!(matches!(
            parse(r#"cat "dog"#),
            Err(QueryError::Lex(LexError::UnterminatedQuote { offset: 4 }))
        ));
    }

    #[test]
    fn parse_is_deterministic_and_display_round_trips() {
        for query in [
            "cat",
            "a b c",
            "a OR (b -c)",
            r#"NOT ("night time" OR x) y"#,
            r#""and" or "-x""#,
        ] {
            let first = parse(query).unwrap();
            assert_eq!(first, parse(query).unwrap());
            assert_eq!(parse(&first.to_string()).unwrap(), first, "{query}");
        }
    }

    #[test]
    fn deep_nesting_is_rejected_without_overflowing() {
        let parens = format!("{}a{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(parse_err(&parens), ParseError::TooDeep { position: 256 }));

        let nots = format!("{}a", "NOT ".repeat(100_000));
        assert!(matches!(parse_err(&nots), ParseError::TooDeep { .. }));

        let mixed = format!("{}a", "NOT (".repeat(50_000));
        assert!(matches!(parse_err(&mixed), ParseError::TooDeep { .. }));
    }

    #[test]
    fn long_flat_chains_are_bounded() {
        let tags: Vec<String> = (0..100_000).map(|i| format!("t{i}")).collect();
        assert!(matches!(parse_err(&tags.join(" ")), ParseError::TooDeep { .. }));
        assert!(matches!(
            parse_err(&tags.join(" OR ")),
            ParseError::TooDeep { .. }
        ));
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let query = format!("{}a{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&query).unwrap(), t("a"));
        let nots = format!("{}a", "NOT ".repeat(200));
        assert!(parse(&nots).is_ok());
        let chain: Vec<String> = (0..500).map(|i| format!("t{i}")).collect();
        assert!(parse(&chain.join(" ")).is_ok());
    }
}
