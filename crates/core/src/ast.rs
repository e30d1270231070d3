use serde::Serialize;
use std::fmt;

/// Parsed boolean tag expression.
///
/// Tag leaves hold normalized names. `MatchAll` is only produced for an
/// empty query and only ever appears as the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Expr {
    MatchAll,
    Tag(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn tag(name: impl Into<String>) -> Self {
        Expr::Tag(name.into())
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Not(Box::new(operand))
    }

    /// Distinct tag names referenced by the expression, in first-seen order.
    pub fn tags(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tags(&mut out);
        out
    }

    fn collect_tags<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::MatchAll => {}
            Expr::Tag(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_tags(out);
                r.collect_tags(out);
            }
            Expr::Not(x) => x.collect_tags(out),
        }
    }
}

/// Renders a fully parenthesized query that parses back to the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::MatchAll => Ok(()),
            Expr::Tag(name) => {
                let bare = !name.is_empty()
                    && !name.starts_with('-')
                    && !name
                        .chars()
                        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"'))
                    && !["and", "or", "not"].contains(&name.as_str());
                if bare {
                    f.write_str(name)
                } else {
                    write!(f, "\"{name}\"")
                }
            }
            Expr::And(l, r) => write!(f, "({l} AND {r})"),
            Expr::Or(l, r) => write!(f, "({l} OR {r})"),
            Expr::Not(x) => write!(f, "NOT {x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_when_needed() {
        let expr = Expr::and(Expr::tag("night time"), Expr::not(Expr::tag("or")));
        assert_eq!(expr.to_string(), r#"("night time" AND NOT "or")"#);
        assert_eq!(Expr::tag("-x").to_string(), r#""-x""#);
        assert_eq!(Expr::MatchAll.to_string(), "");
    }

    #[test]
    fn tags_are_deduplicated_in_order() {
        let expr = Expr::or(
            Expr::and(Expr::tag("b"), Expr::tag("a")),
            Expr::not(Expr::tag("b")),
        );
        assert_eq!(expr.tags(), vec!["b", "a"]);
    }

    #[test]
    fn serializes_as_tagged_tree() {
        let expr = Expr::and(Expr::tag("cat"), Expr::not(Expr::tag("dog")));
        let value = serde_json::to_value(&expr).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "op": "and",
                "args": [
                    { "op": "tag", "args": "cat" },
                    { "op": "not", "args": { "op": "tag", "args": "dog" } }
                ]
            })
        );
        assert_eq!(
            serde_json::to_value(Expr::MatchAll).unwrap(),
            serde_json::json!({ "op": "match_all" })
        );
    }
}
