//! Resolves an expression tree to the set of matching items.
//!
//! All results are subsets of `scope`. Negation is taken relative to the
//! scope, never to every item in the index, so items of inactive
//! directories cannot leak into `NOT` results.

use crate::ast::Expr;
use crate::error::IndexError;
use crate::index::TagIndex;
use crate::models::ItemSet;

pub fn evaluate(expr: &Expr, index: &dyn TagIndex, scope: &ItemSet) -> Result<ItemSet, IndexError> {
    match expr {
        Expr::MatchAll => Ok(scope.clone()),
        Expr::Tag(name) => {
            let mut items = index.tag_item_set(name)?;
            items.retain(|item| scope.contains(item));
            Ok(items)
        }
        Expr::And(left, right) => {
            let left = evaluate(left, index, scope)?;
            if left.is_empty() {
                return Ok(left);
            }
            let right = evaluate(right, index, scope)?;
            Ok(left.intersection(&right).copied().collect())
        }
        Expr::Or(left, right) => {
            let mut left = evaluate(left, index, scope)?;
            if left.len() == scope.len() {
                return Ok(left);
            }
            left.extend(evaluate(right, index, scope)?);
            Ok(left)
        }
        Expr::Not(operand) => {
            let excluded = evaluate(operand, index, scope)?;
            Ok(scope.difference(&excluded).copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexSnapshot, ScopeProvider};
    use crate::models::TagCategory;
    use crate::parser::parse;

    // Items 1..=6 live in the active directory, 7..=8 in an inactive one.
    fn fixture() -> IndexSnapshot {
        let mut b = IndexSnapshot::builder()
            .directory(1, "/active", true)
            .directory(2, "/inactive", false);
        for id in 1..=6 {
            b = b.item(id, 1, format!("/active/{id}.png"));
        }
        for id in 7..=8 {
            b = b.item(id, 2, format!("/inactive/{id}.png"));
        }
        b.tag(1, "cat", TagCategory::General)
            .tag(2, "outdoor", TagCategory::General)
            .tag(3, "night time", TagCategory::General)
            .tag(4, "blurry", TagCategory::General)
            .item_tag(1, 1, 0.9)
            .item_tag(2, 1, 0.9)
            .item_tag(3, 1, 0.9)
            .item_tag(7, 1, 0.9)
            .item_tag(1, 2, 0.8)
            .item_tag(4, 2, 0.8)
            .item_tag(2, 3, 0.7)
            .item_tag(3, 4, 0.5)
            .item_tag(8, 4, 0.5)
            .build()
    }

    fn search(snap: &IndexSnapshot, query: &str) -> ItemSet {
        let scope = snap.active_item_scope().unwrap();
        evaluate(&parse(query).unwrap(), snap, &scope).unwrap()
    }

    #[test]
    fn empty_query_is_scope() {
        let snap = fixture();
        assert_eq!(search(&snap, ""), snap.active_item_scope().unwrap());
    }

    #[test]
    fn tag_results_are_limited_to_scope() {
        let snap = fixture();
        assert_eq!(search(&snap, "cat"), ItemSet::from([1, 2, 3]));
        assert_eq!(search(&snap, "CAT"), ItemSet::from([1, 2, 3]));
    }

    #[test]
    fn unknown_tag_matches_nothing() {
        let snap = fixture();
        assert!(search(&snap, "zzz_never_used").is_empty());
    }

    #[test]
    fn combined_query() {
        let snap = fixture();
        assert_eq!(
            search(&snap, r#"cat AND (outdoor OR "night time") NOT blurry"#),
            ItemSet::from([1, 2])
        );
    }

    #[test]
    fn implicit_and_is_and() {
        let snap = fixture();
        assert_eq!(search(&snap, "cat outdoor"), search(&snap, "cat AND outdoor"));
        assert_eq!(search(&snap, "cat outdoor"), ItemSet::from([1]));
    }

    #[test]
    fn tag_and_its_negation_partition_scope() {
        let snap = fixture();
        let scope = snap.active_item_scope().unwrap();
        for tag in ["cat", "outdoor", "\"night time\"", "blurry", "unknown"] {
            let yes = search(&snap, tag);
            let no = search(&snap, &format!("NOT {tag}"));
            assert!(yes.is_disjoint(&no), "{tag}");
            assert_eq!(yes.union(&no).copied().collect::<ItemSet>(), scope, "{tag}");
        }
    }

    #[test]
    fn negation_never_includes_inactive_items() {
        let snap = fixture();
        let result = search(&snap, "NOT blurry");
        assert_eq!(result, ItemSet::from([1, 2, 4, 5, 6]));
        assert!(!result.contains(&8));
    }

    #[test]
    fn de_morgan_holds() {
        let snap = fixture();
        let pairs = [("cat", "outdoor"), ("blurry", "cat"), ("unknown", "outdoor")];
        for (a, b) in pairs {
            assert_eq!(
                search(&snap, &format!("NOT ({a} OR {b})")),
                search(&snap, &format!("NOT {a} AND NOT {b}"))
            );
            assert_eq!(
                search(&snap, &format!("NOT ({a} AND {b})")),
                search(&snap, &format!("NOT {a} OR NOT {b}"))
            );
        }
    }

    #[test]
    fn dash_shorthand_matches_not() {
        let snap = fixture();
        assert_eq!(search(&snap, "cat -blurry"), search(&snap, "cat NOT blurry"));
    }

    #[test]
    fn short_circuits_do_not_change_results() {
        let snap = fixture();
        // Left side empty / left side already the whole scope.
        assert!(search(&snap, "unknown cat").is_empty());
        assert_eq!(search(&snap, "NOT unknown OR cat"), snap.active_item_scope().unwrap());
    }

    #[test]
    fn empty_scope_yields_empty_results() {
        let snap = fixture();
        let expr = parse("NOT cat OR cat").unwrap();
        assert!(evaluate(&expr, &snap, &ItemSet::new()).unwrap().is_empty());
    }
}
