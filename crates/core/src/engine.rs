//! Entry points used by the search bar.
//!
//! Parsing is cheap and runs inline. Everything that touches the index runs
//! on tokio's blocking pool against the snapshot current at call time, so
//! the calling thread only ever awaits.

use crate::ast::Expr;
use crate::config::AppConfig;
use crate::error::QueryError;
use crate::evaluator::evaluate;
use crate::index::{IndexSnapshot, ScopeProvider, SharedIndex};
use crate::models::{normalize_tag, ItemId, ItemSet, TagAssignment, TagId};
use crate::parser;
use crate::similarity::{self, DuplicatePair, Scored};
use crate::suggester::{self, Suggestion};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct QueryEngine {
    index: Arc<SharedIndex>,
    scope: Option<Arc<dyn ScopeProvider>>,
    config: AppConfig,
}

impl QueryEngine {
    /// Scope defaults to the active directories recorded in the snapshot.
    pub fn new(index: Arc<SharedIndex>, config: AppConfig) -> Self {
        Self {
            index,
            scope: None,
            config,
        }
    }

    /// Use an external provider for the active scope instead of the snapshot.
    pub fn with_scope_provider(mut self, scope: Arc<dyn ScopeProvider>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    pub fn parse(&self, query: &str) -> Result<Expr, QueryError> {
        parser::parse(query)
    }

    /// Items of the active scope matching `query`.
    pub async fn search(&self, query: &str) -> Result<ItemSet, QueryError> {
        let expr = self.parse(query)?;
        let started = Instant::now();
        let result = self
            .run(move |snap, scope| Ok(evaluate(&expr, snap, &scope)?))
            .await;
        if let Ok(items) = &result {
            debug!(query, matched = items.len(), elapsed = ?started.elapsed(), "search evaluated");
        }
        result
    }

    pub async fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<Suggestion>, QueryError> {
        let prefix = prefix.to_string();
        self.run(move |snap, scope| Ok(suggester::suggest(snap, &scope, &prefix, limit)?))
            .await
    }

    pub async fn find_similar(&self, item: ItemId, limit: usize) -> Result<Vec<Scored>, QueryError> {
        self.run(move |snap, scope| Ok(similarity::similar(snap, item, &scope, limit)?))
            .await
    }

    /// Like [`find_similar`](Self::find_similar), ranking only the results of `query`.
    pub async fn find_similar_within(
        &self,
        item: ItemId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Scored>, QueryError> {
        let expr = self.parse(query)?;
        self.run(move |snap, scope| {
            let base = evaluate(&expr, snap, &scope)?;
            Ok(similarity::similar(snap, item, &base, limit)?)
        })
        .await
    }

    /// Rank the active scope against a tag set, e.g. one produced for an image
    /// that is not in the index.
    ///
    /// Names are matched case-insensitively. A name listed twice keeps its
    /// highest confidence; blank names are ignored.
    pub async fn find_similar_to_tags(
        &self,
        tags: &[TagAssignment],
        limit: usize,
    ) -> Result<Vec<Scored>, QueryError> {
        let mut wanted: HashMap<String, f32> = HashMap::new();
        for t in tags {
            let name = normalize_tag(&t.name);
            if name.is_empty() {
                continue;
            }
            let confidence = if t.confidence.is_nan() {
                0.0
            } else {
                t.confidence.clamp(0.0, 1.0)
            };
            let slot = wanted.entry(name).or_insert(confidence);
            *slot = slot.max(confidence);
        }
        self.run(move |snap, scope| {
            Ok(similarity::similar_to_tags(
                snap,
                &resolve_tags(snap, wanted),
                &scope,
                limit,
            )?)
        })
        .await
    }

    /// Near-identical pairs in the active scope. `None` uses the configured threshold.
    pub async fn find_duplicates(&self, threshold: Option<f64>) -> Result<Vec<DuplicatePair>, QueryError> {
        let threshold = threshold.unwrap_or(self.config.similarity.duplicate_threshold);
        let pairs = self
            .run(move |snap, scope| Ok(similarity::find_duplicates(snap, &scope, threshold)?))
            .await?;
        debug!(threshold, pairs = pairs.len(), "duplicate scan finished");
        Ok(pairs)
    }

    async fn run<T, F>(&self, work: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&IndexSnapshot, ItemSet) -> Result<T, QueryError> + Send + 'static,
    {
        let snap = self.index.snapshot()?;
        let provider = self.scope.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let scope = match provider {
                Some(p) => p.active_item_scope()?,
                None => snap.active_item_scope()?,
            };
            work(snap.as_ref(), scope)
        })
        .await?;
        if let Err(err) = &outcome {
            if !err.is_syntax() {
                warn!(error = %err, "query failed");
            }
        }
        outcome
    }
}

/// Map tag names to ids. Names the index does not know still count toward
/// the union in the score, so they get negative ids no stored tag uses.
fn resolve_tags(snap: &IndexSnapshot, wanted: HashMap<String, f32>) -> HashMap<TagId, f32> {
    let mut next_unknown: TagId = -1;
    let mut names: Vec<(String, f32)> = wanted.into_iter().collect();
    names.sort_by(|a, b| a.0.cmp(&b.0));
    names
        .into_iter()
        .map(|(name, confidence)| match snap.tag_by_name(&name) {
            Some(tag) => (tag.id, confidence),
            None => {
                let id = next_unknown;
                next_unknown -= 1;
                (id, confidence)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::models::TagCategory;

    fn engine() -> QueryEngine {
        let snap = IndexSnapshot::builder()
            .directory(1, "/on", true)
            .directory(2, "/off", false)
            .item(1, 1, "/on/1.png")
            .item(2, 1, "/on/2.png")
            .item(3, 1, "/on/3.png")
            .item(4, 2, "/off/4.png")
            .tag(1, "cat", TagCategory::General)
            .tag(2, "dog", TagCategory::General)
            .item_tag(1, 1, 0.9)
            .item_tag(2, 1, 0.8)
            .item_tag(2, 2, 0.8)
            .item_tag(4, 1, 0.9)
            .build();
        QueryEngine::new(Arc::new(SharedIndex::new(snap)), AppConfig::default())
    }

    struct FailingScope;

    impl ScopeProvider for FailingScope {
        fn active_item_scope(&self) -> Result<ItemSet, IndexError> {
            Err(IndexError::Unavailable("store offline".into()))
        }
    }

    struct FixedScope(ItemSet);

    impl ScopeProvider for FixedScope {
        fn active_item_scope(&self) -> Result<ItemSet, IndexError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn search_uses_active_scope() {
        let engine = engine();
        assert_eq!(engine.search("").await.unwrap(), ItemSet::from([1, 2, 3]));
        assert_eq!(engine.search("cat").await.unwrap(), ItemSet::from([1, 2]));
        assert_eq!(engine.search("NOT cat").await.unwrap(), ItemSet::from([3]));
    }

    #[tokio::test]
    async fn syntax_errors_surface_before_evaluation() {
        let engine = engine();
        let err = engine.search("(cat").await.unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
        assert!(err.is_syntax());
    }

    #[tokio::test]
    async fn index_errors_do_not_poison_the_engine() {
        let engine = engine().with_scope_provider(Arc::new(FailingScope));
        let err = engine.search("cat").await.unwrap_err();
        assert!(matches!(err, QueryError::Index(IndexError::Unavailable(_))));
        assert!(!err.is_syntax());
        assert!(engine.parse("cat dog").is_ok());
        assert!(matches!(engine.search("dog").await, Err(QueryError::Index(_))));
    }

    #[tokio::test]
    async fn external_scope_provider_is_consulted() {
        let engine = engine().with_scope_provider(Arc::new(FixedScope(ItemSet::from([2, 4]))));
        assert_eq!(engine.search("cat").await.unwrap(), ItemSet::from([2, 4]));
    }

    #[tokio::test]
    async fn similar_within_query_restricts_candidates() {
        let engine = engine();
        let all: Vec<ItemId> = engine
            .find_similar(1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.item)
            .collect();
        assert_eq!(all, vec![2, 3]);
        let within = engine.find_similar_within(1, "NOT dog", 10).await.unwrap();
        assert_eq!(within.len(), 1);
        assert_eq!(within[0].item, 3);
        assert_eq!(within[0].score, 0.0);
    }

    #[tokio::test]
    async fn duplicates_use_configured_threshold() {
        let engine = engine();
        // 1 vs 2: min(0.9, 0.8) / 2 = 0.4
        assert!(engine.find_duplicates(None).await.unwrap().is_empty());
        let pairs = engine.find_duplicates(Some(0.3)).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].first, pairs[0].second), (1, 2));
    }

    #[tokio::test]
    async fn new_snapshot_is_seen_by_later_queries() {
        let engine = engine();
        assert_eq!(engine.suggest("c", 5).await.unwrap()[0].count, 2);
        engine.index().replace(IndexSnapshot::default()).unwrap();
        assert!(engine.suggest("c", 5).await.unwrap().is_empty());
        assert!(engine.search("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn similar_to_tags_resolves_names() {
        let engine = engine();
        let assign = |name: &str, confidence: f32| TagAssignment {
            name: name.to_string(),
            category: TagCategory::General,
            confidence,
        };
        let result = engine
            .find_similar_to_tags(&[assign("CAT", 0.9), assign("cat", 0.5)], 10)
            .await
            .unwrap();
        let ids: Vec<ItemId> = result.iter().map(|s| s.item).collect();
        // 1: 0.9 / 1, 2: 0.8 / 2, 3 shares nothing.
        assert_eq!(ids, vec![1, 2, 3]);
        assert!((result[0].score - 0.9).abs() < 1e-6);
        assert!((result[1].score - 0.4).abs() < 1e-6);

        // An unknown name widens the union without matching anything.
        let widened = engine
            .find_similar_to_tags(&[assign("cat", 0.9), assign("zebra", 1.0)], 1)
            .await
            .unwrap();
        assert_eq!(widened[0].item, 1);
        assert!((widened[0].score - 0.45).abs() < 1e-6);
    }
}
