//! Wiring shared by every subcommand: database, store, snapshot and engine.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tagscope_core::config::AppConfig;
use tagscope_core::index::SharedIndex;
use tagscope_core::models::{ItemId, ItemSet};
use tagscope_core::similarity::Scored;
use tagscope_core::store::TagStore;
use tagscope_core::QueryEngine;

pub struct Session {
    pub store: TagStore,
    pub engine: QueryEngine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemHit {
    pub id: ItemId,
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Session {
    pub async fn open(cfg: AppConfig) -> Result<Self> {
        let pool = storage::connect(&cfg.database.path).await?;
        Self::from_pool(pool, cfg).await
    }

    pub async fn from_pool(pool: SqlitePool, cfg: AppConfig) -> Result<Self> {
        storage::migrate(&pool).await?;
        let store = TagStore::new(pool);
        let index = Arc::new(SharedIndex::default());
        index.refresh(&store).await?;
        Ok(Self {
            store,
            engine: QueryEngine::new(index, cfg),
        })
    }

    /// Reload the snapshot after writing through `store`.
    pub async fn refresh(&self) -> Result<()> {
        self.engine.index().refresh(&self.store).await?;
        Ok(())
    }

    /// Query results with their paths, ordered by id.
    pub fn hits(&self, items: &ItemSet) -> Result<Vec<ItemHit>> {
        let snap = self.engine.index().snapshot()?;
        let mut ids: Vec<ItemId> = items.iter().copied().collect();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .map(|id| ItemHit {
                id,
                path: snap.item(id).map(|i| i.path.clone()),
                score: None,
            })
            .collect())
    }

    pub fn scored_hits(&self, scored: &[Scored]) -> Result<Vec<ItemHit>> {
        let snap = self.engine.index().snapshot()?;
        Ok(scored
            .iter()
            .map(|s| ItemHit {
                id: s.item,
                path: snap.item(s.item).map(|i| i.path.clone()),
                score: Some(s.score),
            })
            .collect())
    }
}
