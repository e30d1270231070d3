//! Read-side view of the tag index.
//!
//! The engine only ever reads through [`TagIndex`] and [`ScopeProvider`].
//! [`IndexSnapshot`] is an immutable in-memory copy of the index; the
//! [`SharedIndex`] cell lets the index owner publish a new snapshot while
//! queries keep reading the one they started with.

use crate::error::IndexError;
use crate::models::{
    normalize_tag, Directory, DirectoryId, Item, ItemId, ItemSet, Tag, TagCategory, TagId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Number of in-scope items carrying a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    pub name: String,
    pub count: usize,
}

pub trait TagIndex: Send + Sync {
    /// Items carrying the tag with this normalized name. Unknown tags yield an empty set.
    fn tag_item_set(&self, normalized_name: &str) -> Result<ItemSet, IndexError>;

    /// Items carrying the tag with this id.
    fn tag_members(&self, tag: TagId) -> Result<ItemSet, IndexError>;

    /// Usage counts of every tag carried by at least one item of `scope`.
    fn tag_usage_counts(&self, scope: &ItemSet) -> Result<Vec<TagUsage>, IndexError>;

    /// Tag confidences of one item. Unknown items have no tags.
    fn item_tag_confidences(&self, item: ItemId) -> Result<HashMap<TagId, f32>, IndexError>;
}

pub trait ScopeProvider: Send + Sync {
    /// Items of every active directory, as of now.
    fn active_item_scope(&self) -> Result<ItemSet, IndexError>;
}

/// Loads a complete snapshot from the backing store.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load_snapshot(&self) -> Result<IndexSnapshot, IndexError>;
}

/// Immutable in-memory copy of the tag index.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    tags: HashMap<TagId, Tag>,
    tag_ids: HashMap<String, TagId>,
    members: HashMap<TagId, ItemSet>,
    item_tags: HashMap<ItemId, HashMap<TagId, f32>>,
    items: HashMap<ItemId, Item>,
    directories: HashMap<DirectoryId, Directory>,
}

impl IndexSnapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    pub fn tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.tag_ids
            .get(&normalize_tag(name))
            .and_then(|id| self.tags.get(id))
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.directories.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

impl TagIndex for IndexSnapshot {
    fn tag_item_set(&self, normalized_name: &str) -> Result<ItemSet, IndexError> {
        match self.tag_ids.get(normalized_name) {
            Some(id) => self.tag_members(*id),
            None => Ok(ItemSet::new()),
        }
    }

    fn tag_members(&self, tag: TagId) -> Result<ItemSet, IndexError> {
        Ok(self.members.get(&tag).cloned().unwrap_or_default())
    }

    fn tag_usage_counts(&self, scope: &ItemSet) -> Result<Vec<TagUsage>, IndexError> {
        let usage = self
            .members
            .iter()
            .filter_map(|(id, items)| {
                let count = items.iter().filter(|item| scope.contains(item)).count();
                let tag = self.tags.get(id)?;
                (count > 0).then(|| TagUsage {
                    name: tag.name.clone(),
                    count,
                })
            })
            .collect();
        Ok(usage)
    }

    fn item_tag_confidences(&self, item: ItemId) -> Result<HashMap<TagId, f32>, IndexError> {
        Ok(self.item_tags.get(&item).cloned().unwrap_or_default())
    }
}

impl ScopeProvider for IndexSnapshot {
    fn active_item_scope(&self) -> Result<ItemSet, IndexError> {
        Ok(self
            .items
            .values()
            .filter(|item| {
                self.directories
                    .get(&item.directory_id)
                    .map(|d| d.active)
                    .unwrap_or(false)
            })
            .map(|item| item.id)
            .collect())
    }
}

/// Assembles an [`IndexSnapshot`] from rows.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: IndexSnapshot,
}

impl SnapshotBuilder {
    pub fn directory(mut self, id: DirectoryId, path: impl Into<String>, active: bool) -> Self {
        self.snapshot.directories.insert(
            id,
            Directory {
                id,
                path: path.into(),
                active,
            },
        );
        self
    }

    pub fn item(mut self, id: ItemId, directory_id: DirectoryId, path: impl Into<String>) -> Self {
        self.snapshot.items.insert(
            id,
            Item {
                id,
                directory_id,
                path: path.into(),
            },
        );
        self
    }

    pub fn tag(mut self, id: TagId, name: &str, category: TagCategory) -> Self {
        let name = normalize_tag(name);
        self.snapshot.tag_ids.insert(name.clone(), id);
        self.snapshot.tags.insert(id, Tag { id, name, category });
        self
    }

    /// Links an item to a tag. Confidence is clamped to `[0, 1]`.
    pub fn item_tag(mut self, item: ItemId, tag: TagId, confidence: f32) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        self.snapshot.members.entry(tag).or_default().insert(item);
        self.snapshot
            .item_tags
            .entry(item)
            .or_default()
            .insert(tag, confidence);
        self
    }

    pub fn build(self) -> IndexSnapshot {
        self.snapshot
    }
}

/// Shared, swappable snapshot.
///
/// Readers take an `Arc` and never block each other or the writer for longer
/// than the pointer copy. Writers are expected to be serialized by the owner.
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SharedIndex {
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot queries should read right now.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, IndexError> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| IndexError::Poisoned)
    }

    pub fn replace(&self, snapshot: IndexSnapshot) -> Result<(), IndexError> {
        let mut guard = self.current.write().map_err(|_| IndexError::Poisoned)?;
        *guard = Arc::new(snapshot);
        Ok(())
    }

    /// Reload from `source` and publish the result.
    pub async fn refresh(&self, source: &dyn SnapshotSource) -> Result<(), IndexError> {
        let snapshot = source.load_snapshot().await?;
        info!(
            items = snapshot.item_count(),
            tags = snapshot.tag_count(),
            "tag index snapshot refreshed"
        );
        self.replace(snapshot)
    }
}
