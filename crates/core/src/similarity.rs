//! Weighted tag-overlap scoring for "find similar" and duplicate detection.

use crate::error::IndexError;
use crate::index::TagIndex;
use crate::models::{ItemId, ItemSet, TagId};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored {
    pub item: ItemId,
    pub score: f64,
}

/// Unordered pair of near-identical items, stored with `first < second`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicatePair {
    pub first: ItemId,
    pub second: ItemId,
    pub score: f64,
}

/// Weighted Jaccard overlap of two tag-confidence maps.
///
/// Each shared tag contributes the smaller of its two confidences; the sum is
/// divided by the size of the tag union and clamped to `[0, 1]`.
pub fn weighted_jaccard(a: &HashMap<TagId, f32>, b: &HashMap<TagId, f32>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut shared = 0usize;
    let mut overlap = 0.0f64;
    for (tag, ca) in small {
        if let Some(cb) = large.get(tag) {
            shared += 1;
            overlap += f64::from(ca.min(*cb));
        }
    }
    let union = a.len() + b.len() - shared;
    if union == 0 {
        return 0.0;
    }
    (overlap / union as f64).clamp(0.0, 1.0)
}

/// Every item of `scope` except `reference`, best first, at most `limit`.
///
/// Items sharing no tag with the reference score 0 and fill the tail of the
/// list. Equal scores are ordered by ascending item id.
pub fn similar(
    index: &dyn TagIndex,
    reference: ItemId,
    scope: &ItemSet,
    limit: usize,
) -> Result<Vec<Scored>, IndexError> {
    let ref_tags = index.item_tag_confidences(reference)?;
    rank_candidates(index, &ref_tags, scope, Some(reference), limit)
}

/// Like [`similar`], for a tag set that need not belong to an indexed item.
pub fn similar_to_tags(
    index: &dyn TagIndex,
    tags: &HashMap<TagId, f32>,
    scope: &ItemSet,
    limit: usize,
) -> Result<Vec<Scored>, IndexError> {
    rank_candidates(index, tags, scope, None, limit)
}

fn rank_candidates(
    index: &dyn TagIndex,
    ref_tags: &HashMap<TagId, f32>,
    scope: &ItemSet,
    exclude: Option<ItemId>,
    limit: usize,
) -> Result<Vec<Scored>, IndexError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let is_candidate = |item: &ItemId| Some(*item) != exclude && scope.contains(item);

    // Only items reachable through a shared tag can score above zero.
    let mut overlapping = ItemSet::new();
    for tag in ref_tags.keys() {
        overlapping.extend(index.tag_members(*tag)?.into_iter().filter(is_candidate));
    }

    let mut scored = Vec::with_capacity(overlapping.len());
    for item in overlapping {
        let tags = index.item_tag_confidences(item)?;
        let score = weighted_jaccard(ref_tags, &tags);
        if score > 0.0 {
            scored.push(Scored { item, score });
        }
    }
    scored.sort_by(rank);
    scored.truncate(limit);

    if scored.len() < limit {
        let ranked: ItemSet = scored.iter().map(|s| s.item).collect();
        let mut rest: Vec<ItemId> = scope
            .iter()
            .copied()
            .filter(|item| Some(*item) != exclude && !ranked.contains(item))
            .collect();
        rest.sort_unstable();
        rest.truncate(limit - scored.len());
        scored.extend(rest.into_iter().map(|item| Scored { item, score: 0.0 }));
    }
    Ok(scored)
}

/// Every pair of `scope` items scoring at least `threshold`, sorted by pair.
///
/// A threshold of zero or below reports every pair, tagged or not.
pub fn find_duplicates(
    index: &dyn TagIndex,
    scope: &ItemSet,
    threshold: f64,
) -> Result<Vec<DuplicatePair>, IndexError> {
    if threshold <= 0.0 {
        return all_pairs(index, scope);
    }

    let mut tags_by_item: HashMap<ItemId, HashMap<TagId, f32>> = HashMap::new();
    for item in scope {
        let tags = index.item_tag_confidences(*item)?;
        if !tags.is_empty() {
            tags_by_item.insert(*item, tags);
        }
    }

    // A positive threshold needs at least one shared tag, so partners come
    // from the inverted index.
    let mut members: HashMap<TagId, ItemSet> = HashMap::new();
    let mut pairs = Vec::new();
    let ordered: BTreeSet<ItemId> = tags_by_item.keys().copied().collect();
    for first in &ordered {
        let first_tags = &tags_by_item[first];
        let mut partners = BTreeSet::new();
        for tag in first_tags.keys() {
            if !members.contains_key(tag) {
                members.insert(*tag, index.tag_members(*tag)?);
            }
            partners.extend(
                members[tag]
                    .iter()
                    .filter(|other| *other > first && tags_by_item.contains_key(*other)),
            );
        }
        for second in partners {
            let score = weighted_jaccard(first_tags, &tags_by_item[&second]);
            if score >= threshold {
                pairs.push(DuplicatePair {
                    first: *first,
                    second,
                    score,
                });
            }
        }
    }
    Ok(pairs)
}

fn all_pairs(index: &dyn TagIndex, scope: &ItemSet) -> Result<Vec<DuplicatePair>, IndexError> {
    let mut ordered: Vec<ItemId> = scope.iter().copied().collect();
    ordered.sort_unstable();
    let mut tags = Vec::with_capacity(ordered.len());
    for item in &ordered {
        tags.push(index.item_tag_confidences(*item)?);
    }

    let mut pairs = Vec::new();
    for (i, first) in ordered.iter().enumerate() {
        for (j, second) in ordered.iter().enumerate().skip(i + 1) {
            pairs.push(DuplicatePair {
                first: *first,
                second: *second,
                score: weighted_jaccard(&tags[i], &tags[j]),
            });
        }
    }
    Ok(pairs)
}

fn rank(a: &Scored, b: &Scored) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.item.cmp(&b.item))
}
