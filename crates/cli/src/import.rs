//! Loads tagger output into the tag store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tagscope_core::models::TagAssignment;
use tagscope_core::store::TagStore;
use tracing::info;

/// One tagging run over a directory.
///
/// ```json
/// { "directory": "/photos",
///   "items": [ { "path": "a.png",
///                "tags": [ { "name": "cat", "category": "general", "confidence": 0.9 } ] } ] }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ImportFile {
    pub directory: String,
    #[serde(default)]
    pub items: Vec<ImportItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportItem {
    /// Absolute, or relative to the directory.
    pub path: String,
    #[serde(default)]
    pub tags: Vec<TagAssignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub directory_id: i64,
    pub items: usize,
    pub tags: usize,
}

pub fn parse_import(text: &str) -> Result<ImportFile> {
    let file: ImportFile = serde_json::from_str(text).context("invalid import document")?;
    if file.directory.trim().is_empty() {
        anyhow::bail!("import document has an empty directory");
    }
    Ok(file)
}

pub async fn import_path(store: &TagStore, path: &Path, active: bool) -> Result<ImportSummary> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file = parse_import(&text)?;
    import(store, &file, active).await
}

pub async fn import(store: &TagStore, file: &ImportFile, active: bool) -> Result<ImportSummary> {
    let directory_id = store.upsert_directory(&file.directory, active).await?;
    let mut summary = ImportSummary {
        directory_id,
        ..Default::default()
    };
    for entry in &file.items {
        let item_path = resolve(&file.directory, &entry.path);
        let item = store.upsert_item(directory_id, &item_path).await?;
        store.set_item_tags(item, &entry.tags).await?;
        summary.items += 1;
        summary.tags += entry.tags.len();
    }
    let removed = store.remove_orphaned_tags().await?;
    info!(
        directory = %file.directory,
        items = summary.items,
        tags = summary.tags,
        orphaned_tags_removed = removed,
        "import finished"
    );
    Ok(summary)
}

/// Parses `name` or `name=confidence` (confidence defaults to 1.0).
pub fn parse_tag_weight(spec: &str) -> Result<TagAssignment> {
    let (name, confidence) = match spec.rsplit_once('=') {
        Some((name, value)) => {
            let confidence: f32 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid confidence in {spec:?}"))?;
            (name, confidence)
        }
        None => (spec, 1.0),
    };
    if name.trim().is_empty() {
        anyhow::bail!("missing tag name in {spec:?}");
    }
    Ok(TagAssignment {
        name: name.trim().to_string(),
        category: Default::default(),
        confidence,
    })
}

fn resolve(directory: &str, item: &str) -> String {
    let p = Path::new(item);
    if p.is_absolute() {
        item.to_string()
    } else {
        Path::new(directory)
            .join(p)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
