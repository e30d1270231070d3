use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub type ItemId = i64;
pub type TagId = i64;
pub type DirectoryId = i64;

/// Unordered set of item ids: query results and scopes.
pub type ItemSet = HashSet<ItemId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Rating,
    Character,
    #[default]
    General,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Rating => "rating",
            TagCategory::Character => "character",
            TagCategory::General => "general",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rating" => Ok(TagCategory::Rating),
            "character" => Ok(TagCategory::Character),
            "general" | "" => Ok(TagCategory::General),
            other => Err(format!("unknown tag category: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub category: TagCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub directory_id: DirectoryId,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub id: DirectoryId,
    pub path: String,
    pub active: bool,
}

/// One tag prediction as produced by the tagging pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub name: String,
    #[serde(default)]
    pub category: TagCategory,
    pub confidence: f32,
}

/// Trimmed, case-folded form under which tags are stored and looked up.
pub fn normalize_tag(name: &str) -> String {
    name.trim().to_lowercase()
}
