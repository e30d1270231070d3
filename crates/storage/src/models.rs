//! Row types for the tag index tables.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DirectoryRow {
    pub id: i64,
    pub path: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub directory_id: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ItemTagRow {
    pub item_id: i64,
    pub tag_id: i64,
    pub confidence: f64,
}
