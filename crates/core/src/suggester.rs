//! Tag autocomplete for the search bar.
//!
//! Ranking: usage count among in-scope items, descending, then name.

use crate::error::IndexError;
use crate::index::TagIndex;
use crate::models::{normalize_tag, ItemSet};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub name: String,
    pub count: usize,
}

/// Tags used in `scope` whose name starts with `prefix` (case-insensitive).
///
/// An empty prefix matches every tag, which gives the most used tags.
pub fn suggest(
    index: &dyn TagIndex,
    scope: &ItemSet,
    prefix: &str,
    limit: usize,
) -> Result<Vec<Suggestion>, IndexError> {
    if limit == 0 || scope.is_empty() {
        return Ok(Vec::new());
    }
    let prefix = normalize_tag(prefix);
    let mut suggestions: Vec<Suggestion> = index
        .tag_usage_counts(scope)?
        .into_iter()
        .filter(|usage| usage.name.starts_with(&prefix))
        .map(|usage| Suggestion {
            name: usage.name,
            count: usage.count,
        })
        .collect();

    suggestions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    suggestions.truncate(limit);
    Ok(suggestions)
}

/// The partial tag being typed at `cursor` (a character offset into `text`).
///
/// Scans back to the nearest paren, quote, whitespace-delimited operator or
/// start of text. A leading `-` is dropped. Returns `None` when nothing has
/// been typed since that boundary, or when the word under the cursor is an
/// operator keyword.
pub fn term_at_cursor(text: &str, cursor: usize) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let cursor = cursor.min(chars.len());
    let before = &chars[..cursor];

    // Inside an open quote the whole quoted text so far is the term.
    let quotes = before.iter().filter(|&&c| c == '"').count();
    if quotes % 2 == 1 {
        let open = before.iter().rposition(|&c| c == '"')?;
        let term: String = before[open + 1..].iter().collect();
        let term = term.trim_start().to_string();
        return (!term.is_empty()).then_some(term);
    }

    let start = before
        .iter()
        .rposition(|&c| c.is_whitespace() || matches!(c, '(' | ')' | '"'))
        .map(|p| p + 1)
        .unwrap_or(0);
    let word: String = before[start..].iter().collect();
    let word = word.strip_prefix('-').unwrap_or(word.as_str());
    if word.is_empty() || ["and", "or", "not"].contains(&word.to_lowercase().as_str()) {
        return None;
    }
    Some(word.to_string())
}
