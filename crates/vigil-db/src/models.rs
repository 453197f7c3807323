//! Write-side shapes for the store. Reads return the `vigil-types` models
//! directly.

use chrono::{DateTime, Utc};
use vigil_types::models::Column;

#[derive(Debug, Clone)]
pub struct NewCard {
    pub group_id: i64,
    pub author_id: i64,
    pub title: String,
    pub body: String,
    pub category: Option<String>,
    pub column: Column,
    pub position: i64,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CardChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub column: Option<Column>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub card_id: i64,
    pub author_id: i64,
    pub parent_comment_id: Option<i64>,
    pub thread_root_id: Option<i64>,
    pub depth: i64,
    pub body: String,
}

/// Denormalized comment counters kept on a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentAggregates {
    pub comment_count: i64,
    pub last_comment_at: Option<DateTime<Utc>>,
}
