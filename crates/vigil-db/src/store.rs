use anyhow::Result;
use chrono::{DateTime, Utc};

use vigil_types::models::{Card, Column, CommentNode};

use crate::models::{CardChanges, CommentAggregates, NewCard, NewComment};

/// The persisted entity store consumed by the reconciler and the comment
/// aggregate updater. It is the only source of truth for ordering decisions;
/// callers re-read through it before every reconciliation.
pub trait EntityStore: Send + Sync {
    // -- Cards --

    /// All cards of a partition, ordered by `(position ASC, id ASC)`.
    fn find_partition(&self, group_id: i64, column: Column) -> Result<Vec<Card>>;
    fn min_position(&self, group_id: i64, column: Column) -> Result<Option<i64>>;
    fn write_position(&self, card_id: i64, position: i64) -> Result<()>;
    fn get_card(&self, id: i64) -> Result<Option<Card>>;
    fn create_card(&self, new: &NewCard) -> Result<Card>;
    fn update_card(&self, id: i64, changes: &CardChanges) -> Result<Card>;
    /// Returns false when no such card existed.
    fn delete_card(&self, id: i64) -> Result<bool>;

    // -- Participants --

    fn is_participant(&self, card_id: i64, user_id: i64) -> Result<bool>;
    /// Returns false when the user already was a participant.
    fn add_participant(&self, card_id: i64, user_id: i64) -> Result<bool>;

    // -- Comments --

    fn get_comment(&self, id: i64) -> Result<Option<CommentNode>>;
    /// Non-deleted comments of a card in thread order.
    fn list_comments(&self, card_id: i64) -> Result<Vec<CommentNode>>;
    /// Inserts a node; depth-0 nodes get `thread_root_id` set to their own id.
    fn create_comment_node(&self, new: &NewComment) -> Result<CommentNode>;
    fn update_comment_body(&self, id: i64, body: &str) -> Result<CommentNode>;
    /// Returns false when the node was missing or already deleted.
    fn soft_delete_comment_node(&self, id: i64) -> Result<bool>;
    fn count_root_comments(&self, card_id: i64) -> Result<i64>;
    fn latest_root_comment_at(&self, card_id: i64) -> Result<Option<DateTime<Utc>>>;
    fn update_card_aggregates(&self, card_id: i64, aggregates: CommentAggregates) -> Result<Card>;
    fn set_comments_closed(&self, card_id: i64, closed: bool) -> Result<Card>;
}
