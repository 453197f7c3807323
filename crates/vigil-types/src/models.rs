use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status column a card lives in. Cards are ordered by `position` within a
/// `(group_id, column)` partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Active,
    Praise,
    Archived,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Active, Column::Praise, Column::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Praise => "praise",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown column: {0}")]
pub struct ParseColumnError(pub String);

impl FromStr for Column {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "praise" => Ok(Self::Praise),
            "archived" => Ok(Self::Archived),
            other => Err(ParseColumnError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// A prayer request card as stored and as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    pub group_id: i64,
    pub author_id: i64,
    pub title: String,
    pub body: String,
    pub category: Option<String>,
    pub column: Column,
    pub position: i64,
    pub comment_count: i64,
    pub last_comment_at: Option<DateTime<Utc>>,
    pub is_comments_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One node of a threaded comment tree attached to a card.
///
/// Depth-0 nodes are thread roots and reference themselves through
/// `thread_root_id` once inserted. Replies point at the root of their thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub id: i64,
    pub card_id: i64,
    pub author_id: i64,
    pub parent_comment_id: Option<i64>,
    pub thread_root_id: Option<i64>,
    pub depth: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CommentNode {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_parses_its_own_display() {
        for column in Column::ALL {
            assert_eq!(column.to_string().parse::<Column>(), Ok(column));
        }
    }

    #[test]
    fn unknown_column_is_rejected() {
        let err = "done".parse::<Column>().unwrap_err();
        assert_eq!(err, ParseColumnError("done".into()));
    }

    #[test]
    fn card_serializes_camel_case() {
        let now = Utc::now();
        let card = Card {
            id: 1,
            group_id: 2,
            author_id: 3,
            title: "t".into(),
            body: "b".into(),
            category: None,
            column: Column::Praise,
            position: 0,
            comment_count: 4,
            last_comment_at: None,
            is_comments_closed: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["groupId"], 2);
        assert_eq!(json["column"], "praise");
        assert_eq!(json["commentCount"], 4);
        assert_eq!(json["isCommentsClosed"], true);
        assert!(json["lastCommentAt"].is_null());
    }
}
