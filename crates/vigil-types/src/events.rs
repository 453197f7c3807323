use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Card, Column, CommentNode};

/// Events pushed FROM server TO client over the WebSocket gateway.
///
/// Serialized as `{"event": "<name>", "data": {...}}`. The event names are a
/// stable wire contract shared with the browser client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Connection accepted; lists the rooms joined on handshake.
    #[serde(rename = "session:ready", rename_all = "camelCase")]
    Ready {
        user_id: Option<i64>,
        rooms: Vec<String>,
    },

    #[serde(rename = "prayer:created")]
    PrayerCreated { card: Card },

    /// Any field change, including a position rewrite by normalization.
    #[serde(rename = "prayer:updated")]
    PrayerUpdated { card: Card },

    #[serde(rename = "prayer:moved")]
    PrayerMoved { card: Card, from: Column, to: Column },

    #[serde(rename = "prayer:deleted")]
    PrayerDeleted { id: i64 },

    #[serde(rename = "comment:created", rename_all = "camelCase")]
    CommentCreated {
        card_id: i64,
        comment: CommentNode,
        new_count: i64,
        last_comment_at: Option<DateTime<Utc>>,
    },

    #[serde(rename = "comment:updated", rename_all = "camelCase")]
    CommentUpdated { card_id: i64, comment: CommentNode },

    #[serde(rename = "comment:deleted", rename_all = "camelCase")]
    CommentDeleted {
        card_id: i64,
        comment_id: i64,
        new_count: i64,
        last_comment_at: Option<DateTime<Utc>>,
    },

    /// Counter-only delta for clients that render counts without threads.
    #[serde(rename = "prayer:commentCount", rename_all = "camelCase")]
    CommentCount {
        card_id: i64,
        new_count: i64,
        last_comment_at: Option<DateTime<Utc>>,
    },

    #[serde(rename = "prayer:commentsClosed", rename_all = "camelCase")]
    CommentsClosed {
        card_id: i64,
        is_comments_closed: bool,
    },
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "session:ready",
            Self::PrayerCreated { .. } => "prayer:created",
            Self::PrayerUpdated { .. } => "prayer:updated",
            Self::PrayerMoved { .. } => "prayer:moved",
            Self::PrayerDeleted { .. } => "prayer:deleted",
            Self::CommentCreated { .. } => "comment:created",
            Self::CommentUpdated { .. } => "comment:updated",
            Self::CommentDeleted { .. } => "comment:deleted",
            Self::CommentCount { .. } => "prayer:commentCount",
            Self::CommentsClosed { .. } => "prayer:commentsClosed",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Only room subscription management travels this way; every data mutation
/// goes through the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "join:group", rename_all = "camelCase")]
    JoinGroup { group_id: i64 },

    #[serde(rename = "leave:group", rename_all = "camelCase")]
    LeaveGroup { group_id: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("implausible group id {0}")]
    InvalidGroup(i64),
}

impl ClientCommand {
    /// Parse and validate one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let cmd: Self = serde_json::from_str(text)?;
        let group_id = cmd.group_id();
        if group_id <= 0 {
            return Err(CommandError::InvalidGroup(group_id));
        }
        Ok(cmd)
    }

    pub fn group_id(&self) -> i64 {
        match self {
            Self::JoinGroup { group_id } | Self::LeaveGroup { group_id } => *group_id,
        }
    }
}
