use serde::{Deserialize, Serialize};

use crate::models::{Column, CommentNode, Role};

const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 5000;
const MAX_CATEGORY_LEN: usize = 64;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: i64,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub group_id: Option<i64>,
    pub exp: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn check_text(field: &str, value: &str, max: usize, allow_empty: bool) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if !allow_empty && trimmed.is_empty() {
        return Err(ValidationError(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError(format!("{field} exceeds {max} characters")));
    }
    Ok(trimmed.to_string())
}

// -- Cards --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCardRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub category: Option<String>,
}

/// Validated content for a new card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardContent {
    pub title: String,
    pub body: String,
    pub category: Option<String>,
}

impl CreateCardRequest {
    pub fn validate(self) -> Result<CardContent, ValidationError> {
        Ok(CardContent {
            title: check_text("title", &self.title, MAX_TITLE_LEN, false)?,
            body: check_text("body", &self.body, MAX_BODY_LEN, true)?,
            category: self
                .category
                .map(|c| check_text("category", &c, MAX_CATEGORY_LEN, false))
                .transpose()?,
        })
    }
}

/// Drag-and-drop destination: the target column and the drop index in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MoveRequest {
    pub column: Column,
    pub index: usize,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCardRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub column: Option<Column>,
    pub index: Option<usize>,
}

/// Content edits carried by an update request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
}

/// Placement change carried by an update request. A missing column means
/// "reorder within the current column".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub column: Option<Column>,
    pub index: usize,
}

/// Canonical form of an update request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardUpdate {
    pub content: Option<ContentChanges>,
    pub placement: Option<Placement>,
}

impl CardUpdate {
    /// Content mutations require the author or an admin; pure moves also admit
    /// participants.
    pub fn is_content_mutation(&self) -> bool {
        self.content.is_some()
    }
}

impl UpdateCardRequest {
    pub fn validate(self) -> Result<CardUpdate, ValidationError> {
        let content = if self.title.is_some() || self.body.is_some() || self.category.is_some() {
            Some(ContentChanges {
                title: self
                    .title
                    .map(|t| check_text("title", &t, MAX_TITLE_LEN, false))
                    .transpose()?,
                body: self
                    .body
                    .map(|b| check_text("body", &b, MAX_BODY_LEN, true))
                    .transpose()?,
                category: self
                    .category
                    .map(|c| check_text("category", &c, MAX_CATEGORY_LEN, false))
                    .transpose()?,
            })
        } else {
            None
        };

        let placement = match (self.column, self.index) {
            (None, None) => None,
            (column, index) => Some(Placement {
                column,
                index: index.unwrap_or(0),
            }),
        };

        if content.is_none() && placement.is_none() {
            return Err(ValidationError("update carries no changes".into()));
        }

        Ok(CardUpdate { content, placement })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PartitionQuery {
    pub column: Option<Column>,
}

// -- Comments --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub body: String,
    pub parent_comment_id: Option<i64>,
}

impl CreateCommentRequest {
    pub fn validate(self) -> Result<(String, Option<i64>), ValidationError> {
        Ok((
            check_text("body", &self.body, MAX_BODY_LEN, false)?,
            self.parent_comment_id,
        ))
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EditCommentRequest {
    pub body: String,
}

impl EditCommentRequest {
    pub fn validate(self) -> Result<String, ValidationError> {
        check_text("body", &self.body, MAX_BODY_LEN, false)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommentsClosedRequest {
    pub closed: bool,
}

/// Response to a comment creation. A closed thread is a soft failure:
/// `ok == false` with a reason, never an HTTP error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
