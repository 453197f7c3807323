use vigil_types::api::Claims;
use vigil_types::models::{Card, CommentNode, Role};

/// The authenticated caller of a board operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
    pub group_id: Option<i64>,
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
            group_id: claims.group_id,
        }
    }
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Members act within their home group; admins act anywhere.
    pub fn can_access_group(&self, group_id: i64) -> bool {
        self.is_admin() || self.group_id == Some(group_id)
    }

    /// Title, body and category edits, deletion, bumping and thread
    /// moderation: author or admin.
    pub fn can_edit_card(&self, card: &Card) -> bool {
        self.is_admin() || card.author_id == self.user_id
    }

    /// Column and position changes additionally admit recorded participants.
    pub fn can_move_card(&self, card: &Card, is_participant: bool) -> bool {
        self.can_edit_card(card) || is_participant
    }

    pub fn can_edit_comment(&self, comment: &CommentNode) -> bool {
        self.is_admin() || comment.author_id == self.user_id
    }
}
