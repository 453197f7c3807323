use std::sync::Arc;

use tracing::{debug, info};

use vigil_db::EntityStore;
use vigil_db::models::{CommentAggregates, NewComment};
use vigil_gateway::{EventSink, Room};
use vigil_types::api::ValidationError;
use vigil_types::events::ServerEvent;
use vigil_types::models::{Card, CommentNode};

use crate::error::{ApiError, ApiResult};
use crate::permissions::Actor;

/// Result of a comment creation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentOutcome {
    Created(CommentNode),
    /// The card's thread is closed. Nothing was written or broadcast.
    Closed,
}

/// Keeps `comment_count` and `last_comment_at` on each card consistent with
/// its non-deleted root comments. Counts are always re-derived from the
/// store, never incremented in place.
#[derive(Clone)]
pub struct CommentAggregateUpdater {
    store: Arc<dyn EntityStore>,
    events: Arc<dyn EventSink>,
}

impl CommentAggregateUpdater {
    pub fn new(store: Arc<dyn EntityStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    pub fn list(&self, actor: &Actor, card_id: i64) -> ApiResult<Vec<CommentNode>> {
        let card = self.load_card(card_id)?;
        if !actor.can_access_group(card.group_id) {
            return Err(ApiError::Forbidden("not a member of this group"));
        }
        Ok(self.store.list_comments(card_id)?)
    }

    pub fn create(
        &self,
        actor: &Actor,
        card_id: i64,
        body: String,
        parent_comment_id: Option<i64>,
    ) -> ApiResult<CommentOutcome> {
        let card = self.load_card(card_id)?;
        if !actor.can_access_group(card.group_id) {
            return Err(ApiError::Forbidden("not a member of this group"));
        }
        if card.is_comments_closed {
            info!("User {} tried to comment on closed card {}", actor.user_id, card_id);
            return Ok(CommentOutcome::Closed);
        }

        let parent = match parent_comment_id {
            Some(parent_id) => Some(self.load_parent(card_id, parent_id)?),
            None => None,
        };

        let node = self.store.create_comment_node(&NewComment {
            card_id,
            author_id: actor.user_id,
            parent_comment_id: parent.as_ref().map(|p| p.id),
            thread_root_id: parent.as_ref().map(|p| p.thread_root_id.unwrap_or(p.id)),
            depth: parent.as_ref().map_or(0, |p| p.depth + 1),
            body,
        })?;

        let card = if node.is_root() {
            self.refresh_aggregates(card_id)?
        } else {
            card
        };
        debug!(
            "Comment {} on card {} (depth {}, count now {})",
            node.id, card_id, node.depth, card.comment_count
        );

        let mut rooms = vec![Room::Group(card.group_id)];
        if let Some(parent) = &parent {
            rooms.push(Room::User(parent.author_id));
        }
        self.events.emit_to(
            &rooms,
            &ServerEvent::CommentCreated {
                card_id,
                comment: node.clone(),
                new_count: card.comment_count,
                last_comment_at: card.last_comment_at,
            },
        );
        if node.is_root() {
            self.events.to_group(card.group_id, &count_event(&card));
        }

        Ok(CommentOutcome::Created(node))
    }

    pub fn edit(&self, actor: &Actor, comment_id: i64, body: &str) -> ApiResult<CommentNode> {
        let comment = self.load_live_comment(comment_id)?;
        if !actor.can_edit_comment(&comment) {
            return Err(ApiError::Forbidden("only the author or an admin may edit a comment"));
        }
        let card = self.load_card(comment.card_id)?;

        let comment = self.store.update_comment_body(comment_id, body)?;
        self.events.to_group(
            card.group_id,
            &ServerEvent::CommentUpdated {
                card_id: card.id,
                comment: comment.clone(),
            },
        );
        Ok(comment)
    }

    /// Soft delete. Allowed on closed threads. A second delete of the same
    /// comment succeeds without side effects.
    pub fn delete(&self, actor: &Actor, comment_id: i64) -> ApiResult<()> {
        let comment = self
            .store
            .get_comment(comment_id)?
            .ok_or(ApiError::comment_not_found(comment_id))?;
        if !actor.can_edit_comment(&comment) {
            return Err(ApiError::Forbidden("only the author or an admin may delete a comment"));
        }
        if comment.is_deleted() || !self.store.soft_delete_comment_node(comment_id)? {
            debug!("Comment {} already deleted", comment_id);
            return Ok(());
        }

        let card = self.refresh_aggregates(comment.card_id)?;
        info!(
            "Comment {} deleted from card {} (count now {})",
            comment_id, card.id, card.comment_count
        );

        self.events.to_group(card.group_id, &count_event(&card));
        self.events.to_group(
            card.group_id,
            &ServerEvent::CommentDeleted {
                card_id: card.id,
                comment_id,
                new_count: card.comment_count,
                last_comment_at: card.last_comment_at,
            },
        );
        self.events.to_group(card.group_id, &ServerEvent::PrayerUpdated { card });
        Ok(())
    }

    pub fn set_closed(&self, actor: &Actor, card_id: i64, closed: bool) -> ApiResult<Card> {
        let card = self.load_card(card_id)?;
        if !actor.can_edit_card(&card) {
            return Err(ApiError::Forbidden("only the author or an admin may moderate a thread"));
        }

        let card = self.store.set_comments_closed(card_id, closed)?;
        info!("Card {} comments {}", card_id, if closed { "closed" } else { "opened" });
        self.events.to_group(
            card.group_id,
            &ServerEvent::CommentsClosed {
                card_id,
                is_comments_closed: card.is_comments_closed,
            },
        );
        Ok(card)
    }

    /// Recompute both counters from the remaining non-deleted roots and
    /// persist them.
    pub fn refresh_aggregates(&self, card_id: i64) -> ApiResult<Card> {
        let aggregates = CommentAggregates {
            comment_count: self.store.count_root_comments(card_id)?,
            last_comment_at: self.store.latest_root_comment_at(card_id)?,
        };
        Ok(self.store.update_card_aggregates(card_id, aggregates)?)
    }

    fn load_card(&self, card_id: i64) -> ApiResult<Card> {
        self.store.get_card(card_id)?.ok_or(ApiError::card_not_found(card_id))
    }

    fn load_live_comment(&self, comment_id: i64) -> ApiResult<CommentNode> {
        match self.store.get_comment(comment_id)? {
            Some(comment) if !comment.is_deleted() => Ok(comment),
            _ => Err(ApiError::comment_not_found(comment_id)),
        }
    }

    fn load_parent(&self, card_id: i64, parent_id: i64) -> ApiResult<CommentNode> {
        let parent = self.load_live_comment(parent_id)?;
        if parent.card_id != card_id {
            return Err(ValidationError(format!("comment {parent_id} belongs to another card")).into());
        }
        Ok(parent)
    }
}

fn count_event(card: &Card) -> ServerEvent {
    ServerEvent::CommentCount {
        card_id: card.id,
        new_count: card.comment_count,
        last_comment_at: card.last_comment_at,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use vigil_db::Database;
    use vigil_db::models::NewCard;
    use vigil_types::models::Column;

    use super::*;
    use crate::testing::{RecordingSink, admin, member};

    struct Fixture {
        db: Arc<Database>,
        sink: Arc<RecordingSink>,
        updater: CommentAggregateUpdater,
        card: Card,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let updater = CommentAggregateUpdater::new(db.clone(), sink.clone());
        let card = db
            .create_card(&NewCard {
                group_id: 10,
                author_id: 1,
                title: "Surgery on Friday".into(),
                body: String::new(),
                category: None,
                column: Column::Active,
                position: 0,
            })
            .unwrap();
        Fixture { db, sink, updater, card }
    }

    fn created(outcome: CommentOutcome) -> CommentNode {
        match outcome {
            CommentOutcome::Created(node) => node,
            CommentOutcome::Closed => panic!("thread unexpectedly closed"),
        }
    }

    #[test]
    fn delete_recomputes_last_comment_at_from_remaining_roots() {
        let f = fixture();
        let author = member(2, 10);
        let t1 = created(f.updater.create(&author, f.card.id, "one".into(), None).unwrap());
        let t2 = created(f.updater.create(&author, f.card.id, "two".into(), None).unwrap());
        let t3 = created(f.updater.create(&author, f.card.id, "three".into(), None).unwrap());
        assert!(t1.created_at <= t2.created_at && t2.created_at <= t3.created_at);
        f.sink.clear();

        f.updater.delete(&author, t3.id).unwrap();

        let card = f.db.get_card(f.card.id).unwrap().unwrap();
        assert_eq!(card.comment_count, 2);
        assert_eq!(card.last_comment_at, Some(t2.created_at));
        assert_eq!(
            f.sink.names(),
            vec!["prayer:commentCount", "comment:deleted", "prayer:updated"]
        );
        assert_matches!(
            &f.sink.events()[1].1,
            ServerEvent::CommentDeleted { comment_id, new_count: 2, last_comment_at: Some(at), .. }
                if *comment_id == t3.id && *at == t2.created_at
        );
    }

    #[test]
    fn create_keeps_the_newest_timestamp_already_in_the_store() {
        let f = fixture();
        let author = member(2, 10);
        let early = created(f.updater.create(&author, f.card.id, "early".into(), None).unwrap());
        // A concurrent writer's root landed later than the one we are about to add.
        let later = early.created_at + chrono::Duration::hours(1);
        f.db.with_conn(|conn| {
            conn.execute("UPDATE comments SET created_at = ?1 WHERE id = ?2", (later, early.id))?;
            Ok(())
        })
        .unwrap();

        let newest = created(f.updater.create(&author, f.card.id, "now".into(), None).unwrap());

        assert!(newest.created_at < later);
        let card = f.db.get_card(f.card.id).unwrap().unwrap();
        assert_eq!(card.comment_count, 2);
        assert_eq!(card.last_comment_at, Some(later));
        assert_matches!(
            &f.sink.events()[..],
            [.., (_, ServerEvent::CommentCreated { new_count: 2, last_comment_at: Some(at), .. }), _]
                if *at == later
        );
    }

    #[test]
    fn closed_thread_is_a_soft_failure() {
        let f = fixture();
        f.updater.set_closed(&member(1, 10), f.card.id, true).unwrap();
        f.sink.clear();

        let outcome = f.updater.create(&member(2, 10), f.card.id, "hello".into(), None).unwrap();

        assert_eq!(outcome, CommentOutcome::Closed);
        assert!(f.sink.events().is_empty());
        assert_eq!(f.db.count_root_comments(f.card.id).unwrap(), 0);
    }

    #[test]
    fn delete_is_allowed_on_closed_threads() {
        let f = fixture();
        let author = member(2, 10);
        let root = created(f.updater.create(&author, f.card.id, "hi".into(), None).unwrap());
        f.updater.set_closed(&admin(), f.card.id, true).unwrap();

        f.updater.delete(&author, root.id).unwrap();
        assert_eq!(f.db.get_card(f.card.id).unwrap().unwrap().comment_count, 0);
    }

    #[test]
    fn replies_inherit_thread_and_do_not_count() {
        let f = fixture();
        let root = created(f.updater.create(&member(2, 10), f.card.id, "root".into(), None).unwrap());
        f.sink.clear();

        let reply = created(
            f.updater
                .create(&member(3, 10), f.card.id, "reply".into(), Some(root.id))
                .unwrap(),
        );
        let nested = created(
            f.updater
                .create(&member(2, 10), f.card.id, "nested".into(), Some(reply.id))
                .unwrap(),
        );

        assert_eq!(reply.depth, 1);
        assert_eq!(nested.depth, 2);
        assert_eq!(nested.thread_root_id, Some(root.id));
        assert_eq!(f.db.get_card(f.card.id).unwrap().unwrap().comment_count, 1);

        let (rooms, event) = &f.sink.events()[0];
        assert_eq!(rooms, &vec![Room::Group(10), Room::User(2)]);
        assert_matches!(event, ServerEvent::CommentCreated { new_count: 1, .. });
        assert!(!f.sink.names().contains(&"prayer:commentCount"));
    }

    #[test]
    fn reply_to_foreign_or_deleted_parent_is_rejected() {
        let f = fixture();
        let other = f
            .db
            .create_card(&NewCard {
                group_id: 10,
                author_id: 1,
                title: "Other".into(),
                body: String::new(),
                category: None,
                column: Column::Active,
                position: 1,
            })
            .unwrap();
        let author = member(2, 10);
        let foreign = created(f.updater.create(&author, other.id, "elsewhere".into(), None).unwrap());
        assert_matches!(
            f.updater.create(&author, f.card.id, "x".into(), Some(foreign.id)),
            Err(ApiError::Validation(_))
        );

        let root = created(f.updater.create(&author, f.card.id, "root".into(), None).unwrap());
        f.updater.delete(&author, root.id).unwrap();
        assert_matches!(
            f.updater.create(&author, f.card.id, "x".into(), Some(root.id)),
            Err(ApiError::NotFound { entity: "comment", .. })
        );
    }

    #[test]
    fn count_tracks_roots_through_mixed_sequences() {
        let f = fixture();
        let author = member(2, 10);
        let mut live = Vec::new();

        for step in 0..12 {
            if step % 3 == 2 {
                let victim = live.remove(0);
                f.updater.delete(&author, victim).unwrap();
            } else {
                let node = created(f.updater.create(&author, f.card.id, format!("c{step}"), None).unwrap());
                live.push(node.id);
                if step % 4 == 0 {
                    f.updater
                        .create(&author, f.card.id, "reply".into(), Some(node.id))
                        .unwrap();
                }
            }
            let card = f.db.get_card(f.card.id).unwrap().unwrap();
            assert_eq!(card.comment_count, live.len() as i64, "after step {step}");
            assert_eq!(card.comment_count, f.db.count_root_comments(f.card.id).unwrap());
        }
    }

    #[test]
    fn double_delete_is_a_no_op() {
        let f = fixture();
        let author = member(2, 10);
        let root = created(f.updater.create(&author, f.card.id, "hi".into(), None).unwrap());
        f.updater.delete(&author, root.id).unwrap();
        f.sink.clear();

        f.updater.delete(&author, root.id).unwrap();
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn only_author_or_admin_may_edit() {
        let f = fixture();
        let root = created(f.updater.create(&member(2, 10), f.card.id, "hi".into(), None).unwrap());

        assert_matches!(
            f.updater.edit(&member(3, 10), root.id, "mine now"),
            Err(ApiError::Forbidden(_))
        );
        let edited = f.updater.edit(&admin(), root.id, "moderated").unwrap();
        assert_eq!(edited.body, "moderated");
        assert!(edited.updated_at.is_some());
        assert_eq!(f.sink.names().last(), Some(&"comment:updated"));
    }

    #[test]
    fn only_author_or_admin_may_close() {
        let f = fixture();
        assert_matches!(
            f.updater.set_closed(&member(2, 10), f.card.id, true),
            Err(ApiError::Forbidden(_))
        );
        let card = f.updater.set_closed(&member(1, 10), f.card.id, true).unwrap();
        assert!(card.is_comments_closed);
        assert_matches!(
            f.sink.events().last(),
            Some((_, ServerEvent::CommentsClosed { is_comments_closed: true, .. }))
        );
    }
}
