use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use vigil_types::api::MoveRequest;
use vigil_types::events::ServerEvent;
use vigil_types::models::{Card, Column, CommentNode};

/// Local mirror of the board.
///
/// Local moves are applied immediately; server events then overwrite whole
/// entities, so the store converges on whatever the server last said.
/// Applying the same event twice leaves the store as applying it once.
#[derive(Debug, Default)]
pub struct ClientStore {
    cards: HashMap<i64, Card>,
    comments: HashMap<i64, CommentNode>,
    groups: BTreeSet<i64>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Subscriptions --

    /// Returns true if the group was not already subscribed.
    pub fn subscribe(&mut self, group_id: i64) -> bool {
        self.groups.insert(group_id)
    }

    pub fn unsubscribe(&mut self, group_id: i64) -> bool {
        self.groups.remove(&group_id)
    }

    /// Groups to re-join after every (re)connect.
    pub fn subscriptions(&self) -> Vec<i64> {
        self.groups.iter().copied().collect()
    }

    // -- Reads --

    pub fn card(&self, id: i64) -> Option<&Card> {
        self.cards.get(&id)
    }

    /// Cards of one column in render order `(position, id)`.
    pub fn column(&self, group_id: i64, column: Column) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self
            .cards
            .values()
            .filter(|c| c.group_id == group_id && c.column == column)
            .collect();
        cards.sort_by_key(|c| (c.position, c.id));
        cards
    }

    /// Live comments of a card, roots first within each thread.
    pub fn comments_of(&self, card_id: i64) -> Vec<&CommentNode> {
        let mut nodes: Vec<&CommentNode> = self
            .comments
            .values()
            .filter(|n| n.card_id == card_id && !n.is_deleted())
            .collect();
        nodes.sort_by_key(|n| (n.thread_root_id.unwrap_or(n.id), n.depth, n.created_at, n.id));
        nodes
    }

    // -- Writes --

    /// Replace one column with an authoritative server listing.
    pub fn replace_column(&mut self, group_id: i64, column: Column, cards: Vec<Card>) {
        self.cards
            .retain(|_, c| !(c.group_id == group_id && c.column == column));
        for card in cards {
            self.cards.insert(card.id, card);
        }
    }

    pub fn replace_comments(&mut self, card_id: i64, comments: Vec<CommentNode>) {
        self.comments.retain(|_, n| n.card_id != card_id);
        for node in comments {
            self.comments.insert(node.id, node);
        }
    }

    /// Optimistically move a card and return the request to send.
    ///
    /// `index` is the drop slot among the target column's other cards; it is
    /// clamped to the end. Both affected columns are renumbered locally.
    pub fn apply_local_move(&mut self, card_id: i64, column: Column, index: usize) -> Option<MoveRequest> {
        let (group_id, from) = {
            let card = self.cards.get(&card_id)?;
            (card.group_id, card.column)
        };

        let mut target: Vec<i64> = self
            .column(group_id, column)
            .into_iter()
            .map(|c| c.id)
            .filter(|id| *id != card_id)
            .collect();
        let index = index.min(target.len());
        target.insert(index, card_id);

        if let Some(card) = self.cards.get_mut(&card_id) {
            card.column = column;
        }
        self.renumber(&target);

        if from != column {
            let source: Vec<i64> = self.column(group_id, from).into_iter().map(|c| c.id).collect();
            self.renumber(&source);
        }

        Some(MoveRequest { column, index })
    }

    /// Fold one server event into the store.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Ready { .. } => {}
            ServerEvent::PrayerCreated { card }
            | ServerEvent::PrayerUpdated { card }
            | ServerEvent::PrayerMoved { card, .. } => {
                self.cards.insert(card.id, card.clone());
            }
            ServerEvent::PrayerDeleted { id } => {
                self.cards.remove(id);
                self.comments.retain(|_, n| n.card_id != *id);
            }
            ServerEvent::CommentCreated {
                card_id,
                comment,
                new_count,
                last_comment_at,
            } => {
                self.comments.insert(comment.id, comment.clone());
                self.set_counters(*card_id, *new_count, *last_comment_at);
            }
            ServerEvent::CommentUpdated { comment, .. } => {
                self.comments.insert(comment.id, comment.clone());
            }
            ServerEvent::CommentDeleted {
                card_id,
                comment_id,
                new_count,
                last_comment_at,
            } => {
                self.comments.remove(comment_id);
                self.set_counters(*card_id, *new_count, *last_comment_at);
            }
            ServerEvent::CommentCount {
                card_id,
                new_count,
                last_comment_at,
            } => self.set_counters(*card_id, *new_count, *last_comment_at),
            ServerEvent::CommentsClosed {
                card_id,
                is_comments_closed,
            } => {
                if let Some(card) = self.cards.get_mut(card_id) {
                    card.is_comments_closed = *is_comments_closed;
                }
            }
        }
    }

    fn set_counters(&mut self, card_id: i64, count: i64, last_comment_at: Option<DateTime<Utc>>) {
        if let Some(card) = self.cards.get_mut(&card_id) {
            card.comment_count = count;
            card.last_comment_at = last_comment_at;
        }
    }

    fn renumber(&mut self, ordered: &[i64]) {
        for (index, id) in ordered.iter().enumerate() {
            if let Some(card) = self.cards.get_mut(id) {
                card.position = index as i64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn card(id: i64, column: Column, position: i64) -> Card {
        Card {
            id,
            group_id: 1,
            author_id: 1,
            title: format!("card {id}"),
            body: String::new(),
            category: None,
            column,
            position,
            comment_count: 0,
            last_comment_at: None,
            is_comments_closed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn comment(id: i64, card_id: i64) -> CommentNode {
        CommentNode {
            id,
            card_id,
            author_id: 2,
            parent_comment_id: None,
            thread_root_id: Some(id),
            depth: 0,
            body: "praying".into(),
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }

    fn ids(store: &ClientStore, column: Column) -> Vec<(i64, i64)> {
        store.column(1, column).iter().map(|c| (c.id, c.position)).collect()
    }

    #[test]
    fn applying_an_update_twice_equals_once() {
        let mut store = ClientStore::new();
        store.replace_column(1, Column::Active, vec![card(1, Column::Active, 0), card(2, Column::Active, 1)]);

        let event = ServerEvent::PrayerUpdated {
            card: card(2, Column::Active, 0),
        };
        store.apply(&event);
        let once = ids(&store, Column::Active);
        store.apply(&event);

        assert_eq!(ids(&store, Column::Active), once);
        assert_eq!(store.card(2).unwrap().position, 0);
    }

    #[test]
    fn column_breaks_position_ties_by_id() {
        let mut store = ClientStore::new();
        store.replace_column(
            1,
            Column::Active,
            vec![card(7, Column::Active, 1), card(3, Column::Active, 1), card(5, Column::Active, 0)],
        );
        assert_eq!(ids(&store, Column::Active), vec![(5, 0), (3, 1), (7, 1)]);
    }

    #[test]
    fn local_move_reorders_both_columns() {
        let mut store = ClientStore::new();
        store.replace_column(
            1,
            Column::Active,
            vec![card(1, Column::Active, 0), card(2, Column::Active, 1), card(3, Column::Active, 2)],
        );
        store.replace_column(1, Column::Praise, vec![card(4, Column::Praise, 0)]);

        let request = store.apply_local_move(2, Column::Praise, 0).unwrap();

        assert_eq!(request, MoveRequest { column: Column::Praise, index: 0 });
        assert_eq!(ids(&store, Column::Praise), vec![(2, 0), (4, 1)]);
        assert_eq!(ids(&store, Column::Active), vec![(1, 0), (3, 1)]);
    }

    #[test]
    fn local_move_clamps_past_the_end() {
        let mut store = ClientStore::new();
        store.replace_column(1, Column::Active, vec![card(1, Column::Active, 0), card(2, Column::Active, 1)]);

        let request = store.apply_local_move(1, Column::Active, 9).unwrap();

        assert_eq!(request.index, 1);
        assert_eq!(ids(&store, Column::Active), vec![(2, 0), (1, 1)]);
        assert!(store.apply_local_move(99, Column::Active, 0).is_none());
    }

    #[test]
    fn server_event_overrides_an_optimistic_move() {
        let mut store = ClientStore::new();
        store.replace_column(1, Column::Active, vec![card(1, Column::Active, 0), card(2, Column::Active, 1)]);
        store.apply_local_move(1, Column::Praise, 0);

        // Server disagreed: the card stayed active.
        store.apply(&ServerEvent::PrayerUpdated {
            card: card(1, Column::Active, 0),
        });
        store.apply(&ServerEvent::PrayerUpdated {
            card: card(2, Column::Active, 1),
        });

        assert_eq!(ids(&store, Column::Active), vec![(1, 0), (2, 1)]);
        assert!(store.column(1, Column::Praise).is_empty());
    }

    #[test]
    fn comment_events_set_counters_absolutely() {
        let mut store = ClientStore::new();
        store.replace_column(1, Column::Active, vec![card(1, Column::Active, 0)]);
        let at = Utc::now();
        let created = ServerEvent::CommentCreated {
            card_id: 1,
            comment: comment(10, 1),
            new_count: 1,
            last_comment_at: Some(at),
        };

        store.apply(&created);
        store.apply(&created);
        assert_eq!(store.card(1).unwrap().comment_count, 1);
        assert_eq!(store.comments_of(1).len(), 1);

        store.apply(&ServerEvent::CommentDeleted {
            card_id: 1,
            comment_id: 10,
            new_count: 0,
            last_comment_at: None,
        });
        assert_eq!(store.card(1).unwrap().comment_count, 0);
        assert_eq!(store.card(1).unwrap().last_comment_at, None);
        assert!(store.comments_of(1).is_empty());
    }

    #[test]
    fn deleting_a_card_drops_its_comments() {
        let mut store = ClientStore::new();
        store.replace_column(1, Column::Active, vec![card(1, Column::Active, 0)]);
        store.replace_comments(1, vec![comment(10, 1), comment(11, 1)]);

        store.apply(&ServerEvent::PrayerDeleted { id: 1 });
        store.apply(&ServerEvent::PrayerDeleted { id: 1 });

        assert!(store.card(1).is_none());
        assert!(store.comments_of(1).is_empty());
    }

    #[test]
    fn subscriptions_are_a_set() {
        let mut store = ClientStore::new();
        assert!(store.subscribe(3));
        assert!(!store.subscribe(3));
        store.subscribe(1);
        assert_eq!(store.subscriptions(), vec![1, 3]);
        assert!(store.unsubscribe(3));
        assert_eq!(store.subscriptions(), vec![1]);
    }
}
