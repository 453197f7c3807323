//! Fixtures shared by the unit tests in this crate.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use vigil_db::models::{CardChanges, CommentAggregates, NewCard, NewComment};
use vigil_db::{Database, EntityStore};
use vigil_gateway::{EventSink, Room};
use vigil_types::api::CardContent;
use vigil_types::events::ServerEvent;
use vigil_types::models::{Card, Column, CommentNode, Role};

use crate::permissions::Actor;

/// Event sink that records every emission instead of delivering it.
#[derive(Default)]
pub struct RecordingSink {
    emitted: Mutex<Vec<(Vec<Room>, ServerEvent)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(Vec<Room>, ServerEvent)> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.emitted.lock().unwrap().iter().map(|(_, e)| e.name()).collect()
    }

    pub fn clear(&self) {
        self.emitted.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit_to(&self, rooms: &[Room], event: &ServerEvent) {
        self.emitted.lock().unwrap().push((rooms.to_vec(), event.clone()));
    }
}

/// Wraps a real store and fails `write_position` for selected cards.
pub struct FlakyStore {
    inner: Arc<Database>,
    failing: HashSet<i64>,
}

impl FlakyStore {
    pub fn failing_writes_for(inner: Arc<Database>, card_ids: Vec<i64>) -> Self {
        Self {
            inner,
            failing: card_ids.into_iter().collect(),
        }
    }
}

impl EntityStore for FlakyStore {
    fn find_partition(&self, group_id: i64, column: Column) -> Result<Vec<Card>> {
        self.inner.find_partition(group_id, column)
    }
    fn min_position(&self, group_id: i64, column: Column) -> Result<Option<i64>> {
        self.inner.min_position(group_id, column)
    }
    fn write_position(&self, card_id: i64, position: i64) -> Result<()> {
        if self.failing.contains(&card_id) {
            bail!("injected write failure for card {}", card_id);
        }
        self.inner.write_position(card_id, position)
    }
    fn get_card(&self, id: i64) -> Result<Option<Card>> {
        self.inner.get_card(id)
    }
    fn create_card(&self, new: &NewCard) -> Result<Card> {
        self.inner.create_card(new)
    }
    fn update_card(&self, id: i64, changes: &CardChanges) -> Result<Card> {
        self.inner.update_card(id, changes)
    }
    fn delete_card(&self, id: i64) -> Result<bool> {
        self.inner.delete_card(id)
    }
    fn is_participant(&self, card_id: i64, user_id: i64) -> Result<bool> {
        self.inner.is_participant(card_id, user_id)
    }
    fn add_participant(&self, card_id: i64, user_id: i64) -> Result<bool> {
        self.inner.add_participant(card_id, user_id)
    }
    fn get_comment(&self, id: i64) -> Result<Option<CommentNode>> {
        self.inner.get_comment(id)
    }
    fn list_comments(&self, card_id: i64) -> Result<Vec<CommentNode>> {
        self.inner.list_comments(card_id)
    }
    fn create_comment_node(&self, new: &NewComment) -> Result<CommentNode> {
        self.inner.create_comment_node(new)
    }
    fn update_comment_body(&self, id: i64, body: &str) -> Result<CommentNode> {
        self.inner.update_comment_body(id, body)
    }
    fn soft_delete_comment_node(&self, id: i64) -> Result<bool> {
        self.inner.soft_delete_comment_node(id)
    }
    fn count_root_comments(&self, card_id: i64) -> Result<i64> {
        self.inner.count_root_comments(card_id)
    }
    fn latest_root_comment_at(&self, card_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.inner.latest_root_comment_at(card_id)
    }
    fn update_card_aggregates(&self, card_id: i64, aggregates: CommentAggregates) -> Result<Card> {
        self.inner.update_card_aggregates(card_id, aggregates)
    }
    fn set_comments_closed(&self, card_id: i64, closed: bool) -> Result<Card> {
        self.inner.set_comments_closed(card_id, closed)
    }
}

pub fn member(user_id: i64, group_id: i64) -> Actor {
    Actor {
        user_id,
        role: Role::Member,
        group_id: Some(group_id),
    }
}

pub fn admin() -> Actor {
    Actor {
        user_id: 1000,
        role: Role::Admin,
        group_id: None,
    }
}

pub fn content(title: &str) -> CardContent {
    CardContent {
        title: title.to_string(),
        body: String::new(),
        category: None,
    }
}

/// `(id, position)` pairs of a partition in store order.
pub fn positions_of(db: &Database, group_id: i64, column: Column) -> Vec<(i64, i64)> {
    db.find_partition(group_id, column)
        .unwrap()
        .into_iter()
        .map(|c| (c.id, c.position))
        .collect()
}
