//! Position reconciler: keeps cards within each `(group, column)` partition
//! in a dense `0..n-1` order and re-broadcasts every row it rewrites.
//!
//! Mutations never trust a cached ordering. Each one writes its change, then
//! re-reads the whole partition from the store and renumbers it sorted by
//! `(position, id)`. Positional writes within a group are serialized by a
//! per-group lock held from the first read to the end of renumbering, so a
//! pass never works from a snapshot another writer is about to invalidate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use vigil_db::EntityStore;
use vigil_db::models::{CardChanges, NewCard};
use vigil_gateway::{EventSink, Room};
use vigil_types::api::{CardContent, CardUpdate, Placement};
use vigil_types::events::ServerEvent;
use vigil_types::models::{Card, Column};

use crate::error::{ApiError, ApiResult};
use crate::permissions::Actor;

/// Outcome of one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Cards whose position was rewritten (and re-broadcast).
    pub rewritten: Vec<i64>,
    /// Cards whose rewrite failed; the partition stays non-canonical until
    /// the next mutation triggers another pass.
    pub failed: Vec<i64>,
}

/// One lock per group. Cards never leave their group, so a move between
/// columns needs only the one lock.
#[derive(Default)]
struct GroupLocks {
    slots: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    fn slot(&self, group_id: i64) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(group_id).or_default().clone()
    }
}

#[derive(Clone)]
pub struct PositionReconciler {
    store: Arc<dyn EntityStore>,
    events: Arc<dyn EventSink>,
    locks: Arc<GroupLocks>,
}

fn hold(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PositionReconciler {
    pub fn new(store: Arc<dyn EntityStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            events,
            locks: Arc::default(),
        }
    }

    pub fn list(&self, actor: &Actor, group_id: i64, column: Column) -> ApiResult<Vec<Card>> {
        if !actor.can_access_group(group_id) {
            return Err(ApiError::Forbidden("not a member of this group"));
        }
        Ok(self.store.find_partition(group_id, column)?)
    }

    /// Insert a new card at the "most recent" extreme of the active column.
    pub fn create_card(&self, actor: &Actor, group_id: i64, content: CardContent) -> ApiResult<Card> {
        if !actor.can_access_group(group_id) {
            return Err(ApiError::Forbidden("not a member of this group"));
        }

        let column = Column::Active;
        let slot = self.locks.slot(group_id);
        let _guard = hold(&slot);

        let position = self.insertion_position(group_id, column)?;
        let card = self.store.create_card(&NewCard {
            group_id,
            author_id: actor.user_id,
            title: content.title,
            body: content.body,
            category: content.category,
            column,
            position,
        })?;
        info!("Card {} created in group:{} {} at {}", card.id, group_id, column, position);

        self.renumber(group_id, column);

        let card = self.load(card.id)?;
        self.events.emit_to(
            &[Room::Group(group_id), Room::Admins],
            &ServerEvent::PrayerCreated { card: card.clone() },
        );
        Ok(card)
    }

    /// Push a card to the top of its current column.
    pub fn bump_card(&self, actor: &Actor, card_id: i64) -> ApiResult<Card> {
        let card = self.load(card_id)?;
        if !actor.can_edit_card(&card) {
            return Err(ApiError::Forbidden("only the author or an admin may bump a card"));
        }

        let slot = self.locks.slot(card.group_id);
        let _guard = hold(&slot);
        // The column may have changed while we waited for the lock.
        let card = self.load(card_id)?;
        let position = self.insertion_position(card.group_id, card.column)?;
        self.store.update_card(
            card_id,
            &CardChanges {
                position: Some(position),
                ..Default::default()
            },
        )?;
        debug!("Card {} bumped to {}", card_id, position);

        let report = self.renumber(card.group_id, card.column);
        let card = self.load(card_id)?;
        if !report.rewritten.contains(&card_id) {
            self.events.to_group(card.group_id, &ServerEvent::PrayerUpdated { card: card.clone() });
        }
        Ok(card)
    }

    /// Drag-and-drop move. Participants may move a card they do not own.
    pub fn move_card(&self, actor: &Actor, card_id: i64, placement: Placement) -> ApiResult<Card> {
        let card = self.load(card_id)?;
        self.authorize_move(actor, &card)?;
        self.apply_placement(card, placement)
    }

    /// Combined edit. Any content field makes this an author/admin operation,
    /// even when the request also carries a column or index.
    pub fn update_card(&self, actor: &Actor, card_id: i64, update: CardUpdate) -> ApiResult<Card> {
        let card = self.load(card_id)?;
        if update.is_content_mutation() {
            if !actor.can_edit_card(&card) {
                return Err(ApiError::Forbidden("only the author or an admin may edit a card"));
            }
        } else {
            self.authorize_move(actor, &card)?;
        }

        let card = match update.content {
            Some(content) => self.store.update_card(
                card_id,
                &CardChanges {
                    title: content.title,
                    body: content.body,
                    category: content.category,
                    ..Default::default()
                },
            )?,
            None => card,
        };

        match update.placement {
            Some(placement) => self.apply_placement(card, placement),
            None => {
                self.events.to_group(card.group_id, &ServerEvent::PrayerUpdated { card: card.clone() });
                Ok(card)
            }
        }
    }

    pub fn delete_card(&self, actor: &Actor, card_id: i64) -> ApiResult<()> {
        let card = self.load(card_id)?;
        if !actor.can_edit_card(&card) {
            return Err(ApiError::Forbidden("only the author or an admin may delete a card"));
        }

        let slot = self.locks.slot(card.group_id);
        let _guard = hold(&slot);
        // Re-read under the lock so the gap is closed in the card's current column.
        let card = self.load(card_id)?;
        if !self.store.delete_card(card_id)? {
            // Lost a race with another delete; that caller broadcasts.
            return Err(ApiError::card_not_found(card_id));
        }
        info!("Card {} deleted from group:{} {}", card_id, card.group_id, card.column);

        self.events.emit_to(
            &[Room::Group(card.group_id), Room::Admins],
            &ServerEvent::PrayerDeleted { id: card_id },
        );
        self.renumber(card.group_id, card.column);
        Ok(())
    }

    /// Record the actor as a participant, which lets them move the card.
    /// Returns false if they already were one.
    pub fn join_card(&self, actor: &Actor, card_id: i64) -> ApiResult<bool> {
        let card = self.load(card_id)?;
        if !actor.can_access_group(card.group_id) {
            return Err(ApiError::Forbidden("not a member of this group"));
        }
        let added = self.store.add_participant(card_id, actor.user_id)?;
        if added {
            debug!("User {} joined card {}", actor.user_id, card_id);
            self.events.to_group(card.group_id, &ServerEvent::PrayerUpdated { card });
        }
        Ok(added)
    }

    /// Renumber a partition to `0..n-1` in `(position, id)` order.
    ///
    /// Already-canonical partitions are left alone: no writes, no broadcasts.
    /// A failed row is logged and skipped so the rest still converge.
    pub fn normalize(&self, group_id: i64, column: Column) -> NormalizeReport {
        let slot = self.locks.slot(group_id);
        let _guard = hold(&slot);
        self.renumber(group_id, column)
    }

    /// Caller holds the group lock.
    fn renumber(&self, group_id: i64, column: Column) -> NormalizeReport {
        let mut report = NormalizeReport::default();
        let partition = match self.store.find_partition(group_id, column) {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Normalization of group:{} {} skipped, partition unreadable: {}", group_id, column, e);
                return report;
            }
        };

        if is_canonical(&partition) {
            return report;
        }

        for (index, mut card) in partition.into_iter().enumerate() {
            let target = index as i64;
            if card.position == target {
                continue;
            }
            match self.store.write_position(card.id, target) {
                Ok(()) => {
                    card.position = target;
                    report.rewritten.push(card.id);
                    self.events.to_group(group_id, &ServerEvent::PrayerUpdated { card });
                }
                Err(e) => {
                    warn!("Failed to renumber card {} to {}: {}", card.id, target, e);
                    report.failed.push(card.id);
                }
            }
        }

        debug!(
            "Normalized group:{} {} ({} rewritten, {} failed)",
            group_id,
            column,
            report.rewritten.len(),
            report.failed.len()
        );
        report
    }

    fn apply_placement(&self, card: Card, placement: Placement) -> ApiResult<Card> {
        let slot = self.locks.slot(card.group_id);
        let _guard = hold(&slot);
        let card = self.load(card.id)?;
        let from = card.column;
        let to = placement.column.unwrap_or(from);

        let target = self.store.find_partition(card.group_id, to)?;
        let position = drop_position(&target, card.id, placement.index);
        self.store.update_card(
            card.id,
            &CardChanges {
                column: Some(to),
                position: Some(position),
                ..Default::default()
            },
        )?;
        debug!(
            "Card {} moved {} -> {} index {} (position {})",
            card.id, from, to, placement.index, position
        );

        self.renumber(card.group_id, to);
        if from != to {
            self.renumber(card.group_id, from);
        }

        let moved = self.load(card.id)?;
        let event = if from != to {
            ServerEvent::PrayerMoved {
                card: moved.clone(),
                from,
                to,
            }
        } else {
            ServerEvent::PrayerUpdated { card: moved.clone() }
        };
        self.events.to_group(moved.group_id, &event);
        Ok(moved)
    }

    fn authorize_move(&self, actor: &Actor, card: &Card) -> ApiResult<()> {
        let participant = !actor.can_edit_card(card) && self.store.is_participant(card.id, actor.user_id)?;
        if actor.can_move_card(card, participant) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("only the author, an admin or a participant may move a card"))
        }
    }

    fn insertion_position(&self, group_id: i64, column: Column) -> ApiResult<i64> {
        let min = self.store.min_position(group_id, column)?;
        Ok(min.map_or(0, |m| m.saturating_sub(1)))
    }

    fn load(&self, card_id: i64) -> ApiResult<Card> {
        self.store.get_card(card_id)?.ok_or(ApiError::card_not_found(card_id))
    }
}

/// Position a dropped card takes: the current occupant of the drop index
/// donates its value (a copy, not a midpoint, so the two may tie until the
/// next normalization). Past the end lands one after the last card.
pub fn drop_position(partition: &[Card], moving_id: i64, index: usize) -> i64 {
    let others: Vec<&Card> = partition.iter().filter(|c| c.id != moving_id).collect();
    match others.get(index) {
        Some(neighbor) => neighbor.position,
        None => others.last().map_or(0, |last| last.position.saturating_add(1)),
    }
}

/// True when positions read `0, 1, 2, ...` in partition order.
pub fn is_canonical(partition: &[Card]) -> bool {
    partition
        .iter()
        .enumerate()
        .all(|(index, card)| card.position == index as i64)
}
