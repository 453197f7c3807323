use std::sync::Arc;

use tracing::{debug, warn};

use vigil_types::events::ServerEvent;

use crate::rooms::{Frame, Room, RoomRegistry};

/// Best-effort side channel for pushing events to connected clients.
///
/// Contract: emitting never fails and never blocks the caller on delivery.
/// The persisted store has already committed by the time anything is
/// emitted, so a lost event is recovered by the next authoritative one.
pub trait EventSink: Send + Sync {
    /// Deliver `event` to every session in any of `rooms`, once per session.
    fn emit_to(&self, rooms: &[Room], event: &ServerEvent);

    fn emit(&self, room: Room, event: &ServerEvent) {
        self.emit_to(&[room], event);
    }

    fn to_group(&self, group_id: i64, event: &ServerEvent) {
        self.emit(Room::Group(group_id), event);
    }

    fn to_user(&self, user_id: i64, event: &ServerEvent) {
        self.emit(Room::User(user_id), event);
    }

    fn to_admins(&self, event: &ServerEvent) {
        self.emit(Room::Admins, event);
    }
}

/// The live broadcast handle. Created once at startup with [`Broadcaster::init`]
/// and cloned into every component that emits.
#[derive(Clone)]
pub struct Broadcaster {
    registry: RoomRegistry,
}

impl Broadcaster {
    pub fn init(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }
}

impl EventSink for Broadcaster {
    fn emit_to(&self, rooms: &[Room], event: &ServerEvent) {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!("Dropping {} broadcast, serialization failed: {}", event.name(), e);
                return;
            }
        };

        let delivered = self.registry.deliver(rooms, &frame);
        debug!(
            event = event.name(),
            rooms = ?rooms.iter().map(ToString::to_string).collect::<Vec<_>>(),
            delivered,
            "Broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::SessionIdentity;
    use vigil_types::models::Role;

    fn frame_event(frame: Frame) -> ServerEvent {
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn group_broadcast_reaches_only_group_members() {
        let registry = RoomRegistry::new();
        let broadcaster = Broadcaster::init(registry.clone());
        let (inside, mut rx_inside) = registry.connect(None);
        let (_outside, mut rx_outside) = registry.connect(None);
        registry.join(inside, Room::Group(2));

        broadcaster.to_group(2, &ServerEvent::PrayerDeleted { id: 11 });

        let got = frame_event(rx_inside.recv().await.unwrap());
        assert_eq!(got, ServerEvent::PrayerDeleted { id: 11 });
        assert!(rx_outside.try_recv().is_err());
    }

    #[tokio::test]
    async fn anonymous_session_receives_nothing_until_it_joins() {
        let registry = RoomRegistry::new();
        let broadcaster = Broadcaster::init(registry.clone());
        let (anon, mut rx) = registry.connect(None);

        broadcaster.to_group(5, &ServerEvent::PrayerDeleted { id: 1 });
        assert!(rx.try_recv().is_err());

        registry.join(anon, Room::Group(5));
        broadcaster.to_group(5, &ServerEvent::PrayerDeleted { id: 2 });
        assert_eq!(
            frame_event(rx.recv().await.unwrap()),
            ServerEvent::PrayerDeleted { id: 2 }
        );
    }

    #[tokio::test]
    async fn user_and_admin_helpers_target_their_rooms() {
        let registry = RoomRegistry::new();
        let broadcaster = Broadcaster::init(registry.clone());
        let admin = SessionIdentity {
            user_id: 1,
            role: Role::Admin,
            group_id: None,
        };
        let (session, mut rx) = registry.connect(Some(admin));
        registry.join(session, Room::Admins);
        registry.join(session, Room::User(1));

        broadcaster.to_admins(&ServerEvent::PrayerDeleted { id: 3 });
        broadcaster.to_user(1, &ServerEvent::PrayerDeleted { id: 4 });
        broadcaster.to_user(2, &ServerEvent::PrayerDeleted { id: 5 });

        assert_eq!(frame_event(rx.recv().await.unwrap()), ServerEvent::PrayerDeleted { id: 3 });
        assert_eq!(frame_event(rx.recv().await.unwrap()), ServerEvent::PrayerDeleted { id: 4 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_with_no_sessions_does_not_panic() {
        let broadcaster = Broadcaster::init(RoomRegistry::new());
        broadcaster.to_group(1, &ServerEvent::PrayerDeleted { id: 1 });
    }
}
