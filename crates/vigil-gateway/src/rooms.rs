use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use vigil_types::models::Role;

pub type SessionId = Uuid;

/// Serialized event frame queued for one session.
pub type Frame = Arc<str>;

/// Broadcast scope. The set is closed on purpose: every broadcast targets a
/// group, a single user, or the admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Group(i64),
    User(i64),
    Admins,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(id) => write!(f, "group:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Admins => f.write_str("admins"),
        }
    }
}

/// Identity derived from a verified credential on handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub role: Role,
    pub group_id: Option<i64>,
}

struct SessionEntry {
    identity: Option<SessionIdentity>,
    sender: mpsc::UnboundedSender<Frame>,
    rooms: HashSet<Room>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, SessionEntry>,
    rooms: HashMap<Room, HashSet<SessionId>>,
}

/// Maps rooms to the live sessions in them. Pure bookkeeping: every
/// operation is total, unknown sessions and rooms read as empty.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never await and never panic midway, so a poisoned
    // lock still guards consistent maps.
    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a live session. Returns its id and the receiver its
    /// connection task drains.
    pub fn connect(
        &self,
        identity: Option<SessionIdentity>,
    ) -> (SessionId, mpsc::UnboundedReceiver<Frame>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.write().sessions.insert(
            session_id,
            SessionEntry {
                identity,
                sender: tx,
                rooms: HashSet::new(),
            },
        );
        (session_id, rx)
    }

    /// Drop a session and its membership in every room.
    pub fn disconnect(&self, session_id: SessionId) {
        let mut inner = self.write();
        let Some(entry) = inner.sessions.remove(&session_id) else {
            return;
        };
        for room in entry.rooms {
            remove_member(&mut inner.rooms, room, session_id);
        }
        debug!("Session {} disconnected", session_id);
    }

    /// Add a session to a room. Returns true if membership changed.
    pub fn join(&self, session_id: SessionId, room: Room) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.sessions.get_mut(&session_id) else {
            return false;
        };
        if !entry.rooms.insert(room) {
            return false;
        }
        inner.rooms.entry(room).or_default().insert(session_id);
        true
    }

    /// Remove a session from a room. Returns true if membership changed.
    pub fn leave(&self, session_id: SessionId, room: Room) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.sessions.get_mut(&session_id) else {
            return false;
        };
        if !entry.rooms.remove(&room) {
            return false;
        }
        remove_member(&mut inner.rooms, room, session_id);
        true
    }

    pub(crate) fn members_of(&self, room: Room) -> HashSet<SessionId> {
        self.read().rooms.get(&room).cloned().unwrap_or_default()
    }

    pub fn rooms_of(&self, session_id: SessionId) -> Vec<Room> {
        self.read()
            .sessions
            .get(&session_id)
            .map(|e| e.rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn identity_of(&self, session_id: SessionId) -> Option<SessionIdentity> {
        self.read().sessions.get(&session_id).and_then(|e| e.identity)
    }

    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    /// Queue a frame for every session in any of `rooms`, at most once per
    /// session. Returns how many sessions accepted it.
    pub(crate) fn deliver(&self, rooms: &[Room], frame: &Frame) -> usize {
        let inner = self.read();
        let mut targets: HashSet<SessionId> = HashSet::new();
        for room in rooms {
            if let Some(members) = inner.rooms.get(room) {
                targets.extend(members.iter().copied());
            }
        }

        targets
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            // A closed channel means the connection task is tearing down;
            // disconnect() will clean it up.
            .filter(|entry| entry.sender.send(frame.clone()).is_ok())
            .count()
    }
}

fn remove_member(rooms: &mut HashMap<Room, HashSet<SessionId>>, room: Room, session_id: SessionId) {
    if let Some(members) = rooms.get_mut(&room) {
        members.remove(&session_id);
        if members.is_empty() {
            rooms.remove(&room);
        }
    }
}
