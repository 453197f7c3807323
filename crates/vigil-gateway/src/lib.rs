pub mod auth;
pub mod broadcast;
pub mod connection;
pub mod rooms;

pub use broadcast::{Broadcaster, EventSink};
pub use rooms::{Room, RoomRegistry, SessionId, SessionIdentity};
