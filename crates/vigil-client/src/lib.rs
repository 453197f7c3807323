//! Client side of the board: an optimistic local store that converges on the
//! server's broadcasts, the HTTP API client, and a self-healing gateway
//! connection.

pub mod api;
pub mod backoff;
pub mod connection;
pub mod error;
pub mod store;

pub use api::BoardClient;
pub use connection::GatewayClient;
pub use error::ClientError;
pub use store::ClientStore;
