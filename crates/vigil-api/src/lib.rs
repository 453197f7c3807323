pub mod comments;
pub mod error;
pub mod middleware;
pub mod permissions;
pub mod positions;
pub mod prayers;
pub mod routes;
pub mod state;
pub mod threads;

#[cfg(test)]
mod testing;
