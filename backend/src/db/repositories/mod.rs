//! Store implementations.
//!
//! - `local`: In-memory implementation for unit testing and local development
//! - `postgres`: PostgreSQL implementation with Diesel ORM
mod blocking;
pub mod local;
#[cfg(feature = "postgres-repo")]
pub mod postgres;

pub use local::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use postgres::{PostgresConfig, PostgresRepository};
