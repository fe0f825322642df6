//! Persistence layer.
//!
//! Store access goes through the repository traits in [`repository`], so the engine can run
//! against Postgres in production and against the in-memory [`LocalRepository`] in tests.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  HTTP shim / server binary                   │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │  services::CheckinEngine                     │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │  repository traits (FullRepository)          │
//! └──────────┬────────────────────────┬──────────┘
//!            │                        │
//!   ┌────────▼────────┐      ┌────────▼────────┐
//!   │ LocalRepository │      │ Postgres (diesel)│
//!   └─────────────────┘      └─────────────────┘
//! ```
//!
//! - `repository`: Trait definitions and error types
//! - `repositories::local`: In-memory implementation with fault injection
//! - `repositories::postgres`: Postgres implementation with Diesel ORM
//! - `factory`: Builds a store from configuration
//! - `repo_config`: `repository.toml` loading and environment overrides

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{RepositoryFactory, RepositoryType};
pub use repo_config::{EngineSettings, RepositoryConfig, SlackSettings};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    CheckinRepository, ErrorContext, FullRepository, OrganizationRepository, RepositoryError,
    RepositoryResult, UserRepository, VacationRepository,
};
