//! Store traits consumed by the engine.
//!
//! Responsibilities are split across focused traits so each collaborator can be backed by a
//! different store if needed:
//!
//! - [`error`]: Error types for repository operations
//! - [`organization`]: Tenants and health checks
//! - [`user`]: The local roster
//! - [`checkin`]: Check-in submissions and reviews
//! - [`vacation`]: Read access to the vacation ledger
//!
//! For code that needs every capability, use the [`FullRepository`] bound:
//!
//! ```ignore
//! async fn roster_size(repo: &dyn FullRepository, org: OrganizationId) -> RepositoryResult<usize> {
//!     Ok(repo.list_active_users(org).await?.len())
//! }
//! ```

pub mod checkin;
pub mod error;
pub mod organization;
pub mod user;
pub mod vacation;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use checkin::CheckinRepository;
pub use organization::OrganizationRepository;
pub use user::UserRepository;
pub use vacation::VacationRepository;

/// Composite trait bound for a complete repository implementation.
pub trait FullRepository:
    OrganizationRepository + UserRepository + CheckinRepository + VacationRepository
{
}

impl<T> FullRepository for T where
    T: OrganizationRepository + UserRepository + CheckinRepository + VacationRepository
{
}
