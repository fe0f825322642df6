use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{NewOrganization, Organization, OrganizationId};

/// Tenants and store health.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Check if the store is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if connection is healthy
    /// - `Ok(false)` if connection is unhealthy but no error occurred
    /// - `Err(RepositoryError)` if an error occurred during the check
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the organization doesn't exist
    async fn get_organization(&self, id: OrganizationId) -> RepositoryResult<Organization>;

    async fn list_organizations(&self) -> RepositoryResult<Vec<Organization>>;

    async fn store_organization(&self, organization: &NewOrganization)
        -> RepositoryResult<Organization>;
}
