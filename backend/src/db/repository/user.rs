use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{NewUser, OrganizationId, User, UserId};

/// The local roster of an organization.
///
/// Users are never deleted, only deactivated, so check-in history stays attached to them.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list_active_users(&self, organization_id: OrganizationId) -> RepositoryResult<Vec<User>>;

    async fn list_inactive_users(
        &self,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Vec<User>>;

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the user doesn't exist
    async fn get_user(&self, id: UserId) -> RepositoryResult<User>;

    /// Create an active user.
    ///
    /// # Returns
    /// * `Err(RepositoryError::ConflictError)` - If the identity already exists in the organization
    async fn create_user(
        &self,
        organization_id: OrganizationId,
        user: &NewUser,
    ) -> RepositoryResult<User>;

    async fn set_active(&self, id: UserId, active: bool) -> RepositoryResult<()>;
}
