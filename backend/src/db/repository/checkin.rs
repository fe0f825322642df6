use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::error::RepositoryResult;
use crate::models::{CheckinId, CheckinRecord, NewCheckin, OrganizationId, UserId};

/// Check-in submissions, keyed by (user, period start date).
#[async_trait]
pub trait CheckinRepository: Send + Sync {
    /// The user's submission for the period starting on `period_start`.
    ///
    /// # Returns
    /// * `Ok(None)` - Nothing submitted
    /// * `Err(RepositoryError::IntegrityError)` - More than one record exists for the pair
    async fn find_by_user_and_period(
        &self,
        user_id: UserId,
        period_start: NaiveDate,
    ) -> RepositoryResult<Option<CheckinRecord>>;

    /// Every submission made by the organization's users for one period. Duplicates are
    /// returned as stored so the caller can detect them.
    async fn list_by_org_and_period(
        &self,
        organization_id: OrganizationId,
        period_start: NaiveDate,
    ) -> RepositoryResult<Vec<CheckinRecord>>;

    async fn get_checkin(&self, id: CheckinId) -> RepositoryResult<CheckinRecord>;

    /// # Returns
    /// * `Err(RepositoryError::ConflictError)` - If the user already submitted for the period
    async fn create_checkin(&self, checkin: &NewCheckin) -> RepositoryResult<CheckinRecord>;

    async fn mark_reviewed(
        &self,
        id: CheckinId,
        reviewer: UserId,
        reviewed_at: DateTime<Utc>,
    ) -> RepositoryResult<CheckinRecord>;

    /// Clear the review flag and reviewer metadata.
    async fn reopen_checkin(&self, id: CheckinId) -> RepositoryResult<CheckinRecord>;
}
