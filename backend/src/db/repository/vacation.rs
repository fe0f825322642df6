use async_trait::async_trait;
use chrono::NaiveDate;

use super::error::RepositoryResult;
use crate::models::{NewVacation, UserId, VacationEntry};

/// Vacation ledger kept by the scheduling collaborator.
#[async_trait]
pub trait VacationRepository: Send + Sync {
    /// Entries of `user_id` sharing at least one day with `[first_day, last_day]`.
    async fn list_overlapping(
        &self,
        user_id: UserId,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> RepositoryResult<Vec<VacationEntry>>;

    async fn add_vacation(&self, vacation: &NewVacation) -> RepositoryResult<VacationEntry>;
}
