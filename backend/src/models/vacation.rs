//! Vacation entries, owned by the scheduling collaborator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calendar::Period;
use super::user::UserId;
use crate::define_id_type;

define_id_type!(i64, VacationId);

/// An inclusive range of local calendar days a user is away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationEntry {
    pub id: VacationId,
    pub user_id: UserId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl VacationEntry {
    /// A single shared day is enough.
    pub fn overlaps(&self, period: &Period) -> bool {
        period.overlaps_dates(self.starts_on, self.ends_on)
    }
}

/// Input for recording a vacation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVacation {
    pub user_id: UserId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}
