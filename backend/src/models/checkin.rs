//! Check-in submissions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::user::{UserId, UserRef};
use crate::define_id_type;

define_id_type!(i64, CheckinId);

/// One user's submission for one period. At most one exists per (user, period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub id: CheckinId,
    pub user_id: UserId,
    /// `start_date` of the period the check-in belongs to.
    pub period_start: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    pub reviewed: bool,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CheckinRecord {
    pub fn to_ref(&self, user: UserRef) -> CheckinRef {
        CheckinRef {
            id: self.id,
            user,
            submitted_at: self.submitted_at,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at,
        }
    }
}

/// Input for recording a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckin {
    pub user_id: UserId,
    pub period_start: NaiveDate,
    pub submitted_at: DateTime<Utc>,
}

/// Lightweight reference to a reviewed check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRef {
    pub id: CheckinId,
    pub user: UserRef,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}
