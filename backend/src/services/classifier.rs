//! Check-in classifier.
//!
//! Partitions the active users of an organization, for one period, into five disjoint buckets:
//! pending, reviewed, missing, on vacation and indeterminate. Users whose period has not
//! elapsed and who have not submitted yet are left out (not yet due). Status is derived from
//! the store on every call; nothing is cached.

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use super::config::EngineConfig;
use super::error::{EngineError, EngineResult};
use super::guard::guarded;
use super::vacation_lookup::VacationLedger;
use crate::db::repository::{CheckinRepository, FullRepository};
use crate::models::{
    CheckinRecord, CheckinRef, OrganizationId, Period, User, UserId, UserRef, WeekCalendar,
};

/// Which period a caller asks about, relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSelector {
    Current,
    Previous,
    /// `n` periods away from the current one (negative goes back).
    Offset(i32),
    /// The period containing a local date.
    Containing(NaiveDate),
}

impl PeriodSelector {
    pub fn resolve(&self, calendar: &WeekCalendar, now: DateTime<Utc>) -> Period {
        match *self {
            PeriodSelector::Current => calendar.current(now),
            PeriodSelector::Previous => calendar.last_completed(now),
            PeriodSelector::Offset(n) => calendar.offset(&calendar.current(now), n),
            PeriodSelector::Containing(date) => calendar.period_containing_date(date),
        }
    }
}

/// A user whose status could not be determined, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndeterminateRef {
    pub user: UserRef,
    pub reason: String,
}

/// Status buckets of one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub period: Period,
    pub pending: Vec<CheckinRef>,
    pub reviewed: Vec<CheckinRef>,
    pub missing: Vec<UserRef>,
    pub on_vacation: Vec<UserRef>,
    pub indeterminate: Vec<IndeterminateRef>,
}

impl Classification {
    fn empty(period: Period) -> Self {
        Self {
            period,
            pending: Vec::new(),
            reviewed: Vec::new(),
            missing: Vec::new(),
            on_vacation: Vec::new(),
            indeterminate: Vec::new(),
        }
    }

    /// Number of users placed in any bucket.
    pub fn total(&self) -> usize {
        self.pending.len()
            + self.reviewed.len()
            + self.missing.len()
            + self.on_vacation.len()
            + self.indeterminate.len()
    }

    /// Ids of every classified user, in bucket order.
    pub fn user_ids(&self) -> Vec<UserId> {
        self.pending
            .iter()
            .chain(&self.reviewed)
            .map(|c| c.user.id)
            .chain(self.missing.iter().map(|u| u.id))
            .chain(self.on_vacation.iter().map(|u| u.id))
            .chain(self.indeterminate.iter().map(|i| i.user.id))
            .collect()
    }

    /// Sort every bucket by display name for presentation.
    pub fn sort_by_display_name(&mut self) {
        let key = |u: &UserRef| (u.display_name.to_lowercase(), u.id);
        self.pending.sort_by_key(|c| key(&c.user));
        self.reviewed.sort_by_key(|c| key(&c.user));
        self.missing.sort_by_key(key);
        self.on_vacation.sort_by_key(key);
        self.indeterminate.sort_by_key(|i| key(&i.user));
    }
}

/// Classifications of every completed period a user may still owe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingReport {
    /// Oldest first.
    pub periods: Vec<Classification>,
    /// True when older periods were dropped by `max_outstanding_periods`.
    pub truncated: bool,
}

/// Users who missed the most recently completed period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PastDue {
    pub period: Period,
    pub users: Vec<UserRef>,
}

pub(crate) struct Classifier<'a> {
    repo: &'a dyn FullRepository,
    config: &'a EngineConfig,
    calendar: WeekCalendar,
}

impl<'a> Classifier<'a> {
    pub(crate) fn new(
        repo: &'a dyn FullRepository,
        config: &'a EngineConfig,
        calendar: WeekCalendar,
    ) -> Self {
        Self {
            repo,
            config,
            calendar,
        }
    }

    fn hire_period_start(&self, user: &User) -> NaiveDate {
        self.calendar.period_containing(user.joined_at).start_date
    }

    /// Classify `users` (an active-user snapshot) for `period`.
    pub(crate) async fn classify_period(
        &self,
        organization_id: OrganizationId,
        users: &[User],
        period: Period,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EngineResult<Classification> {
        let records = guarded(
            cancel,
            self.config.store_timeout,
            "list_by_org_and_period",
            self.repo
                .list_by_org_and_period(organization_id, period.start_date),
        )
        .await?;

        let mut by_user: HashMap<UserId, Vec<CheckinRecord>> = HashMap::new();
        for record in records {
            by_user.entry(record.user_id).or_default().push(record);
        }

        let ledger = VacationLedger::new(self.repo, self.config.store_timeout);
        let elapsed = self.calendar.has_elapsed(&period, now);
        let mut result = Classification::empty(period);

        for user in users {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.hire_period_start(user) > period.start_date {
                continue;
            }

            match by_user.get(&user.id).map(Vec::as_slice) {
                Some([record]) => {
                    let entry = record.to_ref(user.to_ref());
                    if record.reviewed {
                        result.reviewed.push(entry);
                    } else {
                        result.pending.push(entry);
                    }
                }
                Some(records) if records.len() > 1 => {
                    let violation = EngineError::DataIntegrity(format!(
                        "{} check-ins stored for user {} in {}",
                        records.len(),
                        user.id,
                        period
                    ));
                    error!("{}", violation);
                    result.indeterminate.push(IndeterminateRef {
                        user: user.to_ref(),
                        reason: violation.to_string(),
                    });
                }
                _ => match ledger.is_on_vacation(user.id, &period).await {
                    Ok(true) => result.on_vacation.push(user.to_ref()),
                    Ok(false) if !elapsed => {
                        debug!("User {} not yet due for {}", user.id, period);
                    }
                    Ok(false) => result.missing.push(user.to_ref()),
                    Err(err) => {
                        warn!(
                            "Vacation lookup failed for user {} in {}: {}",
                            user.id, period, err
                        );
                        result.indeterminate.push(IndeterminateRef {
                            user: user.to_ref(),
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        debug!(
            "Classified {} users of organization {} for {}: {} pending, {} reviewed, {} missing, {} on vacation, {} indeterminate",
            result.total(),
            organization_id,
            period,
            result.pending.len(),
            result.reviewed.len(),
            result.missing.len(),
            result.on_vacation.len(),
            result.indeterminate.len()
        );
        Ok(result)
    }

    /// Classify every completed period from the earliest hire period of `users`, capped at
    /// `max_outstanding_periods` (oldest dropped first).
    pub(crate) async fn classify_outstanding(
        &self,
        organization_id: OrganizationId,
        users: &[User],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EngineResult<OutstandingReport> {
        let last = self.calendar.last_completed(now);
        let max = self.config.max_outstanding_periods;

        let earliest_hire = users
            .iter()
            .map(|u| self.calendar.period_containing(u.joined_at))
            .min();
        let earliest_hire = match earliest_hire {
            Some(p) if p.start_date <= last.start_date && max > 0 => p,
            _ => {
                return Ok(OutstandingReport {
                    periods: Vec::new(),
                    truncated: false,
                })
            }
        };

        let back = i32::try_from(max).unwrap_or(i32::MAX) - 1;
        let cap = self.calendar.offset(&last, -back);
        let (first, truncated) = if cap.start_date > earliest_hire.start_date {
            (cap, true)
        } else {
            (earliest_hire, false)
        };

        let mut periods = Vec::new();
        for period in self.calendar.periods_between(&first, &last) {
            periods.push(
                self.classify_period(organization_id, users, period, now, cancel)
                    .await?,
            );
        }
        Ok(OutstandingReport { periods, truncated })
    }
}

/// Look up a single user's check-in for a period, surfacing duplicates as an integrity error.
pub(crate) async fn find_checkin<R: CheckinRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    period_start: NaiveDate,
) -> EngineResult<Option<CheckinRecord>> {
    repo.find_by_user_and_period(user_id, period_start)
        .await
        .map_err(|e| {
            let err = EngineError::from(e);
            if matches!(err, EngineError::DataIntegrity(_)) {
                error!("{}", err);
            }
            err
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn user_ref(id: i64, name: &str) -> UserRef {
        UserRef {
            id: UserId(id),
            display_name: name.to_string(),
            identity: format!("{}@x.io", name.to_lowercase()),
        }
    }

    #[test]
    fn test_selector_resolution() {
        let calendar = WeekCalendar::utc(Weekday::Sat);
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

        assert_eq!(
            PeriodSelector::Current.resolve(&calendar, now).start_date,
            day(2)
        );
        assert_eq!(
            PeriodSelector::Previous.resolve(&calendar, now).start_date,
            NaiveDate::from_ymd_opt(2024, 2, 24).unwrap()
        );
        assert_eq!(
            PeriodSelector::Offset(1).resolve(&calendar, now).start_date,
            day(9)
        );
        assert_eq!(
            PeriodSelector::Containing(day(15)).resolve(&calendar, now).start_date,
            day(9)
        );
    }

    #[test]
    fn test_sort_by_display_name_is_case_insensitive() {
        let period = WeekCalendar::utc(Weekday::Mon)
            .period_containing_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        let mut classification = Classification::empty(period);
        classification.missing = vec![user_ref(1, "zoe"), user_ref(2, "Adam"), user_ref(3, "bea")];
        classification.sort_by_display_name();

        let names: Vec<_> = classification
            .missing
            .iter()
            .map(|u| u.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Adam", "bea", "zoe"]);
        assert_eq!(classification.total(), 3);
    }
}
