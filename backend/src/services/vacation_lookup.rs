//! Vacation ledger lookup.
//!
//! Answers "is this user on vacation at any point during this period". A vacation that touches
//! a single local day of the period exempts the whole period.

use log::debug;
use std::time::Duration;

use super::error::{EngineError, EngineResult};
use super::guard::bounded;
use crate::db::repository::VacationRepository;
use crate::models::{Period, UserId};

/// Read-only view over a [`VacationRepository`] with a bounded call time.
pub struct VacationLedger<'a, R: VacationRepository + ?Sized> {
    repo: &'a R,
    timeout: Duration,
}

impl<'a, R: VacationRepository + ?Sized> VacationLedger<'a, R> {
    pub fn new(repo: &'a R, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Whether any vacation entry of `user_id` intersects the local days of `period`.
    ///
    /// An unreachable or slow ledger is reported as [`EngineError::ProviderUnavailable`], never
    /// as a yes or a no.
    pub async fn is_on_vacation(&self, user_id: UserId, period: &Period) -> EngineResult<bool> {
        let entries = bounded(
            self.timeout,
            "list_overlapping",
            self.repo
                .list_overlapping(user_id, period.start_date, period.last_date()),
        )
        .await
        .map_err(EngineError::from)?;

        let on_vacation = entries.iter().any(|entry| entry.overlaps(period));
        if on_vacation {
            debug!("User {} is on vacation during {}", user_id, period);
        }
        Ok(on_vacation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::{OrganizationRepository, UserRepository};
    use crate::models::{Identity, NewOrganization, NewUser, NewVacation, WeekCalendar};
    use chrono::{NaiveDate, TimeZone, Utc, Weekday};

    async fn setup() -> (LocalRepository, UserId, Period) {
        let repo = LocalRepository::new();
        let org = repo
            .store_organization(&NewOrganization::new("Acme", Weekday::Mon))
            .await
            .unwrap();
        let joined = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let user = repo
            .create_user(
                org.id,
                &NewUser::from_identity(Identity::parse("ann@acme.io").unwrap(), joined),
            )
            .await
            .unwrap();
        let period = WeekCalendar::utc(Weekday::Mon)
            .period_containing_date(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        (repo, user.id, period)
    }

    #[tokio::test]
    async fn test_single_overlapping_day_counts() {
        let (repo, user, period) = setup().await;
        // Period is Mon 2024-03-04 .. Sun 2024-03-10; vacation ends on the Monday.
        repo.add_vacation(&NewVacation {
            user_id: user,
            starts_on: NaiveDate::from_ymd_opt(2024, 2, 26).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        })
        .await
        .unwrap();

        let ledger = VacationLedger::new(&repo, Duration::from_secs(1));
        assert!(ledger.is_on_vacation(user, &period).await.unwrap());
    }

    #[tokio::test]
    async fn test_adjacent_vacation_does_not_count() {
        let (repo, user, period) = setup().await;
        repo.add_vacation(&NewVacation {
            user_id: user,
            starts_on: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        })
        .await
        .unwrap();

        let ledger = VacationLedger::new(&repo, Duration::from_secs(1));
        assert!(!ledger.is_on_vacation(user, &period).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_not_false() {
        let (repo, user, period) = setup().await;
        repo.fail_vacation_lookups_for(user);

        let ledger = VacationLedger::new(&repo, Duration::from_secs(1));
        let err = ledger.is_on_vacation(user, &period).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_slow_ledger_times_out() {
        let (repo, user, period) = setup().await;
        repo.set_latency(Some(Duration::from_millis(200)));

        let ledger = VacationLedger::new(&repo, Duration::from_millis(10));
        let err = ledger.is_on_vacation(user, &period).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
