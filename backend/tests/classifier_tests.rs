//! Classification of active users into per-period status buckets.

mod support;

use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use checkin_backend::db::repository::{CheckinRepository, UserRepository, VacationRepository};
use checkin_backend::models::{NewCheckin, NewVacation, UserId};
use checkin_backend::services::{EngineConfig, EngineError, PeriodSelector};
use support::{utc, Fixture};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// Monday-based weeks. "now" is Tuesday 2024-03-12, so the week of 2024-03-04 is the
// last completed period and the week of 2024-03-11 is current.
fn now() -> chrono::DateTime<chrono::Utc> {
    utc(2024, 3, 12, 9)
}

#[tokio::test]
async fn test_all_missing_when_nobody_submitted() {
    let fx = Fixture::new(Weekday::Mon).await;
    for name in ["ana", "bo", "cy", "dee", "eli"] {
        fx.member(&format!("{}@acme.io", name), utc(2024, 1, 2, 9))
            .await;
    }

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.period.start_date, date(2024, 3, 4));
    assert_eq!(result.missing.len(), 5);
    assert!(result.pending.is_empty());
    assert!(result.reviewed.is_empty());
    assert!(result.on_vacation.is_empty());
    assert!(result.indeterminate.is_empty());
}

#[tokio::test]
async fn test_buckets_partition_active_users() {
    let fx = Fixture::new(Weekday::Mon).await;
    let joined = utc(2024, 1, 2, 9);
    let pending = fx.member("pending@acme.io", joined).await;
    let reviewed = fx.member("reviewed@acme.io", joined).await;
    let away = fx.member("away@acme.io", joined).await;
    let absent = fx.member("absent@acme.io", joined).await;
    let boss = fx
        .user("boss@acme.io", checkin_backend::models::Role::Manager, joined)
        .await;

    fx.engine
        .submit_checkin(pending.id, utc(2024, 3, 6, 10))
        .await
        .unwrap();
    let record = fx
        .engine
        .submit_checkin(reviewed.id, utc(2024, 3, 7, 10))
        .await
        .unwrap();
    fx.engine
        .review_checkin(record.id, boss.id, utc(2024, 3, 8, 10))
        .await
        .unwrap();
    fx.engine
        .record_vacation(away.id, date(2024, 3, 1), date(2024, 3, 5))
        .await
        .unwrap();

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();

    let ids = |refs: Vec<UserId>| refs.into_iter().collect::<HashSet<_>>();
    assert_eq!(
        ids(result.pending.iter().map(|c| c.user.id).collect()),
        HashSet::from([pending.id])
    );
    assert_eq!(
        ids(result.reviewed.iter().map(|c| c.user.id).collect()),
        HashSet::from([reviewed.id])
    );
    assert_eq!(
        ids(result.on_vacation.iter().map(|u| u.id).collect()),
        HashSet::from([away.id])
    );
    assert_eq!(
        ids(result.missing.iter().map(|u| u.id).collect()),
        HashSet::from([absent.id, boss.id])
    );

    let all = result.user_ids();
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), unique.len());
    assert_eq!(result.total(), 5);
    assert_eq!(result.reviewed[0].reviewed_by, Some(boss.id));
}

#[tokio::test]
async fn test_submission_outranks_vacation() {
    let fx = Fixture::new(Weekday::Mon).await;
    let user = fx.member("worker@acme.io", utc(2024, 1, 2, 9)).await;
    fx.engine
        .record_vacation(user.id, date(2024, 3, 4), date(2024, 3, 10))
        .await
        .unwrap();
    fx.engine
        .submit_checkin(user.id, utc(2024, 3, 5, 9))
        .await
        .unwrap();

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.pending.len(), 1);
    assert!(result.on_vacation.is_empty());
}

#[tokio::test]
async fn test_adjacent_vacation_does_not_excuse() {
    let fx = Fixture::new(Weekday::Mon).await;
    let user = fx.member("worker@acme.io", utc(2024, 1, 2, 9)).await;
    // Ends the day before the period and starts the day after it.
    fx.engine
        .record_vacation(user.id, date(2024, 2, 26), date(2024, 3, 3))
        .await
        .unwrap();
    fx.engine
        .record_vacation(user.id, date(2024, 3, 11), date(2024, 3, 15))
        .await
        .unwrap();

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.missing.len(), 1);
    assert!(result.on_vacation.is_empty());
}

#[tokio::test]
async fn test_vacation_lookup_failure_is_indeterminate() {
    let fx = Fixture::new(Weekday::Mon).await;
    let flaky = fx.member("flaky@acme.io", utc(2024, 1, 2, 9)).await;
    fx.member("steady@acme.io", utc(2024, 1, 2, 9)).await;
    fx.repo.fail_vacation_lookups_for(flaky.id);

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.indeterminate.len(), 1);
    assert_eq!(result.indeterminate[0].user.id, flaky.id);
    assert!(result.missing.iter().all(|u| u.id != flaky.id));
    assert!(result.on_vacation.iter().all(|u| u.id != flaky.id));
    assert_eq!(result.missing.len(), 1);
}

#[tokio::test]
async fn test_duplicate_records_are_indeterminate() {
    let fx = Fixture::new(Weekday::Mon).await;
    let user = fx.member("twice@acme.io", utc(2024, 1, 2, 9)).await;
    for day in [5, 6] {
        fx.repo.insert_checkin_unchecked(&NewCheckin {
            user_id: user.id,
            period_start: date(2024, 3, 4),
            submitted_at: utc(2024, 3, day, 9),
        });
    }

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.indeterminate.len(), 1);
    assert!(result.pending.is_empty());
    assert!(result.missing.is_empty());

    let err = fx
        .engine
        .submit_checkin(user.id, utc(2024, 3, 7, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DataIntegrity(_)));
}

#[tokio::test]
async fn test_late_submission_leaves_missing() {
    let fx = Fixture::new(Weekday::Mon).await;
    let user = fx.member("late@acme.io", utc(2024, 1, 2, 9)).await;
    let cancel = CancellationToken::new();

    let before = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &cancel)
        .await
        .unwrap();
    assert_eq!(before.missing.len(), 1);

    fx.repo
        .create_checkin(&NewCheckin {
            user_id: user.id,
            period_start: date(2024, 3, 4),
            submitted_at: now(),
        })
        .await
        .unwrap();

    let after = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &cancel)
        .await
        .unwrap();
    assert!(after.missing.is_empty());
    assert_eq!(after.pending.len(), 1);
}

#[tokio::test]
async fn test_current_period_is_not_yet_due() {
    let fx = Fixture::new(Weekday::Mon).await;
    let early = fx.member("early@acme.io", utc(2024, 1, 2, 9)).await;
    fx.member("later@acme.io", utc(2024, 1, 2, 9)).await;
    fx.engine
        .submit_checkin(early.id, utc(2024, 3, 11, 12))
        .await
        .unwrap();

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Current, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.period.start_date, date(2024, 3, 11));
    assert_eq!(result.pending.len(), 1);
    assert!(result.missing.is_empty());
    assert_eq!(result.total(), 1);
}

#[tokio::test]
async fn test_users_hired_after_period_are_skipped() {
    let fx = Fixture::new(Weekday::Mon).await;
    fx.member("veteran@acme.io", utc(2024, 1, 2, 9)).await;
    fx.member("rookie@acme.io", utc(2024, 3, 11, 9)).await;

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].identity, "veteran@acme.io");
}

#[tokio::test]
async fn test_inactive_users_are_not_classified() {
    let fx = Fixture::new(Weekday::Mon).await;
    fx.member("here@acme.io", utc(2024, 1, 2, 9)).await;
    fx.inactive("gone@acme.io", utc(2024, 1, 2, 9));

    let result = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.total(), 1);
}

#[tokio::test]
async fn test_outstanding_starts_at_earliest_hire() {
    let fx = Fixture::new(Weekday::Mon).await;
    let user = fx.member("newish@acme.io", utc(2024, 2, 14, 9)).await;
    fx.repo
        .add_vacation(&NewVacation {
            user_id: user.id,
            starts_on: date(2024, 2, 20),
            ends_on: date(2024, 2, 21),
        })
        .await
        .unwrap();

    let report = fx
        .engine
        .classify_all_outstanding(fx.org.id, now(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.truncated);
    let starts: Vec<_> = report.periods.iter().map(|c| c.period.start_date).collect();
    assert_eq!(
        starts,
        vec![
            date(2024, 2, 12),
            date(2024, 2, 19),
            date(2024, 2, 26),
            date(2024, 3, 4)
        ]
    );
    assert_eq!(report.periods[1].on_vacation.len(), 1);
    assert_eq!(report.periods[3].missing.len(), 1);
}

#[tokio::test]
async fn test_outstanding_is_capped() {
    let config = EngineConfig::default().with_max_outstanding_periods(2);
    let fx = Fixture::with_config(Weekday::Mon, Tz::UTC, config).await;
    fx.member("newish@acme.io", utc(2024, 2, 14, 9)).await;

    let report = fx
        .engine
        .classify_all_outstanding(fx.org.id, now(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.truncated);
    let starts: Vec<_> = report.periods.iter().map(|c| c.period.start_date).collect();
    assert_eq!(starts, vec![date(2024, 2, 26), date(2024, 3, 4)]);
}

#[tokio::test]
async fn test_past_due_lists_previous_missing() {
    let fx = Fixture::new(Weekday::Mon).await;
    let done = fx.member("done@acme.io", utc(2024, 1, 2, 9)).await;
    let slacker = fx.member("slacker@acme.io", utc(2024, 1, 2, 9)).await;
    fx.engine
        .submit_checkin(done.id, utc(2024, 3, 8, 9))
        .await
        .unwrap();

    let past_due = fx
        .engine
        .past_due(fx.org.id, now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(past_due.period.start_date, date(2024, 3, 4));
    assert_eq!(past_due.users.len(), 1);
    assert_eq!(past_due.users[0].id, slacker.id);
}

#[tokio::test]
async fn test_cancelled_classification() {
    let fx = Fixture::new(Weekday::Mon).await;
    fx.member("any@acme.io", utc(2024, 1, 2, 9)).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[tokio::test]
async fn test_unreachable_store_is_unavailable() {
    let fx = Fixture::new(Weekday::Mon).await;
    fx.repo.set_healthy(false);

    let err = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Current, now(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_timezone_moves_period_boundary() {
    let fx = Fixture::with_config(
        Weekday::Mon,
        Tz::America__New_York,
        EngineConfig::default(),
    )
    .await;
    let user = fx.member("nyc@acme.io", utc(2024, 1, 2, 9)).await;

    // Monday 03:00 UTC is still Sunday evening in New York.
    let record = fx
        .engine
        .submit_checkin(user.id, utc(2024, 3, 11, 3))
        .await
        .unwrap();
    assert_eq!(record.period_start, date(2024, 3, 4));
}

#[tokio::test]
async fn test_classification_keeps_its_user_snapshot_during_reconciliation() {
    let fx = Fixture::new(Weekday::Mon).await;
    let joined = utc(2024, 1, 2, 9);
    fx.member("ana@acme.io", joined).await;
    fx.member("bo@acme.io", joined).await;
    let leaver = fx.member("cy@acme.io", joined).await;
    // Slow store: the deactivation lands while classification is still looking up vacations.
    fx.repo.set_latency(Some(Duration::from_millis(40)));
    let cancel = CancellationToken::new();
    let roster: HashSet<String> = ["ana@acme.io", "bo@acme.io"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let (classified, reconciled) = tokio::join!(
        fx.engine
            .classify(fx.org.id, PeriodSelector::Previous, now(), &cancel),
        fx.engine.reconcile_members(fx.org.id, &roster, &cancel),
    );
    fx.repo.set_latency(None);

    assert_eq!(reconciled.unwrap().deactivated, 1);
    assert!(!fx.repo.get_user(leaver.id).await.unwrap().active);

    let classified = classified.unwrap();
    let seen: HashSet<&str> = classified
        .missing
        .iter()
        .map(|u| u.identity.as_str())
        .collect();
    assert_eq!(
        seen,
        HashSet::from(["ana@acme.io", "bo@acme.io", "cy@acme.io"])
    );
    assert!(classified.indeterminate.is_empty());

    let after = fx
        .engine
        .classify(fx.org.id, PeriodSelector::Previous, now(), &cancel)
        .await
        .unwrap();
    assert_eq!(after.missing.len(), 2);
}
