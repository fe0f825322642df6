//! Engine facade.
//!
//! [`CheckinEngine`] wires the stores, the directory provider and the runtime limits together
//! and exposes the operations used by the HTTP layer and by scheduled jobs.

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::classifier::{
    find_checkin, Classification, Classifier, OutstandingReport, PastDue, PeriodSelector,
};
use super::config::EngineConfig;
use super::error::{EngineError, EngineResult};
use super::guard::{bounded, guarded};
use super::reconciler::{ReconciliationResult, Reconciler, RosterLocks};
use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::directory::DirectoryProvider;
use crate::models::{
    CheckinId, CheckinRecord, NewCheckin, NewVacation, Organization, OrganizationId, User,
    UserId, VacationEntry, WeekCalendar,
};

/// Check-in compliance engine.
///
/// Cheap to clone; clones share the store, the directory and the reconciliation registry.
#[derive(Clone)]
pub struct CheckinEngine {
    repo: Arc<dyn FullRepository>,
    directory: Arc<dyn DirectoryProvider>,
    config: EngineConfig,
    locks: RosterLocks,
}

impl CheckinEngine {
    pub fn new(
        repo: Arc<dyn FullRepository>,
        directory: Arc<dyn DirectoryProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            directory,
            config,
            locks: RosterLocks::new(),
        }
    }

    pub fn repository(&self) -> &Arc<dyn FullRepository> {
        &self.repo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn roster_locks(&self) -> &RosterLocks {
        &self.locks
    }

    async fn store<T, F>(&self, operation: &str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        bounded(self.config.store_timeout, operation, fut)
            .await
            .map_err(EngineError::from)
    }

    /// Load the organization before a reconciliation. An unreachable store yields a failed
    /// result instead of an error; other failures (e.g. not found) propagate.
    async fn roster_organization(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Result<Organization, ReconciliationResult>> {
        match self.organization(organization_id).await {
            Ok(org) => Ok(Ok(org)),
            Err(err) if err.is_unavailable() => {
                warn!("Cannot load organization {}: {}", organization_id, err);
                Ok(Err(ReconciliationResult::failed(err)))
            }
            Err(err) => Err(err),
        }
    }

    async fn organization(&self, organization_id: OrganizationId) -> EngineResult<Organization> {
        self.store(
            "get_organization",
            self.repo.get_organization(organization_id),
        )
        .await
    }

    async fn user(&self, user_id: UserId) -> EngineResult<User> {
        self.store("get_user", self.repo.get_user(user_id)).await
    }

    /// Week calendar of an organization.
    pub async fn calendar(&self, organization_id: OrganizationId) -> EngineResult<WeekCalendar> {
        Ok(self.organization(organization_id).await?.calendar())
    }

    async fn active_snapshot(
        &self,
        organization_id: OrganizationId,
        cancel: &CancellationToken,
    ) -> EngineResult<(WeekCalendar, Vec<User>)> {
        let calendar = self.calendar(organization_id).await?;
        let users = guarded(
            cancel,
            self.config.store_timeout,
            "list_active_users",
            self.repo.list_active_users(organization_id),
        )
        .await?;
        Ok((calendar, users))
    }

    // ==================== Classification ====================

    /// Partition the active users of an organization for the selected period.
    pub async fn classify(
        &self,
        organization_id: OrganizationId,
        selector: PeriodSelector,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EngineResult<Classification> {
        let (calendar, users) = self.active_snapshot(organization_id, cancel).await?;
        let period = selector.resolve(&calendar, now);
        Classifier::new(self.repo.as_ref(), &self.config, calendar)
            .classify_period(organization_id, &users, period, now, cancel)
            .await
    }

    /// Classify every completed period since the earliest hire, one user snapshot for the run.
    pub async fn classify_all_outstanding(
        &self,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EngineResult<OutstandingReport> {
        let (calendar, users) = self.active_snapshot(organization_id, cancel).await?;
        Classifier::new(self.repo.as_ref(), &self.config, calendar)
            .classify_outstanding(organization_id, &users, now, cancel)
            .await
    }

    /// Users who missed the most recently completed period.
    pub async fn past_due(
        &self,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EngineResult<PastDue> {
        let classification = self
            .classify(organization_id, PeriodSelector::Previous, now, cancel)
            .await?;
        Ok(PastDue {
            period: classification.period,
            users: classification.missing,
        })
    }

    // ==================== Roster reconciliation ====================

    /// Fetch the organization's directory channel and reconcile the roster against it.
    pub async fn reconcile(
        &self,
        organization_id: OrganizationId,
        cancel: &CancellationToken,
    ) -> EngineResult<ReconciliationResult> {
        let guard = self.locks.try_acquire(organization_id).ok_or_else(|| {
            EngineError::Conflict(format!(
                "reconciliation already running for organization {}",
                organization_id
            ))
        })?;

        let organization = match self.roster_organization(organization_id).await? {
            Ok(org) => org,
            Err(failed) => return Ok(failed),
        };
        let channel = organization.directory_channel.as_deref().ok_or_else(|| {
            EngineError::Configuration(format!(
                "organization {} has no directory channel",
                organization_id
            ))
        })?;

        let limit = self.config.directory_timeout;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(limit, self.directory.fetch_members(channel)) => Some(result),
        };
        let members = match fetched {
            None => {
                info!("Reconciliation of organization {} cancelled before fetch", organization_id);
                return Ok(ReconciliationResult::cancelled_before_start());
            }
            Some(Err(_)) => {
                warn!(
                    "Directory fetch for organization {} timed out after {:?}",
                    organization_id, limit
                );
                return Ok(ReconciliationResult::failed(EngineError::ProviderUnavailable(
                    format!("directory fetch timed out after {:?}", limit),
                )));
            }
            Some(Ok(Err(err))) => {
                if err.is_transient() {
                    warn!(
                        "Directory fetch for organization {} failed: {}",
                        organization_id, err
                    );
                } else {
                    error!(
                        "Directory rejected the fetch for organization {}: {}",
                        organization_id, err
                    );
                }
                return Ok(ReconciliationResult::failed(EngineError::from(err)));
            }
            Some(Ok(Ok(members))) => members,
        };
        debug!(
            "Directory channel {} lists {} members",
            channel,
            members.len()
        );

        Reconciler::new(self.repo.as_ref(), &self.config)
            .apply(organization_id, &members, cancel, &guard)
            .await
    }

    /// Reconcile the roster against an explicit membership snapshot.
    pub async fn reconcile_members(
        &self,
        organization_id: OrganizationId,
        members: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> EngineResult<ReconciliationResult> {
        let guard = self.locks.try_acquire(organization_id).ok_or_else(|| {
            EngineError::Conflict(format!(
                "reconciliation already running for organization {}",
                organization_id
            ))
        })?;
        if let Err(failed) = self.roster_organization(organization_id).await? {
            return Ok(failed);
        }

        Reconciler::new(self.repo.as_ref(), &self.config)
            .apply(organization_id, members, cancel, &guard)
            .await
    }

    /// Require `actor` to be an active admin of `organization_id` before a roster change.
    pub async fn authorize_roster_change(
        &self,
        actor_id: UserId,
        organization_id: OrganizationId,
    ) -> EngineResult<()> {
        let actor = self.user(actor_id).await?;
        if !actor.active
            || !actor.role.can_manage_roster()
            || actor.organization_id != organization_id
        {
            return Err(EngineError::Forbidden(format!(
                "user {} cannot manage the roster of organization {}",
                actor_id, organization_id
            )));
        }
        Ok(())
    }

    // ==================== Check-ins and vacations ====================

    /// Record a submission for the period containing `at`.
    pub async fn submit_checkin(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> EngineResult<CheckinRecord> {
        let user = self.user(user_id).await?;
        if !user.active {
            return Err(EngineError::Forbidden(format!(
                "user {} is not an active member",
                user_id
            )));
        }
        let period = self
            .calendar(user.organization_id)
            .await?
            .period_containing(at);

        if find_checkin(self.repo.as_ref(), user_id, period.start_date)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "user {} already submitted for {}",
                user_id, period
            )));
        }

        let record = self
            .store(
                "create_checkin",
                self.repo.create_checkin(&NewCheckin {
                    user_id,
                    period_start: period.start_date,
                    submitted_at: at,
                }),
            )
            .await?;
        debug!("User {} submitted check-in {} for {}", user_id, record.id, period);
        Ok(record)
    }

    /// Mark a check-in reviewed. The reviewer must be an active admin or manager of the same
    /// organization as the submitter.
    pub async fn review_checkin(
        &self,
        checkin_id: CheckinId,
        reviewer_id: UserId,
        at: DateTime<Utc>,
    ) -> EngineResult<CheckinRecord> {
        let checkin = self
            .store("get_checkin", self.repo.get_checkin(checkin_id))
            .await?;
        let reviewer = self.user(reviewer_id).await?;
        let submitter = self.user(checkin.user_id).await?;

        if !reviewer.active || !reviewer.role.can_review() {
            return Err(EngineError::Forbidden(format!(
                "user {} cannot review check-ins",
                reviewer_id
            )));
        }
        if reviewer.organization_id != submitter.organization_id {
            return Err(EngineError::Forbidden(format!(
                "user {} belongs to another organization",
                reviewer_id
            )));
        }
        if checkin.reviewed {
            return Err(EngineError::Conflict(format!(
                "check-in {} is already reviewed",
                checkin_id
            )));
        }

        self.store(
            "mark_reviewed",
            self.repo.mark_reviewed(checkin_id, reviewer_id, at),
        )
        .await
    }

    /// Clear the review of a check-in so it counts as pending again.
    pub async fn reopen_checkin(&self, checkin_id: CheckinId) -> EngineResult<CheckinRecord> {
        let checkin = self
            .store("get_checkin", self.repo.get_checkin(checkin_id))
            .await?;
        if !checkin.reviewed {
            return Err(EngineError::Conflict(format!(
                "check-in {} is not reviewed",
                checkin_id
            )));
        }
        self.store("reopen_checkin", self.repo.reopen_checkin(checkin_id))
            .await
    }

    /// Add an inclusive vacation range for a user.
    pub async fn record_vacation(
        &self,
        user_id: UserId,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    ) -> EngineResult<VacationEntry> {
        if starts_on > ends_on {
            return Err(EngineError::Repository(RepositoryError::validation(format!(
                "vacation starts on {} after it ends on {}",
                starts_on, ends_on
            ))));
        }
        self.user(user_id).await?;
        self.store(
            "add_vacation",
            self.repo.add_vacation(&NewVacation {
                user_id,
                starts_on,
                ends_on,
            }),
        )
        .await
    }
}
