//! Roster reconciler.
//!
//! Diffs the members of an external directory channel against the local roster and applies
//! three transitions: create unknown identities, reactivate returning ones, deactivate the
//! ones that left. The diff is computed once from a single snapshot and applied entity by
//! entity; a failed entity is recorded and its siblings still run.

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::config::EngineConfig;
use super::error::{EngineError, EngineResult};
use super::guard::{guarded, guarded_write, Write};
use crate::db::repository::FullRepository;
use crate::models::{Identity, NewUser, OrganizationId, User};

/// Failure attached to one identity, or to the run as a whole when `identity` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub reason: String,
}

impl EntityError {
    fn new(identity: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            identity: Some(identity.into()),
            reason: reason.to_string(),
        }
    }

    fn run(reason: impl ToString) -> Self {
        Self {
            identity: None,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// Every transition succeeded.
    Applied,
    /// Some transitions failed, were skipped or the run was cancelled midway.
    Partial,
    /// Nothing could be applied.
    Failed,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub created: usize,
    pub reactivated: usize,
    pub deactivated: usize,
    pub errors: Vec<EntityError>,
    pub outcome: ReconcileOutcome,
    pub cancelled: bool,
}

impl ReconciliationResult {
    /// A run that changed nothing because a collaborator failed up front.
    pub fn failed(reason: impl ToString) -> Self {
        Self {
            created: 0,
            reactivated: 0,
            deactivated: 0,
            errors: vec![EntityError::run(reason)],
            outcome: ReconcileOutcome::Failed,
            cancelled: false,
        }
    }

    pub(crate) fn cancelled_before_start() -> Self {
        Self {
            cancelled: true,
            ..Self::failed(EngineError::Cancelled)
        }
    }

    pub fn changes(&self) -> usize {
        self.created + self.reactivated + self.deactivated
    }

    fn finish(mut self) -> Self {
        let run_failed = self.cancelled || self.errors.iter().any(|e| e.identity.is_none());
        self.outcome = if self.errors.is_empty() && !self.cancelled {
            ReconcileOutcome::Applied
        } else if self.changes() == 0 && run_failed {
            ReconcileOutcome::Failed
        } else {
            ReconcileOutcome::Partial
        };
        self
    }
}

/// Transitions needed to bring the local roster in line with the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub to_create: Vec<Identity>,
    pub to_reactivate: Vec<User>,
    pub to_deactivate: Vec<User>,
    /// External entries that are not valid identities.
    pub invalid: Vec<EntityError>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_reactivate.is_empty() && self.to_deactivate.is_empty()
    }
}

/// Compute the three-way diff between external members and the local roster.
///
/// Identities match after trimming and lowercasing. A user that is somehow both active and
/// inactive under the same identity is treated as active.
pub fn compute_roster_diff(
    external: &HashSet<String>,
    active: &[User],
    inactive: &[User],
) -> RosterDiff {
    let mut invalid = Vec::new();
    let mut members = BTreeSet::new();
    for raw in external {
        match Identity::parse(raw) {
            Ok(identity) => {
                members.insert(identity);
            }
            Err(err) => invalid.push(EntityError::new(raw.clone(), err)),
        }
    }
    invalid.sort_by(|a, b| a.identity.cmp(&b.identity));

    let active_by_identity: BTreeMap<&Identity, &User> =
        active.iter().map(|u| (&u.identity, u)).collect();
    let inactive_by_identity: BTreeMap<&Identity, &User> = inactive
        .iter()
        .filter(|u| !active_by_identity.contains_key(&u.identity))
        .map(|u| (&u.identity, u))
        .collect();

    let to_create = members
        .iter()
        .filter(|i| !active_by_identity.contains_key(i) && !inactive_by_identity.contains_key(i))
        .cloned()
        .collect();
    let to_reactivate = members
        .iter()
        .filter_map(|i| inactive_by_identity.get(i).map(|u| (*u).clone()))
        .collect();
    let to_deactivate = active_by_identity
        .iter()
        .filter(|(identity, _)| !members.contains(**identity))
        .map(|(_, u)| (*u).clone())
        .collect();

    RosterDiff {
        to_create,
        to_reactivate,
        to_deactivate,
        invalid,
    }
}

/// Registry of organizations with a reconciliation in flight.
#[derive(Clone, Default)]
pub struct RosterLocks {
    inflight: Arc<Mutex<HashSet<OrganizationId>>>,
}

impl RosterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `organization_id`, or `None` if a run already holds it.
    pub fn try_acquire(&self, organization_id: OrganizationId) -> Option<RosterGuard> {
        if self.inflight.lock().insert(organization_id) {
            Some(RosterGuard {
                inflight: Arc::clone(&self.inflight),
                organization_id,
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, organization_id: OrganizationId) -> bool {
        self.inflight.lock().contains(&organization_id)
    }
}

/// Releases the organization when dropped.
pub struct RosterGuard {
    inflight: Arc<Mutex<HashSet<OrganizationId>>>,
    organization_id: OrganizationId,
}

impl Drop for RosterGuard {
    fn drop(&mut self) {
        self.inflight.lock().remove(&self.organization_id);
    }
}

pub(crate) struct Reconciler<'a> {
    repo: &'a dyn FullRepository,
    config: &'a EngineConfig,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(repo: &'a dyn FullRepository, config: &'a EngineConfig) -> Self {
        Self { repo, config }
    }

    /// Snapshot the roster, diff it against `members` and apply the transitions.
    ///
    /// The caller holds the organization's [`RosterGuard`].
    pub(crate) async fn apply(
        &self,
        organization_id: OrganizationId,
        members: &HashSet<String>,
        cancel: &CancellationToken,
        _guard: &RosterGuard,
    ) -> EngineResult<ReconciliationResult> {
        let timeout = self.config.store_timeout;

        let snapshot = async {
            let active = guarded(
                cancel,
                timeout,
                "list_active_users",
                self.repo.list_active_users(organization_id),
            )
            .await?;
            let inactive = guarded(
                cancel,
                timeout,
                "list_inactive_users",
                self.repo.list_inactive_users(organization_id),
            )
            .await?;
            Ok::<_, EngineError>((active, inactive))
        };
        let (active, inactive) = match snapshot.await {
            Ok(users) => users,
            Err(EngineError::Cancelled) => return Ok(ReconciliationResult::cancelled_before_start()),
            Err(err) if err.is_unavailable() => {
                warn!(
                    "Roster snapshot for organization {} unavailable: {}",
                    organization_id, err
                );
                return Ok(ReconciliationResult::failed(err));
            }
            Err(err) => return Err(err),
        };

        let diff = compute_roster_diff(members, &active, &inactive);
        for invalid in &diff.invalid {
            warn!(
                "Skipping directory member {:?}: {}",
                invalid.identity, invalid.reason
            );
        }

        let mut result = ReconciliationResult {
            created: 0,
            reactivated: 0,
            deactivated: 0,
            errors: diff.invalid.clone(),
            outcome: ReconcileOutcome::Applied,
            cancelled: false,
        };

        let now = Utc::now();
        for identity in &diff.to_create {
            let new_user = NewUser::from_identity(identity.clone(), now);
            let write = guarded_write(
                cancel,
                timeout,
                "create_user",
                self.repo.create_user(organization_id, &new_user),
            )
            .await;
            match settle(&mut result, identity.as_str(), "create_user", write) {
                Step::Applied => result.created += 1,
                Step::Skipped => {}
                Step::Stop => return Ok(self.summarize(organization_id, result)),
            }
        }

        for (user, active) in diff
            .to_reactivate
            .iter()
            .map(|u| (u, true))
            .chain(diff.to_deactivate.iter().map(|u| (u, false)))
        {
            let operation = if active { "reactivate_user" } else { "deactivate_user" };
            let write = guarded_write(
                cancel,
                timeout,
                operation,
                self.repo.set_active(user.id, active),
            )
            .await;
            match settle(&mut result, user.identity.as_str(), operation, write) {
                Step::Applied if active => result.reactivated += 1,
                Step::Applied => result.deactivated += 1,
                Step::Skipped => {}
                Step::Stop => return Ok(self.summarize(organization_id, result)),
            }
        }

        Ok(self.summarize(organization_id, result))
    }

    fn summarize(
        &self,
        organization_id: OrganizationId,
        result: ReconciliationResult,
    ) -> ReconciliationResult {
        let result = result.finish();
        info!(
            "Reconciled organization {}: {} created, {} reactivated, {} deactivated, {} errors{}",
            organization_id,
            result.created,
            result.reactivated,
            result.deactivated,
            result.errors.len(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        result
    }
}

enum Step {
    Applied,
    Skipped,
    Stop,
}

/// Fold one write outcome into `result`. A write cut short by the deadline or by cancellation
/// may still have landed, so it is reported as an error with an unknown outcome.
fn settle<T>(
    result: &mut ReconciliationResult,
    identity: &str,
    operation: &str,
    write: Write<T>,
) -> Step {
    match write {
        Write::Done(_) => Step::Applied,
        Write::NotStarted => {
            result.cancelled = true;
            Step::Stop
        }
        Write::Failed(err) => {
            warn!("Failed to {} {}: {}", operation, identity, err);
            result.errors.push(EntityError::new(identity, err));
            Step::Skipped
        }
        Write::Interrupted { reason, cancelled } => {
            warn!("Outcome of {} for {} unknown: {}", operation, identity, reason);
            result
                .errors
                .push(EntityError::new(identity, format!("outcome unknown: {}", reason)));
            if cancelled {
                result.cancelled = true;
                Step::Stop
            } else {
                Step::Skipped
            }
        }
    }
}
