//! In-memory local repository implementation.
//!
//! Implements every store trait over plain maps, giving fast, deterministic and isolated
//! execution for tests and local development. It honors the same contract as the Postgres
//! store (one check-in per user and period, case-insensitive identity uniqueness) and adds
//! fault injection hooks so outage paths can be exercised without a real database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::db::repository::*;
use crate::models::{
    CheckinId, CheckinRecord, Identity, NewCheckin, NewOrganization, NewUser, NewVacation,
    Organization, OrganizationId, User, UserId, VacationEntry, VacationId,
};

/// In-memory local repository.
///
/// # Example
/// ```
/// use checkin_backend::db::repositories::LocalRepository;
/// use checkin_backend::db::repository::OrganizationRepository;
/// use checkin_backend::models::NewOrganization;
/// use chrono::Weekday;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let repo = LocalRepository::new();
///     let org = repo
///         .store_organization(&NewOrganization::new("Acme", Weekday::Mon))
///         .await
///         .unwrap();
///     assert_eq!(repo.get_organization(org.id).await.unwrap().name, "Acme");
/// });
/// ```
#[derive(Clone, Default)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Default)]
struct LocalData {
    organizations: BTreeMap<OrganizationId, Organization>,
    users: BTreeMap<UserId, User>,
    checkins: BTreeMap<CheckinId, CheckinRecord>,
    vacations: Vec<VacationEntry>,

    // ID counters
    last_organization_id: i64,
    last_user_id: i64,
    last_checkin_id: i64,
    last_vacation_id: i64,

    /// Successful writes, so tests can assert that nothing was touched.
    mutations: u64,

    // Fault injection
    unhealthy: bool,
    latency: Option<Duration>,
    operation_latency: HashMap<String, Duration>,
    failing_vacation_users: HashSet<UserId>,
    failing_identities: HashSet<Identity>,
}

impl LocalData {
    fn next_organization_id(&mut self) -> OrganizationId {
        self.last_organization_id += 1;
        OrganizationId(self.last_organization_id)
    }

    fn next_user_id(&mut self) -> UserId {
        self.last_user_id += 1;
        UserId(self.last_user_id)
    }

    fn next_checkin_id(&mut self) -> CheckinId {
        self.last_checkin_id += 1;
        CheckinId(self.last_checkin_id)
    }

    fn next_vacation_id(&mut self) -> VacationId {
        self.last_vacation_id += 1;
        VacationId(self.last_vacation_id)
    }

    fn user(&self, id: UserId) -> RepositoryResult<&User> {
        self.users.get(&id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("User {} not found", id),
                ErrorContext::new("get_user")
                    .with_entity("user")
                    .with_entity_id(id),
            )
        })
    }

    fn checkin_mut(&mut self, id: CheckinId, operation: &str) -> RepositoryResult<&mut CheckinRecord> {
        self.checkins.get_mut(&id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Check-in {} not found", id),
                ErrorContext::new(operation)
                    .with_entity("checkin")
                    .with_entity_id(id),
            )
        })
    }

    fn users_of(&self, organization_id: OrganizationId, active: bool) -> Vec<User> {
        self.users
            .values()
            .filter(|u| u.organization_id == organization_id && u.active == active)
            .cloned()
            .collect()
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().unhealthy = !healthy;
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.data.write().latency = latency;
    }

    /// Delay only `operation` (e.g. `"set_active"`), overriding the store-wide latency.
    pub fn set_operation_latency(&self, operation: &str, latency: Option<Duration>) {
        let mut data = self.data.write();
        match latency {
            Some(latency) => data.operation_latency.insert(operation.to_string(), latency),
            None => data.operation_latency.remove(operation),
        };
    }

    /// Make vacation lookups for `user_id` fail as if the ledger were unreachable.
    pub fn fail_vacation_lookups_for(&self, user_id: UserId) {
        self.data.write().failing_vacation_users.insert(user_id);
    }

    /// Make `create_user` fail for `identity` as if the write were lost.
    pub fn fail_user_creation_for(&self, identity: Identity) {
        self.data.write().failing_identities.insert(identity);
    }

    /// Clear every injected fault.
    pub fn clear_faults(&self) {
        let mut data = self.data.write();
        data.unhealthy = false;
        data.latency = None;
        data.operation_latency.clear();
        data.failing_vacation_users.clear();
        data.failing_identities.clear();
    }

    /// Seed a user directly, bypassing the engine.
    pub fn insert_user(&self, organization_id: OrganizationId, user: &NewUser, active: bool) -> User {
        let mut data = self.data.write();
        let id = data.next_user_id();
        let record = User {
            id,
            organization_id,
            identity: user.identity.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            active,
            joined_at: user.joined_at,
        };
        data.users.insert(id, record.clone());
        record
    }

    /// Store a check-in without the uniqueness check, to reproduce corrupted data.
    pub fn insert_checkin_unchecked(&self, checkin: &NewCheckin) -> CheckinRecord {
        let mut data = self.data.write();
        let id = data.next_checkin_id();
        let record = CheckinRecord {
            id,
            user_id: checkin.user_id,
            period_start: checkin.period_start,
            submitted_at: checkin.submitted_at,
            reviewed: false,
            reviewed_by: None,
            reviewed_at: None,
        };
        data.checkins.insert(id, record.clone());
        record
    }

    /// Number of successful writes since creation.
    pub fn mutation_count(&self) -> u64 {
        self.data.read().mutations
    }

    pub fn user_count(&self) -> usize {
        self.data.read().users.len()
    }

    /// Sleep for the injected latency, then fail if the store is marked unhealthy.
    async fn enter(&self, operation: &str) -> RepositoryResult<()> {
        let latency = {
            let data = self.data.read();
            data.operation_latency.get(operation).copied().or(data.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.data.read().unhealthy {
            return Err(RepositoryError::connection_with_context(
                "Store is not healthy",
                ErrorContext::new(operation),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(!self.data.read().unhealthy)
    }

    async fn get_organization(&self, id: OrganizationId) -> RepositoryResult<Organization> {
        self.enter("get_organization").await?;
        self.data
            .read()
            .organizations
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Organization {} not found", id),
                    ErrorContext::new("get_organization")
                        .with_entity("organization")
                        .with_entity_id(id),
                )
            })
    }

    async fn list_organizations(&self) -> RepositoryResult<Vec<Organization>> {
        self.enter("list_organizations").await?;
        Ok(self.data.read().organizations.values().cloned().collect())
    }

    async fn store_organization(
        &self,
        organization: &NewOrganization,
    ) -> RepositoryResult<Organization> {
        self.enter("store_organization").await?;
        let mut data = self.data.write();
        let id = data.next_organization_id();
        let record = Organization {
            id,
            name: organization.name.clone(),
            week_start: organization.week_start,
            timezone: organization.timezone,
            directory_channel: organization.directory_channel.clone(),
        };
        data.organizations.insert(id, record.clone());
        data.mutations += 1;
        Ok(record)
    }
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn list_active_users(&self, organization_id: OrganizationId) -> RepositoryResult<Vec<User>> {
        self.enter("list_active_users").await?;
        Ok(self.data.read().users_of(organization_id, true))
    }

    async fn list_inactive_users(
        &self,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Vec<User>> {
        self.enter("list_inactive_users").await?;
        Ok(self.data.read().users_of(organization_id, false))
    }

    async fn get_user(&self, id: UserId) -> RepositoryResult<User> {
        self.enter("get_user").await?;
        self.data.read().user(id).cloned()
    }

    async fn create_user(
        &self,
        organization_id: OrganizationId,
        user: &NewUser,
    ) -> RepositoryResult<User> {
        self.enter("create_user").await?;
        let mut data = self.data.write();
        let context = ErrorContext::new("create_user")
            .with_entity("user")
            .with_entity_id(&user.identity);

        if data.failing_identities.contains(&user.identity) {
            return Err(RepositoryError::connection_with_context(
                "Write rejected by injected fault",
                context,
            ));
        }
        if !data.organizations.contains_key(&organization_id) {
            return Err(RepositoryError::not_found_with_context(
                format!("Organization {} not found", organization_id),
                context,
            ));
        }
        let taken = data
            .users
            .values()
            .any(|u| u.organization_id == organization_id && u.identity == user.identity);
        if taken {
            return Err(RepositoryError::conflict_with_context(
                format!("Identity {} already exists", user.identity),
                context,
            ));
        }

        let id = data.next_user_id();
        let record = User {
            id,
            organization_id,
            identity: user.identity.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            active: true,
            joined_at: user.joined_at,
        };
        data.users.insert(id, record.clone());
        data.mutations += 1;
        Ok(record)
    }

    async fn set_active(&self, id: UserId, active: bool) -> RepositoryResult<()> {
        self.enter("set_active").await?;
        let mut data = self.data.write();
        data.user(id)?;
        if let Some(user) = data.users.get_mut(&id) {
            user.active = active;
        }
        data.mutations += 1;
        Ok(())
    }
}

#[async_trait]
impl CheckinRepository for LocalRepository {
    async fn find_by_user_and_period(
        &self,
        user_id: UserId,
        period_start: NaiveDate,
    ) -> RepositoryResult<Option<CheckinRecord>> {
        self.enter("find_by_user_and_period").await?;
        let data = self.data.read();
        let mut matches = data
            .checkins
            .values()
            .filter(|c| c.user_id == user_id && c.period_start == period_start);
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(RepositoryError::integrity_with_context(
                "More than one check-in for the same user and period",
                ErrorContext::new("find_by_user_and_period")
                    .with_entity("checkin")
                    .with_entity_id(user_id)
                    .with_details(format!("period_start={}", period_start)),
            ));
        }
        Ok(first)
    }

    async fn list_by_org_and_period(
        &self,
        organization_id: OrganizationId,
        period_start: NaiveDate,
    ) -> RepositoryResult<Vec<CheckinRecord>> {
        self.enter("list_by_org_and_period").await?;
        let data = self.data.read();
        let members: HashMap<UserId, OrganizationId> = data
            .users
            .values()
            .map(|u| (u.id, u.organization_id))
            .collect();
        Ok(data
            .checkins
            .values()
            .filter(|c| {
                c.period_start == period_start
                    && members.get(&c.user_id) == Some(&organization_id)
            })
            .cloned()
            .collect())
    }

    async fn get_checkin(&self, id: CheckinId) -> RepositoryResult<CheckinRecord> {
        self.enter("get_checkin").await?;
        let mut data = self.data.write();
        data.checkin_mut(id, "get_checkin").map(|c| c.clone())
    }

    async fn create_checkin(&self, checkin: &NewCheckin) -> RepositoryResult<CheckinRecord> {
        self.enter("create_checkin").await?;
        let mut data = self.data.write();
        data.user(checkin.user_id)?;
        let exists = data
            .checkins
            .values()
            .any(|c| c.user_id == checkin.user_id && c.period_start == checkin.period_start);
        if exists {
            return Err(RepositoryError::conflict_with_context(
                "Check-in already submitted for this period",
                ErrorContext::new("create_checkin")
                    .with_entity("checkin")
                    .with_entity_id(checkin.user_id)
                    .with_details(format!("period_start={}", checkin.period_start)),
            ));
        }

        let id = data.next_checkin_id();
        let record = CheckinRecord {
            id,
            user_id: checkin.user_id,
            period_start: checkin.period_start,
            submitted_at: checkin.submitted_at,
            reviewed: false,
            reviewed_by: None,
            reviewed_at: None,
        };
        data.checkins.insert(id, record.clone());
        data.mutations += 1;
        Ok(record)
    }

    async fn mark_reviewed(
        &self,
        id: CheckinId,
        reviewer: UserId,
        reviewed_at: DateTime<Utc>,
    ) -> RepositoryResult<CheckinRecord> {
        self.enter("mark_reviewed").await?;
        let mut data = self.data.write();
        let record = data.checkin_mut(id, "mark_reviewed")?;
        record.reviewed = true;
        record.reviewed_by = Some(reviewer);
        record.reviewed_at = Some(reviewed_at);
        let record = record.clone();
        data.mutations += 1;
        Ok(record)
    }

    async fn reopen_checkin(&self, id: CheckinId) -> RepositoryResult<CheckinRecord> {
        self.enter("reopen_checkin").await?;
        let mut data = self.data.write();
        let record = data.checkin_mut(id, "reopen_checkin")?;
        record.reviewed = false;
        record.reviewed_by = None;
        record.reviewed_at = None;
        let record = record.clone();
        data.mutations += 1;
        Ok(record)
    }
}

#[async_trait]
impl VacationRepository for LocalRepository {
    async fn list_overlapping(
        &self,
        user_id: UserId,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> RepositoryResult<Vec<VacationEntry>> {
        self.enter("list_overlapping").await?;
        let data = self.data.read();
        if data.failing_vacation_users.contains(&user_id) {
            return Err(RepositoryError::connection_with_context(
                "Vacation ledger unreachable",
                ErrorContext::new("list_overlapping")
                    .with_entity("vacation")
                    .with_entity_id(user_id),
            ));
        }
        Ok(data
            .vacations
            .iter()
            .filter(|v| v.user_id == user_id && v.starts_on <= last_day && v.ends_on >= first_day)
            .cloned()
            .collect())
    }

    async fn add_vacation(&self, vacation: &NewVacation) -> RepositoryResult<VacationEntry> {
        self.enter("add_vacation").await?;
        if vacation.starts_on > vacation.ends_on {
            return Err(RepositoryError::validation(format!(
                "Vacation starts on {} after it ends on {}",
                vacation.starts_on, vacation.ends_on
            )));
        }
        let mut data = self.data.write();
        data.user(vacation.user_id)?;
        let id = data.next_vacation_id();
        let entry = VacationEntry {
            id,
            user_id: vacation.user_id,
            starts_on: vacation.starts_on,
            ends_on: vacation.ends_on,
        };
        data.vacations.push(entry.clone());
        data.mutations += 1;
        Ok(entry)
    }
}
