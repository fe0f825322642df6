//! Postgres repository implementation using Diesel.
//!
//! Stores organizations, the roster, check-ins and the vacation ledger. Uniqueness that the
//! engine relies on is enforced by the schema: one check-in per user and period, and one user
//! per lowercased identity within an organization.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Retry with backoff for transient failures
//! - Every call runs in a transaction that rolls back if the caller has given up
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;

use super::blocking::{run_blocking, RetryPolicy};
use crate::db::repository::{
    CheckinRepository, ErrorContext, OrganizationRepository, RepositoryError, RepositoryResult,
    UserRepository, VacationRepository,
};
use crate::models::{
    CheckinId, CheckinRecord, Identity, NewCheckin, NewOrganization, NewUser, NewVacation,
    Organization, OrganizationId, Role, User, UserId, VacationEntry, VacationId,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Pool and retry settings for [`PostgresRepository`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub connection_timeout_sec: u64,
    pub idle_timeout_sec: u64,
    /// Extra attempts after a retryable failure.
    pub max_retries: u32,
    /// First backoff between attempts, doubled each time.
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

impl PostgresConfig {
    /// Read `DATABASE_URL` (or `PG_DATABASE_URL`) and the `PG_*` pool variables listed in the
    /// module docs. Unset or unparsable pool variables keep their defaults.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;
        let defaults = Self::default();

        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Diesel-backed store for organizations, users, check-ins and vacations.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Build the pool and apply pending migrations. Blocks; call from `spawn_blocking`.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        let mut conn = pool.get().map_err(|e| {
            RepositoryError::connection_with_context(
                e.to_string(),
                ErrorContext::new("run_migrations"),
            )
        })?;
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;
        drop(conn);

        Ok(Self { pool, config })
    }

    /// Run `f` inside a transaction on a pooled connection, retrying retryable failures.
    ///
    /// If the caller stops waiting (store timeout or cancellation), no further attempt starts
    /// and a running attempt rolls back instead of committing.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        run_blocking(operation, self.config.retry_policy(), move |abandoned| {
            let mut pooled = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new(operation)
                        .with_details("get_connection")
                        .retryable(),
                )
            })?;
            abandoned.check(operation)?;
            let conn: &mut PgConnection = &mut pooled;
            let f = f.clone();
            conn.transaction::<T, RepositoryError, _>(|tx| {
                let out = f(tx)?;
                abandoned.check(operation)?;
                Ok(out)
            })
        })
        .await
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn weekday_to_db(weekday: Weekday) -> i16 {
    weekday.num_days_from_monday() as i16
}

fn weekday_from_db(value: i16) -> RepositoryResult<Weekday> {
    u8::try_from(value)
        .ok()
        .and_then(|v| Weekday::try_from(v).ok())
        .ok_or_else(|| {
            RepositoryError::integrity_with_context(
                format!("Stored week start {} is not a weekday", value),
                ErrorContext::new("decode_organization").with_entity("organization"),
            )
        })
}

fn row_to_organization(row: OrganizationRow) -> RepositoryResult<Organization> {
    let timezone: Tz = row.timezone.parse().map_err(|_| {
        RepositoryError::integrity_with_context(
            format!("Stored timezone '{}' is not an IANA zone", row.timezone),
            ErrorContext::new("decode_organization")
                .with_entity("organization")
                .with_entity_id(row.organization_id),
        )
    })?;
    Ok(Organization {
        id: OrganizationId(row.organization_id),
        name: row.name,
        week_start: weekday_from_db(row.week_start)?,
        timezone,
        directory_channel: row.directory_channel,
    })
}

fn row_to_user(row: UserRow) -> RepositoryResult<User> {
    let context = || {
        ErrorContext::new("decode_user")
            .with_entity("user")
            .with_entity_id(row.user_id)
    };
    let identity = Identity::parse(&row.identity)
        .map_err(|e| RepositoryError::integrity_with_context(e.to_string(), context()))?;
    let role: Role = row
        .role
        .parse()
        .map_err(|e: String| RepositoryError::integrity_with_context(e, context()))?;
    Ok(User {
        id: UserId(row.user_id),
        organization_id: OrganizationId(row.organization_id),
        identity,
        display_name: row.display_name,
        role,
        active: row.active,
        joined_at: row.joined_at,
    })
}

fn rows_to_users(rows: Vec<UserRow>) -> RepositoryResult<Vec<User>> {
    rows.into_iter().map(row_to_user).collect()
}

fn row_to_checkin(row: CheckinRow) -> CheckinRecord {
    CheckinRecord {
        id: CheckinId(row.checkin_id),
        user_id: UserId(row.user_id),
        period_start: row.period_start,
        submitted_at: row.submitted_at,
        reviewed: row.reviewed,
        reviewed_by: row.reviewed_by.map(UserId),
        reviewed_at: row.reviewed_at,
    }
}

fn row_to_vacation(row: VacationRow) -> VacationEntry {
    VacationEntry {
        id: VacationId(row.vacation_id),
        user_id: UserId(row.user_id),
        starts_on: row.starts_on,
        ends_on: row.ends_on,
    }
}

fn not_found(entity: &str, operation: &str, id: impl ToString) -> RepositoryError {
    let id = id.to_string();
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::new(operation)
            .with_entity(entity)
            .with_entity_id(id),
    )
}

#[async_trait]
impl OrganizationRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn("health_check", |conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn get_organization(&self, id: OrganizationId) -> RepositoryResult<Organization> {
        self.with_conn("get_organization", move |conn| {
            let row = organizations::table
                .filter(organizations::organization_id.eq(id.value()))
                .select(OrganizationRow::as_select())
                .first::<OrganizationRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("organization", "get_organization", id))?;
            row_to_organization(row)
        })
        .await
    }

    async fn list_organizations(&self) -> RepositoryResult<Vec<Organization>> {
        self.with_conn("list_organizations", |conn| {
            organizations::table
                .order(organizations::organization_id.asc())
                .select(OrganizationRow::as_select())
                .load::<OrganizationRow>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(row_to_organization)
                .collect()
        })
        .await
    }

    async fn store_organization(
        &self,
        organization: &NewOrganization,
    ) -> RepositoryResult<Organization> {
        let row = NewOrganizationRow {
            name: organization.name.clone(),
            week_start: weekday_to_db(organization.week_start),
            timezone: organization.timezone.name().to_string(),
            directory_channel: organization.directory_channel.clone(),
        };
        self.with_conn("store_organization", move |conn| {
            let inserted = diesel::insert_into(organizations::table)
                .values(&row)
                .returning(OrganizationRow::as_returning())
                .get_result(conn)
                .map_err(map_diesel_error)?;
            row_to_organization(inserted)
        })
        .await
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn list_active_users(&self, organization_id: OrganizationId) -> RepositoryResult<Vec<User>> {
        self.with_conn("list_active_users", move |conn| {
            let rows = users::table
                .filter(users::organization_id.eq(organization_id.value()))
                .filter(users::active.eq(true))
                .order(users::user_id.asc())
                .select(UserRow::as_select())
                .load::<UserRow>(conn)
                .map_err(map_diesel_error)?;
            rows_to_users(rows)
        })
        .await
    }

    async fn list_inactive_users(
        &self,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Vec<User>> {
        self.with_conn("list_inactive_users", move |conn| {
            let rows = users::table
                .filter(users::organization_id.eq(organization_id.value()))
                .filter(users::active.eq(false))
                .order(users::user_id.asc())
                .select(UserRow::as_select())
                .load::<UserRow>(conn)
                .map_err(map_diesel_error)?;
            rows_to_users(rows)
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> RepositoryResult<User> {
        self.with_conn("get_user", move |conn| {
            let row = users::table
                .filter(users::user_id.eq(id.value()))
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("user", "get_user", id))?;
            row_to_user(row)
        })
        .await
    }

    async fn create_user(
        &self,
        organization_id: OrganizationId,
        user: &NewUser,
    ) -> RepositoryResult<User> {
        let row = NewUserRow {
            organization_id: organization_id.value(),
            identity: user.identity.as_str().to_string(),
            display_name: user.display_name.clone(),
            role: user.role.as_str().to_string(),
            active: true,
            joined_at: user.joined_at,
        };
        self.with_conn("create_user", move |conn| {
            let inserted = diesel::insert_into(users::table)
                .values(&row)
                .returning(UserRow::as_returning())
                .get_result(conn)
                .map_err(|e| {
                    map_diesel_error(e).with_operation("create_user")
                })?;
            row_to_user(inserted)
        })
        .await
    }

    async fn set_active(&self, id: UserId, active: bool) -> RepositoryResult<()> {
        self.with_conn("set_active", move |conn| {
            let updated = diesel::update(users::table.filter(users::user_id.eq(id.value())))
                .set(users::active.eq(active))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(not_found("user", "set_active", id));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CheckinRepository for PostgresRepository {
    async fn find_by_user_and_period(
        &self,
        user_id: UserId,
        period_start: NaiveDate,
    ) -> RepositoryResult<Option<CheckinRecord>> {
        self.with_conn("find_by_user_and_period", move |conn| {
            let mut rows = checkins::table
                .filter(checkins::user_id.eq(user_id.value()))
                .filter(checkins::period_start.eq(period_start))
                .limit(2)
                .select(CheckinRow::as_select())
                .load::<CheckinRow>(conn)
                .map_err(map_diesel_error)?;
            if rows.len() > 1 {
                return Err(RepositoryError::integrity_with_context(
                    "More than one check-in for the same user and period",
                    ErrorContext::new("find_by_user_and_period")
                        .with_entity("checkin")
                        .with_entity_id(user_id)
                        .with_details(format!("period_start={}", period_start)),
                ));
            }
            Ok(rows.pop().map(row_to_checkin))
        })
        .await
    }

    async fn list_by_org_and_period(
        &self,
        organization_id: OrganizationId,
        period_start: NaiveDate,
    ) -> RepositoryResult<Vec<CheckinRecord>> {
        self.with_conn("list_by_org_and_period", move |conn| {
            let rows = checkins::table
                .inner_join(users::table)
                .filter(users::organization_id.eq(organization_id.value()))
                .filter(checkins::period_start.eq(period_start))
                .order(checkins::checkin_id.asc())
                .select(CheckinRow::as_select())
                .load::<CheckinRow>(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(row_to_checkin).collect())
        })
        .await
    }

    async fn get_checkin(&self, id: CheckinId) -> RepositoryResult<CheckinRecord> {
        self.with_conn("get_checkin", move |conn| {
            checkins::table
                .filter(checkins::checkin_id.eq(id.value()))
                .select(CheckinRow::as_select())
                .first::<CheckinRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(row_to_checkin)
                .ok_or_else(|| not_found("checkin", "get_checkin", id))
        })
        .await
    }

    async fn create_checkin(&self, checkin: &NewCheckin) -> RepositoryResult<CheckinRecord> {
        let row = NewCheckinRow {
            user_id: checkin.user_id.value(),
            period_start: checkin.period_start,
            submitted_at: checkin.submitted_at,
        };
        self.with_conn("create_checkin", move |conn| {
            diesel::insert_into(checkins::table)
                .values(&row)
                .returning(CheckinRow::as_returning())
                .get_result(conn)
                .map(row_to_checkin)
                .map_err(|e| map_diesel_error(e).with_operation("create_checkin"))
        })
        .await
    }

    async fn mark_reviewed(
        &self,
        id: CheckinId,
        reviewer: UserId,
        reviewed_at: DateTime<Utc>,
    ) -> RepositoryResult<CheckinRecord> {
        self.with_conn("mark_reviewed", move |conn| {
            diesel::update(checkins::table.filter(checkins::checkin_id.eq(id.value())))
                .set((
                    checkins::reviewed.eq(true),
                    checkins::reviewed_by.eq(Some(reviewer.value())),
                    checkins::reviewed_at.eq(Some(reviewed_at)),
                ))
                .returning(CheckinRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(row_to_checkin)
                .ok_or_else(|| not_found("checkin", "mark_reviewed", id))
        })
        .await
    }

    async fn reopen_checkin(&self, id: CheckinId) -> RepositoryResult<CheckinRecord> {
        self.with_conn("reopen_checkin", move |conn| {
            diesel::update(checkins::table.filter(checkins::checkin_id.eq(id.value())))
                .set((
                    checkins::reviewed.eq(false),
                    checkins::reviewed_by.eq(None::<i64>),
                    checkins::reviewed_at.eq(None::<DateTime<Utc>>),
                ))
                .returning(CheckinRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(row_to_checkin)
                .ok_or_else(|| not_found("checkin", "reopen_checkin", id))
        })
        .await
    }
}

#[async_trait]
impl VacationRepository for PostgresRepository {
    async fn list_overlapping(
        &self,
        user_id: UserId,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> RepositoryResult<Vec<VacationEntry>> {
        self.with_conn("list_overlapping", move |conn| {
            let rows = vacations::table
                .filter(vacations::user_id.eq(user_id.value()))
                .filter(vacations::starts_on.le(last_day))
                .filter(vacations::ends_on.ge(first_day))
                .select(VacationRow::as_select())
                .load::<VacationRow>(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(row_to_vacation).collect())
        })
        .await
    }

    async fn add_vacation(&self, vacation: &NewVacation) -> RepositoryResult<VacationEntry> {
        if vacation.starts_on > vacation.ends_on {
            return Err(RepositoryError::validation(format!(
                "Vacation starts on {} after it ends on {}",
                vacation.starts_on, vacation.ends_on
            )));
        }
        let row = NewVacationRow {
            user_id: vacation.user_id.value(),
            starts_on: vacation.starts_on,
            ends_on: vacation.ends_on,
        };
        self.with_conn("add_vacation", move |conn| {
            diesel::insert_into(vacations::table)
                .values(&row)
                .returning(VacationRow::as_returning())
                .get_result(conn)
                .map(row_to_vacation)
                .map_err(map_diesel_error)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_encoding_is_monday_based() {
        assert_eq!(weekday_to_db(Weekday::Mon), 0);
        assert_eq!(weekday_to_db(Weekday::Sun), 6);
        assert_eq!(weekday_from_db(5).unwrap(), Weekday::Sat);
        assert!(weekday_from_db(7).is_err());
        assert!(weekday_from_db(-1).is_err());
    }

    #[test]
    fn test_user_row_with_bad_role_is_integrity_error() {
        let row = UserRow {
            user_id: 1,
            organization_id: 1,
            identity: "ann@acme.io".into(),
            display_name: "Ann".into(),
            role: "owner".into(),
            active: true,
            joined_at: Utc::now(),
        };
        assert!(matches!(
            row_to_user(row),
            Err(RepositoryError::IntegrityError { .. })
        ));
    }

    #[test]
    fn test_config_with_url_uses_defaults() {
        let config = PostgresConfig::with_url("postgres://localhost/checkins");
        assert_eq!(config.max_pool_size, 10);
        assert_eq!(config.max_retries, 3);
    }
}
