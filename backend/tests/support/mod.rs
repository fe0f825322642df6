#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use checkin_backend::db::repositories::LocalRepository;
use checkin_backend::db::repository::{OrganizationRepository, UserRepository};
use checkin_backend::directory::StaticDirectory;
use checkin_backend::models::{Identity, NewOrganization, NewUser, Organization, Role, User};
use checkin_backend::services::{CheckinEngine, EngineConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub const CHANNEL: &str = "C-TEAM";

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// Engine over an in-memory store and directory, with one organization.
pub struct Fixture {
    pub repo: LocalRepository,
    pub directory: StaticDirectory,
    pub engine: CheckinEngine,
    pub org: Organization,
}

impl Fixture {
    pub async fn new(week_start: Weekday) -> Self {
        Self::with_config(week_start, Tz::UTC, EngineConfig::default()).await
    }

    pub async fn with_config(week_start: Weekday, timezone: Tz, config: EngineConfig) -> Self {
        let repo = LocalRepository::new();
        let directory = StaticDirectory::new();
        let org = repo
            .store_organization(
                &NewOrganization::new("Acme", week_start)
                    .with_timezone(timezone)
                    .with_directory_channel(CHANNEL),
            )
            .await
            .unwrap();
        let engine = CheckinEngine::new(
            Arc::new(repo.clone()),
            Arc::new(directory.clone()),
            config,
        );
        Self {
            repo,
            directory,
            engine,
            org,
        }
    }

    /// Add an active member who joined at `joined_at`.
    pub async fn member(&self, identity: &str, joined_at: DateTime<Utc>) -> User {
        self.user(identity, Role::Member, joined_at).await
    }

    pub async fn user(&self, identity: &str, role: Role, joined_at: DateTime<Utc>) -> User {
        let new_user =
            NewUser::from_identity(Identity::parse(identity).unwrap(), joined_at).with_role(role);
        self.repo.create_user(self.org.id, &new_user).await.unwrap()
    }

    /// Seed a deactivated member without going through the engine.
    pub fn inactive(&self, identity: &str, joined_at: DateTime<Utc>) -> User {
        let new_user = NewUser::from_identity(Identity::parse(identity).unwrap(), joined_at);
        self.repo.insert_user(self.org.id, &new_user, false)
    }
}
