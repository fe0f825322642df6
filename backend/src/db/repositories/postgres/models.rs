use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use super::schema::{checkins, organizations, users, vacations};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = organizations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // created_at is only used by ad-hoc queries
pub struct OrganizationRow {
    pub organization_id: i64,
    pub name: String,
    pub week_start: i16,
    pub timezone: String,
    pub directory_channel: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganizationRow {
    pub name: String,
    pub week_start: i16,
    pub timezone: String,
    pub directory_channel: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub user_id: i64,
    pub organization_id: i64,
    pub identity: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub organization_id: i64,
    pub identity: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = checkins)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CheckinRow {
    pub checkin_id: i64,
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    pub reviewed: bool,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = checkins)]
pub struct NewCheckinRow {
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = vacations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VacationRow {
    pub vacation_id: i64,
    pub user_id: i64,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = vacations)]
pub struct NewVacationRow {
    pub user_id: i64,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}
