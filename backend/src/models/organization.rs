//! Organizations (tenants).

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::calendar::WeekCalendar;
use crate::define_id_type;

define_id_type!(i64, OrganizationId);

/// A tenant. Owns its users and decides how reporting weeks are cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// Weekday on which every reporting period starts.
    pub week_start: Weekday,
    /// Zone in which period boundaries fall on local midnight.
    pub timezone: Tz,
    /// Channel or group in the external directory whose members make up the roster.
    pub directory_channel: Option<String>,
}

impl Organization {
    pub fn calendar(&self) -> WeekCalendar {
        WeekCalendar::new(self.week_start, self.timezone)
    }
}

/// Input for creating an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub week_start: Weekday,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default)]
    pub directory_channel: Option<String>,
}

fn default_timezone() -> Tz {
    Tz::UTC
}

impl NewOrganization {
    pub fn new(name: impl Into<String>, week_start: Weekday) -> Self {
        Self {
            name: name.into(),
            week_start,
            timezone: Tz::UTC,
            directory_channel: None,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_directory_channel(mut self, channel: impl Into<String>) -> Self {
        self.directory_channel = Some(channel.into());
        self
    }
}
