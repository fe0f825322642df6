//! Data Transfer Objects for the HTTP API.
//!
//! Engine results (`Classification`, `ReconciliationResult`, ...) are serialized as-is; this
//! module only holds request bodies, query strings and the few response wrappers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;
use crate::services::PeriodSelector;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Largest accepted `offset`, in periods.
pub const MAX_PERIOD_OFFSET: u32 = 10_000;

/// Query string of the classification endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodQuery {
    /// `current`, `previous` or a `YYYY-MM-DD` local date.
    pub period: Option<String>,
    /// Shift relative to `current` or `previous`.
    pub offset: Option<i32>,
}

impl PeriodQuery {
    pub fn selector(&self) -> Result<PeriodSelector, String> {
        let base = match self.period.as_deref().map(str::trim) {
            None | Some("") | Some("current") => PeriodSelector::Current,
            Some("previous") => PeriodSelector::Previous,
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(PeriodSelector::Containing)
                .map_err(|_| {
                    format!(
                        "period must be 'current', 'previous' or YYYY-MM-DD, got '{}'",
                        raw
                    )
                })?,
        };

        if let Some(n) = self.offset {
            if n.unsigned_abs() > MAX_PERIOD_OFFSET {
                return Err(format!(
                    "offset must be within -{0}..={0}, got {1}",
                    MAX_PERIOD_OFFSET, n
                ));
            }
        }

        match (base, self.offset) {
            (base, None) | (base, Some(0)) => Ok(base),
            (PeriodSelector::Current, Some(n)) => Ok(PeriodSelector::Offset(n)),
            (PeriodSelector::Previous, Some(n)) => n
                .checked_sub(1)
                .map(PeriodSelector::Offset)
                .ok_or_else(|| "offset out of range".to_string()),
            (_, Some(_)) => Err("offset cannot be combined with a date".to_string()),
        }
    }
}

/// Organization creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    /// English weekday name or abbreviation.
    pub week_start: String,
    /// IANA time zone, UTC when omitted.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub directory_channel: Option<String>,
}

/// Optional body of the reconcile endpoint; without it the directory is queried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub members: Option<Vec<String>>,
    /// Admin on whose behalf the run is made; checked when present.
    #[serde(default)]
    pub requested_by: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitCheckinRequest {
    /// Submission instant, now when omitted.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCheckinRequest {
    pub reviewer_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordVacationRequest {
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(period: Option<&str>, offset: Option<i32>) -> PeriodQuery {
        PeriodQuery {
            period: period.map(str::to_string),
            offset,
        }
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(query(None, None).selector().unwrap(), PeriodSelector::Current);
        assert_eq!(
            query(Some("previous"), None).selector().unwrap(),
            PeriodSelector::Previous
        );
        assert_eq!(
            query(Some("current"), Some(-3)).selector().unwrap(),
            PeriodSelector::Offset(-3)
        );
        assert_eq!(
            query(Some("previous"), Some(-1)).selector().unwrap(),
            PeriodSelector::Offset(-2)
        );
        assert_eq!(
            query(Some("2024-03-06"), None).selector().unwrap(),
            PeriodSelector::Containing(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap())
        );
    }

    #[test]
    fn test_selector_rejects_garbage() {
        assert!(query(Some("last-week"), None).selector().is_err());
        assert!(query(Some("2024-03-06"), Some(1)).selector().is_err());
        assert!(query(Some("previous"), Some(i32::MIN)).selector().is_err());
    }

    #[test]
    fn test_selector_bounds_offset() {
        let max = MAX_PERIOD_OFFSET as i32;
        assert_eq!(
            query(None, Some(-max)).selector().unwrap(),
            PeriodSelector::Offset(-max)
        );
        assert!(query(None, Some(max + 1)).selector().is_err());
        assert!(query(Some("current"), Some(i32::MAX)).selector().is_err());
        assert!(query(Some("previous"), Some(-max - 1)).selector().is_err());
    }
}
