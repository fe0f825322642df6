//! HTTP handlers for the REST API.
//!
//! Handlers only parse input, call the engine and serialize the result.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::collections::HashSet;

use super::dto::{
    CreateOrganizationRequest, HealthResponse, PeriodQuery, ReconcileRequest,
    RecordVacationRequest, ReviewCheckinRequest, SubmitCheckinRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::models::{
    parse_timezone, parse_weekday, CheckinId, CheckinRecord, NewOrganization, Organization,
    OrganizationId, UserId, VacationEntry,
};
use crate::services::{
    Classification, EngineError, OutstandingReport, PastDue, ReconciliationResult,
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Parse a JSON body that may be absent; an empty body yields `T::default()`.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match state.engine.repository().health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Organizations
// =============================================================================

/// POST /v1/organizations
pub async fn create_organization(
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".into()));
    }
    let week_start = parse_weekday(&request.week_start).map_err(EngineError::from)?;
    let mut organization = NewOrganization::new(request.name.trim(), week_start);
    if let Some(tz) = request.timezone.as_deref() {
        organization = organization.with_timezone(parse_timezone(tz).map_err(EngineError::from)?);
    }
    if let Some(channel) = request.directory_channel {
        organization = organization.with_directory_channel(channel);
    }

    let stored = state
        .engine
        .repository()
        .store_organization(&organization)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

// =============================================================================
// Classification
// =============================================================================

/// GET /v1/organizations/{org_id}/checkins?period=current|previous|YYYY-MM-DD&offset=n
pub async fn get_checkins(
    State(state): State<AppState>,
    Path(org_id): Path<i64>,
    Query(query): Query<PeriodQuery>,
) -> HandlerResult<Classification> {
    let selector = query.selector().map_err(AppError::BadRequest)?;
    let mut classification = state
        .engine
        .classify(
            OrganizationId::new(org_id),
            selector,
            Utc::now(),
            &state.request_token(),
        )
        .await?;
    classification.sort_by_display_name();
    Ok(Json(classification))
}

/// GET /v1/organizations/{org_id}/checkins/outstanding
pub async fn get_outstanding(
    State(state): State<AppState>,
    Path(org_id): Path<i64>,
) -> HandlerResult<OutstandingReport> {
    let mut report = state
        .engine
        .classify_all_outstanding(
            OrganizationId::new(org_id),
            Utc::now(),
            &state.request_token(),
        )
        .await?;
    report
        .periods
        .iter_mut()
        .for_each(Classification::sort_by_display_name);
    Ok(Json(report))
}

/// GET /v1/organizations/{org_id}/checkins/past-due
pub async fn get_past_due(
    State(state): State<AppState>,
    Path(org_id): Path<i64>,
) -> HandlerResult<PastDue> {
    let mut past_due = state
        .engine
        .past_due(
            OrganizationId::new(org_id),
            Utc::now(),
            &state.request_token(),
        )
        .await?;
    past_due
        .users
        .sort_by_key(|u| (u.display_name.to_lowercase(), u.id));
    Ok(Json(past_due))
}

// =============================================================================
// Roster
// =============================================================================

/// POST /v1/organizations/{org_id}/roster/reconcile
///
/// Without a body the organization's directory channel is fetched; a body with `members`
/// reconciles against that list instead.
pub async fn reconcile_roster(
    State(state): State<AppState>,
    Path(org_id): Path<i64>,
    body: Bytes,
) -> HandlerResult<ReconciliationResult> {
    let org = OrganizationId::new(org_id);
    let cancel = state.request_token();
    let request = optional_body::<ReconcileRequest>(&body)?;
    if let Some(actor) = request.requested_by {
        state.engine.authorize_roster_change(actor, org).await?;
    }

    let result = match request.members {
        Some(members) => {
            let members: HashSet<String> = members.into_iter().collect();
            state.engine.reconcile_members(org, &members, &cancel).await?
        }
        None => state.engine.reconcile(org, &cancel).await?,
    };
    Ok(Json(result))
}

// =============================================================================
// Check-ins and vacations
// =============================================================================

/// POST /v1/users/{user_id}/checkins
pub async fn submit_checkin(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    body: Bytes,
) -> Result<(StatusCode, Json<CheckinRecord>), AppError> {
    let at = optional_body::<SubmitCheckinRequest>(&body)?
        .submitted_at
        .unwrap_or_else(Utc::now);
    let record = state
        .engine
        .submit_checkin(UserId::new(user_id), at)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /v1/checkins/{id}/review
pub async fn review_checkin(
    State(state): State<AppState>,
    Path(checkin_id): Path<i64>,
    Json(request): Json<ReviewCheckinRequest>,
) -> HandlerResult<CheckinRecord> {
    let record = state
        .engine
        .review_checkin(CheckinId::new(checkin_id), request.reviewer_id, Utc::now())
        .await?;
    Ok(Json(record))
}

/// POST /v1/checkins/{id}/reopen
pub async fn reopen_checkin(
    State(state): State<AppState>,
    Path(checkin_id): Path<i64>,
) -> HandlerResult<CheckinRecord> {
    let record = state
        .engine
        .reopen_checkin(CheckinId::new(checkin_id))
        .await?;
    Ok(Json(record))
}

/// POST /v1/users/{user_id}/vacations
pub async fn record_vacation(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<RecordVacationRequest>,
) -> Result<(StatusCode, Json<VacationEntry>), AppError> {
    let entry = state
        .engine
        .record_vacation(UserId::new(user_id), request.starts_on, request.ends_on)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
