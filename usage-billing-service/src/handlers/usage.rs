use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::extract::{ValidatedJson, ValidatedPath, ValidatedQuery};
use service_core::response::ApiResponse;
use uuid::Uuid;

use crate::dtos::{UsageEventAccepted, UsageEventRequest, UsageQuery, UsageResponse};
use crate::models::{BillingPeriod, RecordUsage};
use crate::handlers::track;
use crate::services::{compute_line_items, BillingError};
use crate::AppState;

/// `GET /admin/orgs/{org_id}/usage`
///
/// Snapshot for the period plus the line items an invoice would carry.
/// Nothing is persisted.
pub async fn get_org_usage(
    State(state): State<AppState>,
    ValidatedPath(org_id): ValidatedPath<Uuid>,
    ValidatedQuery(query): ValidatedQuery<UsageQuery>,
) -> Result<ApiResponse<UsageResponse>, AppError> {
    let period = BillingPeriod::resolve(
        query.period_start,
        query.period_end,
        Utc::now().date_naive(),
    )
    .map_err(|e| track("get_org_usage")(BillingError::Validation(e)))?;

    let usage = state
        .aggregator
        .get_usage(org_id, period)
        .await
        .map_err(track("get_org_usage"))?;
    let pricing = state
        .pricing
        .get_active_pricing()
        .await
        .map_err(track("get_org_usage"))?;
    let preview = compute_line_items(&usage, &pricing);

    Ok(ApiResponse::ok(UsageResponse {
        org_id,
        period,
        usage,
        pricing,
        preview,
    }))
}

/// `POST /internal/usage-events`
///
/// Accepted as soon as the payload is valid; the write happens in the
/// background.
pub async fn record_usage_event(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<UsageEventRequest>,
) -> Response {
    let accepted = UsageEventAccepted {
        org_id: payload.org_id,
        event_type: payload.event_type,
    };

    // Detached; the recorder logs its own failures.
    drop(state.recorder.record(RecordUsage::from(payload)));

    ApiResponse::ok(accepted).with_status(StatusCode::ACCEPTED)
}
