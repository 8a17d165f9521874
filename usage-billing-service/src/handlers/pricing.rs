use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::ApiResponse;

use crate::dtos::{ActivePricingResponse, CreatePricingRequest};
use crate::handlers::track;
use crate::AppState;

/// `GET /admin/pricing/active`
pub async fn get_active_pricing(
    State(state): State<AppState>,
) -> Result<ApiResponse<ActivePricingResponse>, AppError> {
    let pricing = state
        .pricing
        .get_active_pricing()
        .await
        .map_err(track("get_active_pricing"))?;

    Ok(ApiResponse::ok(ActivePricingResponse {
        is_fallback: pricing.is_fallback(),
        pricing,
    }))
}

/// `POST /admin/pricing`
pub async fn publish_pricing(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreatePricingRequest>,
) -> Result<Response, AppError> {
    let pricing = state
        .pricing
        .publish(payload.into())
        .await
        .map_err(track("publish_pricing"))?;

    Ok(ApiResponse::ok(pricing).with_status(StatusCode::CREATED))
}
