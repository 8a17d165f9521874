//! Payment provider webhook.
//!
//! Verifies the delivery signature before anything is parsed. Only completed
//! checkouts are acted on; every other event is acknowledged so the provider
//! stops retrying.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use service_core::error::AppError;

use crate::services::checkout::{parse_event, CHECKOUT_COMPLETED, SIGNATURE_HEADER};
use crate::services::record_webhook_event;
use crate::AppState;

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing {} header", SIGNATURE_HEADER);
            record_webhook_event("unknown", "invalid_signature");
            AppError::BadRequest(anyhow::anyhow!("Missing webhook signature"))
        })?;

    if let Err(e) = state
        .verifier
        .verify(&body, signature, Utc::now().timestamp())
    {
        tracing::warn!(error = %e, "Invalid webhook signature");
        record_webhook_event("unknown", "invalid_signature");
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = parse_event(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        record_webhook_event("unknown", "malformed");
        AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
    })?;

    tracing::info!(
        event_id = ?event.id,
        event_type = %event.event_type,
        "Processing payment webhook"
    );

    if event.event_type != CHECKOUT_COMPLETED {
        tracing::debug!(event_type = %event.event_type, "Unhandled webhook event type");
        record_webhook_event("other", "ignored");
        return Ok(StatusCode::OK);
    }

    let session = &event.data.object;
    let Some(input) = session.enrollment() else {
        tracing::warn!(
            session_id = ?session.id,
            "Checkout completed without orgId, courseId and userId metadata"
        );
        record_webhook_event(CHECKOUT_COMPLETED, "ignored");
        return Ok(StatusCode::OK);
    };

    let organization = state
        .store
        .get_organization(input.org_id)
        .await
        .map_err(|e| {
            tracing::error!(org_id = %input.org_id, error = %e, "Failed to look up organization");
            record_webhook_event(CHECKOUT_COMPLETED, "failed");
            AppError::from(e)
        })?;
    if organization.is_none() {
        tracing::warn!(
            session_id = ?session.id,
            org_id = %input.org_id,
            "Checkout completed for unknown organization"
        );
        record_webhook_event(CHECKOUT_COMPLETED, "ignored");
        return Ok(StatusCode::OK);
    }

    let enrollment = state.store.activate_enrollment(&input).await.map_err(|e| {
        tracing::error!(
            org_id = %input.org_id,
            course_id = %input.course_id,
            user_id = %input.user_id,
            error = %e,
            "Failed to activate enrollment from webhook"
        );
        record_webhook_event(CHECKOUT_COMPLETED, "failed");
        AppError::from(e)
    })?;

    drop(state.recorder.student_active(
        enrollment.org_id,
        enrollment.user_id,
        enrollment.course_id,
        enrollment.payment_reference.as_deref(),
    ));

    tracing::info!(
        enrollment_id = %enrollment.id,
        org_id = %enrollment.org_id,
        user_id = %enrollment.user_id,
        "Enrollment activated via webhook"
    );
    record_webhook_event(CHECKOUT_COMPLETED, "processed");

    // Always acknowledge once handled.
    Ok(StatusCode::OK)
}
