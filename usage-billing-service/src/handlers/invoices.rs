//! Admin invoice endpoints.

use axum::extract::State;
use service_core::error::AppError;
use service_core::extract::{ValidatedJson, ValidatedPath, ValidatedQuery};
use service_core::response::ApiResponse;
use uuid::Uuid;

use crate::dtos::{GenerateInvoiceRequest, ListInvoicesQuery, MarkPaidRequest, SendInvoiceRequest};
use crate::models::{Invoice, ListInvoicesFilter};
use crate::handlers::track;
use crate::AppState;

/// `POST /admin/invoices/generate`
pub async fn generate_invoice(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<GenerateInvoiceRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    tracing::info!(
        org_id = %payload.org_id,
        period_start = ?payload.period_start,
        period_end = ?payload.period_end,
        "Generating invoice"
    );

    let invoice = state
        .invoices
        .create(payload.org_id, payload.period_start, payload.period_end)
        .await
        .map_err(track("generate_invoice"))?;

    Ok(ApiResponse::ok(invoice))
}

/// `POST /admin/invoices/send`
pub async fn send_invoice(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SendInvoiceRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    let invoice = state
        .invoices
        .send(payload.invoice_id)
        .await
        .map_err(track("send_invoice"))?;

    Ok(ApiResponse::ok(invoice))
}

/// `POST /admin/invoices/mark-paid`
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<MarkPaidRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    let invoice = state
        .invoices
        .mark_paid(payload.invoice_id, payload.amount_paid)
        .await
        .map_err(track("mark_invoice_paid"))?;

    Ok(ApiResponse::ok(invoice))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    ValidatedPath(invoice_id): ValidatedPath<Uuid>,
) -> Result<ApiResponse<Invoice>, AppError> {
    let invoice = state
        .invoices
        .get(invoice_id)
        .await
        .map_err(track("get_invoice"))?;

    Ok(ApiResponse::ok(invoice))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListInvoicesQuery>,
) -> Result<ApiResponse<Vec<Invoice>>, AppError> {
    let filter = ListInvoicesFilter {
        org_id: query.org_id,
        status: query.status,
        limit: query.limit(),
    };

    let invoices = state
        .invoices
        .list(filter)
        .await
        .map_err(track("list_invoices"))?;

    Ok(ApiResponse::ok(invoices))
}
