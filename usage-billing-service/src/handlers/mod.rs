pub mod health;
pub mod invoices;
pub mod pricing;
pub mod usage;
pub mod webhook;

use service_core::error::AppError;

use crate::services::{record_error, BillingError};

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use invoices::{generate_invoice, get_invoice, list_invoices, mark_invoice_paid, send_invoice};
pub use pricing::{get_active_pricing, publish_pricing};
pub use usage::{get_org_usage, record_usage_event};
pub use webhook::payment_webhook;

/// Count a failed operation in `billing_errors_total` and convert it.
pub(crate) fn track(operation: &'static str) -> impl FnOnce(BillingError) -> AppError {
    move |e| {
        record_error(e.kind(), operation);
        e.into()
    }
}
