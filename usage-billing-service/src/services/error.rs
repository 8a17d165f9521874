use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::InvoiceStatus;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Organization {0} not found")]
    OrganizationNotFound(Uuid),

    #[error("Invoice {0} not found")]
    InvoiceNotFound(Uuid),

    #[error("An invoice already exists for organization {org_id} and period starting {period_start}")]
    DuplicatePeriod {
        org_id: Uuid,
        period_start: chrono::NaiveDate,
    },

    #[error("Invoice cannot move from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error("Store error: {0}")]
    Store(anyhow::Error),
}

impl BillingError {
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        BillingError::Store(err.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "validation",
            BillingError::OrganizationNotFound(_) | BillingError::InvoiceNotFound(_) => {
                "not_found"
            }
            BillingError::DuplicatePeriod { .. } => "duplicate_period",
            BillingError::InvalidTransition { .. } => "invalid_transition",
            BillingError::Store(_) => "upstream",
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            e @ (BillingError::OrganizationNotFound(_) | BillingError::InvoiceNotFound(_)) => {
                AppError::NotFound(anyhow::anyhow!(e.to_string()))
            }
            e @ (BillingError::DuplicatePeriod { .. } | BillingError::InvalidTransition { .. }) => {
                AppError::BadRequest(anyhow::anyhow!(e.to_string()))
            }
            BillingError::Store(e) => AppError::DatabaseError(e),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
