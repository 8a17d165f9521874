use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    BillingPeriod, CreatePricing, InvoiceStatus, PricingConfig, RecordUsage, UsageEventType,
    UsageSnapshot,
};
use crate::services::InvoiceCalculation;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

// =============================================================================
// Invoices
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInvoiceRequest {
    pub org_id: Uuid,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendInvoiceRequest {
    pub invoice_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidRequest {
    pub invoice_id: Uuid,
    #[validate(range(min = 0, message = "amountPaid must be non-negative"))]
    pub amount_paid: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesQuery {
    pub org_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub limit: Option<i64>,
}

impl ListInvoicesQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

// =============================================================================
// Usage
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

/// Current usage and what an invoice for it would contain.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub org_id: Uuid,
    pub period: BillingPeriod,
    pub usage: UsageSnapshot,
    pub pricing: PricingConfig,
    pub preview: InvoiceCalculation,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UsageEventRequest {
    pub org_id: Uuid,
    pub event_type: UsageEventType,
    #[validate(range(min = 0, message = "quantity must be non-negative"))]
    pub quantity: Option<i64>,
    #[validate(length(max = 20))]
    pub unit: Option<String>,
    #[validate(length(max = 255))]
    pub resource_id: Option<String>,
    #[validate(length(max = 50))]
    pub resource_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

impl From<UsageEventRequest> for RecordUsage {
    fn from(req: UsageEventRequest) -> Self {
        let mut input = RecordUsage::new(req.org_id, req.event_type).user(req.user_id);
        if let Some(quantity) = req.quantity {
            input.quantity = quantity;
        }
        input.unit = req.unit;
        input.resource_id = req.resource_id;
        input.resource_type = req.resource_type;
        if let Some(metadata) = req.metadata {
            input = input.metadata(metadata);
        }
        input
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEventAccepted {
    pub org_id: Uuid,
    pub event_type: UsageEventType,
}

// =============================================================================
// Pricing
// =============================================================================

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePricingRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(range(min = 0))]
    pub price_per_active_student: i64,
    #[validate(range(min = 0))]
    pub price_per_gb_storage: i64,
    #[validate(range(min = 0))]
    pub price_per_gb_bandwidth: i64,
    #[validate(range(min = 0))]
    pub price_per_certificate: i64,
    #[validate(range(min = 0))]
    pub free_students_limit: i64,
    pub free_storage_gb: Decimal,
    pub free_bandwidth_gb: Decimal,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "currency must be a 3-letter ISO code"))]
    pub currency: String,
}

impl From<CreatePricingRequest> for CreatePricing {
    fn from(req: CreatePricingRequest) -> Self {
        CreatePricing {
            name: req.name,
            price_per_active_student: req.price_per_active_student,
            price_per_gb_storage: req.price_per_gb_storage,
            price_per_gb_bandwidth: req.price_per_gb_bandwidth,
            price_per_certificate: req.price_per_certificate,
            free_students_limit: req.free_students_limit,
            free_storage_gb: req.free_storage_gb,
            free_bandwidth_gb: req.free_bandwidth_gb,
            currency: req.currency.to_uppercase(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePricingResponse {
    pub pricing: PricingConfig,
    pub is_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_limit_is_clamped() {
        assert_eq!(ListInvoicesQuery::default().limit(), DEFAULT_LIST_LIMIT);
        let query = ListInvoicesQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.limit(), MAX_LIST_LIMIT);
    }

    #[test]
    fn negative_payment_fails_validation() {
        let req: MarkPaidRequest = serde_json::from_value(serde_json::json!({
            "invoiceId": Uuid::new_v4(),
            "amountPaid": -5
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn usage_event_request_defaults_to_single_unit() {
        let req: UsageEventRequest = serde_json::from_value(serde_json::json!({
            "orgId": Uuid::new_v4(),
            "eventType": "course.created"
        }))
        .unwrap();
        let input = RecordUsage::from(req);

        assert_eq!(input.quantity, 1);
        assert_eq!(input.event_type, UsageEventType::CourseCreated);
        assert_eq!(input.metadata, serde_json::json!({}));
    }

    #[test]
    fn pricing_request_accepts_numeric_allowances() {
        let req: CreatePricingRequest = serde_json::from_value(serde_json::json!({
            "name": "standard",
            "pricePerActiveStudent": 200,
            "pricePerGbStorage": 10,
            "pricePerGbBandwidth": 5,
            "pricePerCertificate": 50,
            "freeStudentsLimit": 10,
            "freeStorageGb": 5,
            "freeBandwidthGb": "10.5"
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.currency, "USD");
        assert_eq!(req.free_bandwidth_gb, Decimal::new(105, 1));
    }
}
