//! Tiered pricing configuration model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-unit rates (currency minor units) and free-tier allowances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    pub id: Option<Uuid>,
    pub name: String,
    pub version: i32,
    pub price_per_active_student: i64,
    pub price_per_gb_storage: i64,
    pub price_per_gb_bandwidth: i64,
    pub price_per_certificate: i64,
    pub free_students_limit: i64,
    pub free_storage_gb: Decimal,
    pub free_bandwidth_gb: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl PricingConfig {
    pub const FALLBACK_NAME: &'static str = "fallback";

    /// Pricing used when no active configuration exists.
    ///
    /// | field | value |
    /// |---|---|
    /// | per active student | 200 |
    /// | per GB storage | 10 |
    /// | per GB bandwidth | 5 |
    /// | per certificate | 50 |
    /// | free students | 10 |
    /// | free storage | 5 GB |
    /// | free bandwidth | 10 GB |
    pub fn fallback() -> Self {
        Self {
            id: None,
            name: Self::FALLBACK_NAME.to_string(),
            version: 0,
            price_per_active_student: 200,
            price_per_gb_storage: 10,
            price_per_gb_bandwidth: 5,
            price_per_certificate: 50,
            free_students_limit: 10,
            free_storage_gb: Decimal::from(5),
            free_bandwidth_gb: Decimal::from(10),
            currency: "USD".to_string(),
            is_active: true,
            created_at: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.id.is_none()
    }

    /// All rates and thresholds must be non-negative.
    pub fn validate(&self) -> Result<(), String> {
        let rates = [
            ("pricePerActiveStudent", self.price_per_active_student),
            ("pricePerGbStorage", self.price_per_gb_storage),
            ("pricePerGbBandwidth", self.price_per_gb_bandwidth),
            ("pricePerCertificate", self.price_per_certificate),
            ("freeStudentsLimit", self.free_students_limit),
        ];
        if let Some((field, _)) = rates.iter().find(|(_, v)| *v < 0) {
            return Err(format!("{} must be non-negative", field));
        }
        if self.free_storage_gb < Decimal::ZERO {
            return Err("freeStorageGb must be non-negative".to_string());
        }
        if self.free_bandwidth_gb < Decimal::ZERO {
            return Err("freeBandwidthGb must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Input for publishing a new pricing version.
#[derive(Debug, Clone)]
pub struct CreatePricing {
    pub name: String,
    pub price_per_active_student: i64,
    pub price_per_gb_storage: i64,
    pub price_per_gb_bandwidth: i64,
    pub price_per_certificate: i64,
    pub free_students_limit: i64,
    pub free_storage_gb: Decimal,
    pub free_bandwidth_gb: Decimal,
    pub currency: String,
}
