use crate::models::{CreatePricing, PricingConfig};
use crate::services::error::{BillingError, BillingResult};
use crate::services::store::SharedStore;

/// Resolves the pricing configuration an invoice is computed with.
#[derive(Clone)]
pub struct PricingResolver {
    store: SharedStore,
}

impl PricingResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// The active configuration, or [`PricingConfig::fallback`] when none is
    /// active or the active row has a negative rate or threshold.
    ///
    /// Store failures are returned, not papered over with the fallback.
    pub async fn get_active_pricing(&self) -> BillingResult<PricingConfig> {
        match self.store.active_pricing().await? {
            Some(pricing) => match pricing.validate() {
                Ok(()) => Ok(pricing),
                Err(reason) => {
                    tracing::warn!(
                        pricing_id = ?pricing.id,
                        name = %pricing.name,
                        version = pricing.version,
                        reason = %reason,
                        "Active pricing is invalid, using fallback"
                    );
                    Ok(PricingConfig::fallback())
                }
            },
            None => {
                tracing::info!("No active pricing configured, using fallback");
                Ok(PricingConfig::fallback())
            }
        }
    }

    /// Store a new version and make it the only active configuration.
    pub async fn publish(&self, input: CreatePricing) -> BillingResult<PricingConfig> {
        let candidate = PricingConfig {
            id: None,
            name: input.name.clone(),
            version: 0,
            price_per_active_student: input.price_per_active_student,
            price_per_gb_storage: input.price_per_gb_storage,
            price_per_gb_bandwidth: input.price_per_gb_bandwidth,
            price_per_certificate: input.price_per_certificate,
            free_students_limit: input.free_students_limit,
            free_storage_gb: input.free_storage_gb,
            free_bandwidth_gb: input.free_bandwidth_gb,
            currency: input.currency.clone(),
            is_active: true,
            created_at: None,
        };
        candidate.validate().map_err(BillingError::Validation)?;

        let pricing = self.store.publish_pricing(&input).await?;
        tracing::info!(
            pricing_id = ?pricing.id,
            name = %pricing.name,
            version = pricing.version,
            "Pricing published"
        );
        Ok(pricing)
    }
}
