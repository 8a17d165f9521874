use uuid::Uuid;

use crate::models::{BillingPeriod, UsageSnapshot};
use crate::services::error::BillingResult;
use crate::services::store::SharedStore;

/// Reduces the usage event log into per-organization snapshots.
#[derive(Clone)]
pub struct UsageAggregator {
    store: SharedStore,
}

impl UsageAggregator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Usage for `org_id` over `[period.start, period.end)`.
    ///
    /// Students and storage are current totals; bandwidth and certificates
    /// only count events inside the period. An organization with no history
    /// gets an all-zero snapshot.
    #[tracing::instrument(skip(self), fields(org_id = %org_id, period_start = %period.start))]
    pub async fn get_usage(
        &self,
        org_id: Uuid,
        period: BillingPeriod,
    ) -> BillingResult<UsageSnapshot> {
        let snapshot = self.store.usage_snapshot(org_id, period).await?;

        tracing::debug!(
            active_students = snapshot.active_students,
            video_storage_bytes = snapshot.video_storage_bytes,
            video_bandwidth_bytes = snapshot.video_bandwidth_bytes,
            certificates_issued = snapshot.certificates_issued,
            "Usage aggregated"
        );

        Ok(snapshot)
    }
}
