//! Persistence seam for the billing core.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    ActivateEnrollment, BillingPeriod, CreatePricing, Enrollment, Invoice, InvoiceTransition,
    ListInvoicesFilter, Organization, PricingConfig, UsageEvent, UsageSnapshot,
};
use crate::services::error::BillingResult;

/// Backing store for usage events, pricing, invoices and enrollments.
///
/// Implementations must make `insert_invoice` atomic with respect to the
/// `(org_id, period_start)` uniqueness rule and `transition_invoice` atomic
/// with respect to the status check.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn health_check(&self) -> BillingResult<()>;

    /// Append one immutable usage event.
    async fn insert_usage_event(&self, event: &UsageEvent) -> BillingResult<()>;

    /// Reduce the event log and enrollments into a snapshot for `period`.
    async fn usage_snapshot(
        &self,
        org_id: Uuid,
        period: BillingPeriod,
    ) -> BillingResult<UsageSnapshot>;

    /// The single active pricing row, if any.
    async fn active_pricing(&self) -> BillingResult<Option<PricingConfig>>;

    /// Insert a new pricing version and make it the only active one.
    async fn publish_pricing(&self, input: &CreatePricing) -> BillingResult<PricingConfig>;

    async fn get_organization(&self, org_id: Uuid) -> BillingResult<Option<Organization>>;

    async fn find_invoice_for_period(
        &self,
        org_id: Uuid,
        period_start: NaiveDate,
    ) -> BillingResult<Option<Invoice>>;

    /// Persist a new invoice; fails with `DuplicatePeriod` on conflict.
    async fn insert_invoice(&self, invoice: &Invoice) -> BillingResult<Invoice>;

    async fn get_invoice(&self, invoice_id: Uuid) -> BillingResult<Option<Invoice>>;

    async fn list_invoices(&self, filter: &ListInvoicesFilter) -> BillingResult<Vec<Invoice>>;

    /// Apply `transition` if the current status allows it.
    ///
    /// Fails with `InvoiceNotFound` or `InvalidTransition`; nothing changes
    /// on failure.
    async fn transition_invoice(
        &self,
        invoice_id: Uuid,
        transition: &InvoiceTransition,
    ) -> BillingResult<Invoice>;

    /// Create the enrollment or flip an existing one back to active.
    async fn activate_enrollment(&self, input: &ActivateEnrollment) -> BillingResult<Enrollment>;
}

pub type SharedStore = Arc<dyn BillingStore>;
