//! Invoice lifecycle: generation, sending and payment.

use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    BillingPeriod, CreateInvoice, Invoice, InvoiceTransition, ListInvoicesFilter,
};
use crate::services::aggregator::UsageAggregator;
use crate::services::calculator::compute_line_items;
use crate::services::error::{BillingError, BillingResult};
use crate::services::metrics::{record_invoice, record_invoice_amount};
use crate::services::notifier::InvoiceNotifier;
use crate::services::pricing::PricingResolver;
use crate::services::store::SharedStore;

pub const DEFAULT_DUE_DAYS: i64 = 30;

/// Drives invoices through `draft -> open -> paid`.
#[derive(Clone)]
pub struct InvoiceManager {
    store: SharedStore,
    aggregator: UsageAggregator,
    pricing: PricingResolver,
    notifier: Arc<dyn InvoiceNotifier>,
    due_days: i64,
}

impl InvoiceManager {
    pub fn new(store: SharedStore, notifier: Arc<dyn InvoiceNotifier>, due_days: i64) -> Self {
        Self {
            aggregator: UsageAggregator::new(store.clone()),
            pricing: PricingResolver::new(store.clone()),
            store,
            notifier,
            due_days,
        }
    }

    /// Generate a draft invoice for one organization and period.
    ///
    /// Missing bounds are filled by [`BillingPeriod::resolve`] relative to
    /// today (UTC).
    #[tracing::instrument(skip(self), fields(org_id = %org_id))]
    pub async fn create(
        &self,
        org_id: Uuid,
        period_start: Option<NaiveDate>,
        period_end: Option<NaiveDate>,
    ) -> BillingResult<Invoice> {
        let period = BillingPeriod::resolve(period_start, period_end, Utc::now().date_naive())
            .map_err(BillingError::Validation)?;

        self.store
            .get_organization(org_id)
            .await?
            .ok_or(BillingError::OrganizationNotFound(org_id))?;

        if self
            .store
            .find_invoice_for_period(org_id, period.start)
            .await?
            .is_some()
        {
            return Err(BillingError::DuplicatePeriod {
                org_id,
                period_start: period.start,
            });
        }

        let usage = self.aggregator.get_usage(org_id, period).await?;
        let pricing = self.pricing.get_active_pricing().await?;
        let calculation = compute_line_items(&usage, &pricing);

        let draft = CreateInvoice {
            org_id,
            period_start: period.start,
            period_end: period.end,
            line_items: calculation.line_items,
            total: calculation.total,
            currency: pricing.currency.clone(),
        }
        .into_invoice();

        // A concurrent create for the same period loses on the unique key.
        let invoice = self.store.insert_invoice(&draft).await?;

        record_invoice(invoice.status.as_str());
        record_invoice_amount(&invoice.currency, invoice.total);
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            period_start = %invoice.period_start,
            period_end = %invoice.period_end,
            total = invoice.total,
            pricing = %pricing.name,
            "Draft invoice created"
        );

        Ok(invoice)
    }

    /// Issue a draft invoice to the customer.
    #[tracing::instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn send(&self, invoice_id: Uuid) -> BillingResult<Invoice> {
        let now = Utc::now();
        let due_date = Duration::try_days(self.due_days)
            .and_then(|term| now.date_naive().checked_add_signed(term))
            .ok_or_else(|| {
                BillingError::Validation(format!(
                    "Due term of {} days is out of range",
                    self.due_days
                ))
            })?;
        let invoice = self
            .store
            .transition_invoice(invoice_id, &InvoiceTransition::Send { due_date, at: now })
            .await?;

        record_invoice(invoice.status.as_str());

        if let Err(e) = self.notifier.invoice_sent(&invoice).await {
            tracing::error!(
                invoice_id = %invoice.id,
                error = %e,
                "Invoice notification failed"
            );
        }

        Ok(invoice)
    }

    /// Record payment. `amount_paid` defaults to the amount due.
    #[tracing::instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn mark_paid(
        &self,
        invoice_id: Uuid,
        amount_paid: Option<i64>,
    ) -> BillingResult<Invoice> {
        if amount_paid.is_some_and(|amount| amount < 0) {
            return Err(BillingError::Validation(
                "amountPaid must be non-negative".to_string(),
            ));
        }

        let invoice = self
            .store
            .transition_invoice(
                invoice_id,
                &InvoiceTransition::MarkPaid {
                    amount_paid,
                    at: Utc::now(),
                },
            )
            .await?;

        record_invoice(invoice.status.as_str());
        if invoice.amount_paid != invoice.amount_due {
            tracing::warn!(
                invoice_id = %invoice.id,
                amount_paid = invoice.amount_paid,
                amount_due = invoice.amount_due,
                "Invoice marked paid with an amount different from amount due"
            );
        }

        Ok(invoice)
    }

    pub async fn get(&self, invoice_id: Uuid) -> BillingResult<Invoice> {
        self.store
            .get_invoice(invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(invoice_id))
    }

    pub async fn list(&self, filter: ListInvoicesFilter) -> BillingResult<Vec<Invoice>> {
        self.store.list_invoices(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivateEnrollment, InvoiceStatus};
    use crate::services::memory::InMemoryBillingStore;
    use crate::services::notifier::LogNotifier;
    use crate::services::store::BillingStore;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct BrokenNotifier;

    #[async_trait]
    impl InvoiceNotifier for BrokenNotifier {
        async fn invoice_sent(&self, _: &Invoice) -> anyhow::Result<()> {
            Err(anyhow!("smtp unavailable"))
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Arc<InMemoryBillingStore>, InvoiceManager, Uuid) {
        let store = Arc::new(InMemoryBillingStore::new());
        let org = store.insert_organization("Acme Academy").unwrap();
        let manager = InvoiceManager::new(store.clone(), Arc::new(LogNotifier), DEFAULT_DUE_DAYS);
        (store, manager, org.id)
    }

    #[tokio::test]
    async fn create_builds_draft_from_usage_and_pricing() {
        let (store, manager, org_id) = setup();
        for _ in 0..12 {
            store
                .activate_enrollment(&ActivateEnrollment {
                    org_id,
                    course_id: Uuid::new_v4(),
                    user_id: Uuid::new_v4(),
                    payment_reference: None,
                })
                .await
                .unwrap();
        }

        let invoice = manager
            .create(org_id, Some(date(2026, 9, 1)), None)
            .await
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.period_end, date(2026, 10, 1));
        assert_eq!(invoice.total, 400);
        assert_eq!(invoice.subtotal, invoice.total);
        assert_eq!(invoice.amount_due, invoice.total);
        assert_eq!(invoice.currency, "USD");
        assert!(invoice.invoice_number.starts_with("INV-202609-"));
    }

    #[tokio::test]
    async fn unknown_organization_is_not_found() {
        let (_, manager, _) = setup();
        let err = manager.create(Uuid::new_v4(), None, None).await.unwrap_err();
        assert!(matches!(err, BillingError::OrganizationNotFound(_)));
    }

    #[tokio::test]
    async fn inverted_period_is_rejected() {
        let (_, manager, org_id) = setup();
        let err = manager
            .create(org_id, Some(date(2026, 9, 1)), Some(date(2026, 8, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_period_leaves_single_invoice() {
        let (store, manager, org_id) = setup();
        manager.create(org_id, None, None).await.unwrap();

        let err = manager.create(org_id, None, None).await.unwrap_err();
        assert!(matches!(err, BillingError::DuplicatePeriod { .. }));

        let invoices = store
            .list_invoices(&ListInvoicesFilter {
                org_id: Some(org_id),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(invoices.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_creates_for_same_period_yield_one_invoice() {
        let (store, manager, org_id) = setup();
        let start = Some(date(2026, 9, 1));

        let (first, second) = tokio::join!(
            manager.create(org_id, start, None),
            manager.create(org_id, start, None)
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(BillingError::DuplicatePeriod { .. })))
                .count(),
            1
        );

        let invoices = store
            .list_invoices(&ListInvoicesFilter {
                org_id: Some(org_id),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(invoices.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_due_term_is_rejected_without_sending() {
        let store = Arc::new(InMemoryBillingStore::new());
        let org = store.insert_organization("Acme Academy").unwrap();
        let manager = InvoiceManager::new(store.clone(), Arc::new(LogNotifier), i64::MAX);
        let draft = manager.create(org.id, None, None).await.unwrap();

        let err = manager.send(draft.id).await.unwrap_err();

        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(manager.get(draft.id).await.unwrap().status, InvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn send_sets_due_date_and_survives_notifier_failure() {
        let store = Arc::new(InMemoryBillingStore::new());
        let org = store.insert_organization("Acme Academy").unwrap();
        let manager = InvoiceManager::new(store.clone(), Arc::new(BrokenNotifier), 30);
        let draft = manager.create(org.id, None, None).await.unwrap();

        let sent = manager.send(draft.id).await.unwrap();

        assert_eq!(sent.status, InvoiceStatus::Open);
        assert!(sent.sent_at.is_some());
        assert_eq!(
            sent.due_date,
            Some(Utc::now().date_naive() + Duration::days(30))
        );
        assert_eq!(manager.get(draft.id).await.unwrap().status, InvoiceStatus::Open);
    }

    #[tokio::test]
    async fn paid_invoice_cannot_be_sent_again() {
        let (_, manager, org_id) = setup();
        let draft = manager.create(org_id, None, None).await.unwrap();
        manager.send(draft.id).await.unwrap();
        manager.mark_paid(draft.id, None).await.unwrap();

        let err = manager.send(draft.id).await.unwrap_err();
        assert!(matches!(
            err,
            BillingError::InvalidTransition {
                from: InvoiceStatus::Paid,
                to: InvoiceStatus::Open
            }
        ));
        assert_eq!(manager.get(draft.id).await.unwrap().status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn draft_can_be_marked_paid_with_explicit_amount() {
        let (_, manager, org_id) = setup();
        let draft = manager.create(org_id, None, None).await.unwrap();

        let paid = manager.mark_paid(draft.id, Some(0)).await.unwrap();

        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.amount_paid, 0);
        assert!(paid.paid_at.is_some());
    }

    #[tokio::test]
    async fn negative_payment_is_rejected() {
        let (_, manager, org_id) = setup();
        let draft = manager.create(org_id, None, None).await.unwrap();

        let err = manager.mark_paid(draft.id, Some(-1)).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(manager.get(draft.id).await.unwrap().status, InvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn missing_invoice_is_not_found() {
        let (_, manager, _) = setup();
        let err = manager.send(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BillingError::InvoiceNotFound(_)));
    }
}
