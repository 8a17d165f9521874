//! In-process store used for local development and tests.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::models::{
    ActivateEnrollment, BillingPeriod, CreatePricing, Enrollment, EnrollmentStatus, Invoice,
    InvoiceStatus, InvoiceTransition, ListInvoicesFilter, Organization, PricingConfig, UsageEvent,
    UsageEventType, UsageSnapshot,
};
use crate::services::error::{BillingError, BillingResult};
use crate::services::store::BillingStore;

#[derive(Default)]
struct State {
    organizations: HashMap<Uuid, Organization>,
    events: Vec<UsageEvent>,
    pricing: Vec<PricingConfig>,
    invoices: Vec<Invoice>,
    enrollments: Vec<Enrollment>,
}

/// `BillingStore` backed by process memory. All writes go through one lock,
/// which gives the same atomicity the PostgreSQL constraints give.
#[derive(Default)]
pub struct InMemoryBillingStore {
    state: RwLock<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> BillingResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| BillingError::store(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    fn write(&self) -> BillingResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| BillingError::store(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    /// Register an organization so invoices can be generated for it.
    pub fn insert_organization(&self, name: &str) -> BillingResult<Organization> {
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            billing_email: None,
            created_at: Utc::now(),
        };
        self.write()?.organizations.insert(org.id, org.clone());
        Ok(org)
    }

    /// Number of stored usage events, for assertions.
    pub fn event_count(&self) -> BillingResult<usize> {
        Ok(self.read()?.events.len())
    }

    pub fn enrollments(&self) -> BillingResult<Vec<Enrollment>> {
        Ok(self.read()?.enrollments.clone())
    }
}

fn sum_quantity<'a>(
    events: impl Iterator<Item = &'a UsageEvent>,
    predicate: impl Fn(&UsageEvent) -> bool,
) -> i64 {
    events
        .filter(|e| predicate(e))
        .fold(0i64, |acc, e| acc.saturating_add(e.quantity))
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn health_check(&self) -> BillingResult<()> {
        self.read().map(|_| ())
    }

    async fn insert_usage_event(&self, event: &UsageEvent) -> BillingResult<()> {
        self.write()?.events.push(event.clone());
        Ok(())
    }

    async fn usage_snapshot(
        &self,
        org_id: Uuid,
        period: BillingPeriod,
    ) -> BillingResult<UsageSnapshot> {
        let state = self.read()?;
        let from = BillingPeriod::start_of_day_utc(period.start);
        let until = BillingPeriod::start_of_day_utc(period.end);

        let org_events: Vec<&UsageEvent> =
            state.events.iter().filter(|e| e.org_id == org_id).collect();
        let in_period = |e: &UsageEvent| e.created_at >= from && e.created_at < until;

        let active_students = state
            .enrollments
            .iter()
            .filter(|e| e.org_id == org_id && e.status == EnrollmentStatus::Active)
            .map(|e| e.user_id)
            .collect::<HashSet<_>>()
            .len() as i64;

        let added = sum_quantity(org_events.iter().copied(), |e| e.event_type.adds_storage());
        let removed = sum_quantity(org_events.iter().copied(), |e| e.event_type.removes_storage());

        let bandwidth = sum_quantity(org_events.iter().copied(), |e| {
            e.event_type == UsageEventType::VideoStream && in_period(e)
        });
        let certificates = sum_quantity(org_events.iter().copied(), |e| {
            e.event_type == UsageEventType::CertificateIssued && in_period(e)
        });

        Ok(UsageSnapshot::from_parts(
            Some(active_students),
            Some(added.saturating_sub(removed)),
            Some(bandwidth),
            Some(certificates),
        ))
    }

    async fn active_pricing(&self) -> BillingResult<Option<PricingConfig>> {
        Ok(self.read()?.pricing.iter().find(|p| p.is_active).cloned())
    }

    async fn publish_pricing(&self, input: &CreatePricing) -> BillingResult<PricingConfig> {
        let mut state = self.write()?;
        let version = state
            .pricing
            .iter()
            .filter(|p| p.name == input.name)
            .map(|p| p.version)
            .max()
            .unwrap_or(0)
            + 1;

        for existing in state.pricing.iter_mut() {
            existing.is_active = false;
        }

        let pricing = PricingConfig {
            id: Some(Uuid::new_v4()),
            name: input.name.clone(),
            version,
            price_per_active_student: input.price_per_active_student,
            price_per_gb_storage: input.price_per_gb_storage,
            price_per_gb_bandwidth: input.price_per_gb_bandwidth,
            price_per_certificate: input.price_per_certificate,
            free_students_limit: input.free_students_limit,
            free_storage_gb: input.free_storage_gb,
            free_bandwidth_gb: input.free_bandwidth_gb,
            currency: input.currency.clone(),
            is_active: true,
            created_at: Some(Utc::now()),
        };
        state.pricing.push(pricing.clone());
        Ok(pricing)
    }

    async fn get_organization(&self, org_id: Uuid) -> BillingResult<Option<Organization>> {
        Ok(self.read()?.organizations.get(&org_id).cloned())
    }

    async fn find_invoice_for_period(
        &self,
        org_id: Uuid,
        period_start: NaiveDate,
    ) -> BillingResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .iter()
            .find(|i| i.org_id == org_id && i.period_start == period_start)
            .cloned())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> BillingResult<Invoice> {
        let mut state = self.write()?;
        if state
            .invoices
            .iter()
            .any(|i| i.org_id == invoice.org_id && i.period_start == invoice.period_start)
        {
            return Err(BillingError::DuplicatePeriod {
                org_id: invoice.org_id,
                period_start: invoice.period_start,
            });
        }
        state.invoices.push(invoice.clone());
        Ok(invoice.clone())
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> BillingResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .iter()
            .find(|i| i.id == invoice_id)
            .cloned())
    }

    async fn list_invoices(&self, filter: &ListInvoicesFilter) -> BillingResult<Vec<Invoice>> {
        let state = self.read()?;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .iter()
            .filter(|i| filter.org_id.map_or(true, |org| i.org_id == org))
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        invoices.truncate(filter.limit.max(0) as usize);
        Ok(invoices)
    }

    async fn transition_invoice(
        &self,
        invoice_id: Uuid,
        transition: &InvoiceTransition,
    ) -> BillingResult<Invoice> {
        let mut state = self.write()?;
        let invoice = state
            .invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        let target = transition.target();
        if !invoice.status.can_transition_to(target) {
            return Err(BillingError::InvalidTransition {
                from: invoice.status,
                to: target,
            });
        }

        transition.apply(invoice);
        Ok(invoice.clone())
    }

    async fn activate_enrollment(&self, input: &ActivateEnrollment) -> BillingResult<Enrollment> {
        let mut state = self.write()?;
        let now = Utc::now();

        if !state.organizations.contains_key(&input.org_id) {
            return Err(BillingError::store(anyhow::anyhow!(
                "Organization {} does not exist",
                input.org_id
            )));
        }

        if let Some(existing) = state
            .enrollments
            .iter_mut()
            .find(|e| e.course_id == input.course_id && e.user_id == input.user_id)
        {
            existing.status = EnrollmentStatus::Active;
            existing.payment_reference = input.payment_reference.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            org_id: input.org_id,
            course_id: input.course_id,
            user_id: input.user_id,
            status: EnrollmentStatus::Active,
            payment_reference: input.payment_reference.clone(),
            created_at: now,
            updated_at: now,
        };
        state.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateInvoice, RecordUsage};
    use chrono::Duration;

    fn september() -> BillingPeriod {
        BillingPeriod {
            start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        }
    }

    fn event_at(org_id: Uuid, event_type: UsageEventType, quantity: i64, date: NaiveDate) -> UsageEvent {
        let mut event = RecordUsage::new(org_id, event_type)
            .quantity(quantity, "bytes")
            .into_event();
        event.created_at = BillingPeriod::start_of_day_utc(date) + Duration::hours(12);
        event
    }

    #[tokio::test]
    async fn snapshot_scopes_flow_metrics_to_period() {
        let store = InMemoryBillingStore::new();
        let org = Uuid::new_v4();
        let aug = NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();
        let sep = NaiveDate::from_ymd_opt(2026, 9, 15).unwrap();

        for event in [
            event_at(org, UsageEventType::VideoUpload, 3000, aug),
            event_at(org, UsageEventType::VideoDelete, 1000, sep),
            event_at(org, UsageEventType::VideoStream, 700, aug),
            event_at(org, UsageEventType::VideoStream, 300, sep),
            event_at(org, UsageEventType::CertificateIssued, 1, sep),
            event_at(Uuid::new_v4(), UsageEventType::VideoStream, 9999, sep),
        ] {
            store.insert_usage_event(&event).await.unwrap();
        }

        let snapshot = store.usage_snapshot(org, september()).await.unwrap();

        assert_eq!(snapshot.video_storage_bytes, 2000);
        assert_eq!(snapshot.video_bandwidth_bytes, 300);
        assert_eq!(snapshot.certificates_issued, 1);
        assert_eq!(snapshot.active_students, 0);
    }

    #[tokio::test]
    async fn empty_history_yields_zero_snapshot() {
        let store = InMemoryBillingStore::new();
        let snapshot = store.usage_snapshot(Uuid::new_v4(), september()).await.unwrap();
        assert_eq!(snapshot, UsageSnapshot::default());
    }

    #[tokio::test]
    async fn reactivation_keeps_one_enrollment_per_student() {
        let store = InMemoryBillingStore::new();
        let org = store.insert_organization("Acme Academy").unwrap();
        let input = ActivateEnrollment {
            org_id: org.id,
            course_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            payment_reference: Some("cs_1".to_string()),
        };

        let first = store.activate_enrollment(&input).await.unwrap();
        let second = store
            .activate_enrollment(&ActivateEnrollment {
                payment_reference: Some("cs_2".to_string()),
                ..input.clone()
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.payment_reference.as_deref(), Some("cs_2"));
        assert_eq!(store.enrollments().unwrap().len(), 1);

        let snapshot = store.usage_snapshot(input.org_id, september()).await.unwrap();
        assert_eq!(snapshot.active_students, 1);
    }

    #[tokio::test]
    async fn enrollment_for_unknown_organization_is_rejected() {
        let store = InMemoryBillingStore::new();
        let result = store
            .activate_enrollment(&ActivateEnrollment {
                org_id: Uuid::new_v4(),
                course_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                payment_reference: None,
            })
            .await;

        assert!(matches!(result, Err(BillingError::Store(_))));
        assert!(store.enrollments().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_invoice_for_same_period_is_rejected() {
        let store = InMemoryBillingStore::new();
        let draft = || {
            CreateInvoice {
                org_id: Uuid::nil(),
                period_start: september().start,
                period_end: september().end,
                line_items: vec![],
                total: 0,
                currency: "USD".to_string(),
            }
            .into_invoice()
        };

        store.insert_invoice(&draft()).await.unwrap();
        let err = store.insert_invoice(&draft()).await.unwrap_err();

        assert!(matches!(err, BillingError::DuplicatePeriod { .. }));
        let all = store
            .list_invoices(&ListInvoicesFilter {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn publishing_pricing_leaves_one_active_version() {
        let store = InMemoryBillingStore::new();
        let input = CreatePricing {
            name: "standard".to_string(),
            price_per_active_student: 200,
            price_per_gb_storage: 10,
            price_per_gb_bandwidth: 5,
            price_per_certificate: 50,
            free_students_limit: 10,
            free_storage_gb: 5.into(),
            free_bandwidth_gb: 10.into(),
            currency: "USD".to_string(),
        };

        store.publish_pricing(&input).await.unwrap();
        let second = store.publish_pricing(&input).await.unwrap();

        let active = store.active_pricing().await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(active.version, 2);
        assert_eq!(store.read().unwrap().pricing.iter().filter(|p| p.is_active).count(), 1);
    }

    #[tokio::test]
    async fn paid_invoice_cannot_be_reopened() {
        let store = InMemoryBillingStore::new();
        let invoice = store
            .insert_invoice(
                &CreateInvoice {
                    org_id: Uuid::new_v4(),
                    period_start: september().start,
                    period_end: september().end,
                    line_items: vec![],
                    total: 500,
                    currency: "USD".to_string(),
                }
                .into_invoice(),
            )
            .await
            .unwrap();

        store
            .transition_invoice(
                invoice.id,
                &InvoiceTransition::MarkPaid {
                    amount_paid: Some(500),
                    at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let err = store
            .transition_invoice(
                invoice.id,
                &InvoiceTransition::Send {
                    due_date: september().end,
                    at: Utc::now(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BillingError::InvalidTransition {
                from: InvoiceStatus::Paid,
                to: InvoiceStatus::Open
            }
        ));
        let stored = store.get_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert!(stored.due_date.is_none());
    }
}
