//! Invoice model for usage-billing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice status.
///
/// `draft -> open -> paid`, with `draft -> paid` allowed for manual
/// reconciliation. Nothing moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "open" => Some(InvoiceStatus::Open),
            "paid" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }

    /// States from which `target` may be entered.
    pub fn allowed_sources(target: InvoiceStatus) -> &'static [InvoiceStatus] {
        match target {
            InvoiceStatus::Draft => &[],
            InvoiceStatus::Open => &[InvoiceStatus::Draft],
            InvoiceStatus::Paid => &[InvoiceStatus::Draft, InvoiceStatus::Open],
        }
    }

    pub fn can_transition_to(&self, target: InvoiceStatus) -> bool {
        InvoiceStatus::allowed_sources(target).contains(self)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric a line item bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillableMetric {
    ActiveStudents,
    VideoStorage,
    VideoBandwidth,
    Certificates,
}

/// One billable entry on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub metric: BillableMetric,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: i64,
    pub amount: i64,
}

/// Persisted usage invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub org_id: Uuid,
    pub invoice_number: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub line_items: Vec<LineItem>,
    pub subtotal: i64,
    pub total: i64,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub org_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub line_items: Vec<LineItem>,
    pub total: i64,
    pub currency: String,
}

impl CreateInvoice {
    /// Build the draft record. Subtotal, total and amount due all start equal.
    pub fn into_invoice(self) -> Invoice {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Invoice {
            id,
            org_id: self.org_id,
            invoice_number: invoice_number(self.period_start, id),
            period_start: self.period_start,
            period_end: self.period_end,
            line_items: self.line_items,
            subtotal: self.total,
            total: self.total,
            amount_due: self.total,
            amount_paid: 0,
            currency: self.currency,
            status: InvoiceStatus::Draft,
            due_date: None,
            sent_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status change applied by the lifecycle manager.
#[derive(Debug, Clone)]
pub enum InvoiceTransition {
    Send {
        due_date: NaiveDate,
        at: DateTime<Utc>,
    },
    MarkPaid {
        amount_paid: Option<i64>,
        at: DateTime<Utc>,
    },
}

impl InvoiceTransition {
    pub fn target(&self) -> InvoiceStatus {
        match self {
            InvoiceTransition::Send { .. } => InvoiceStatus::Open,
            InvoiceTransition::MarkPaid { .. } => InvoiceStatus::Paid,
        }
    }

    /// Apply the field changes of this transition to `invoice`.
    pub fn apply(&self, invoice: &mut Invoice) {
        match self {
            InvoiceTransition::Send { due_date, at } => {
                invoice.due_date = Some(*due_date);
                invoice.sent_at = Some(*at);
                invoice.updated_at = *at;
            }
            InvoiceTransition::MarkPaid { amount_paid, at } => {
                invoice.amount_paid = amount_paid.unwrap_or(invoice.amount_due);
                invoice.paid_at = Some(*at);
                invoice.updated_at = *at;
            }
        }
        invoice.status = self.target();
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub org_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub limit: i64,
}

/// `INV-<YYYYMM>-<first 8 hex of id>`
pub fn invoice_number(period_start: NaiveDate, id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!(
        "INV-{}-{}",
        period_start.format("%Y%m"),
        simple[..8].to_uppercase()
    )
}
