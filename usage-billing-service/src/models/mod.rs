//! Domain models for usage-billing-service.

mod enrollment;
mod invoice;
mod period;
mod pricing;
mod usage;

pub use enrollment::{ActivateEnrollment, Enrollment, EnrollmentStatus, Organization};
pub use invoice::{
    invoice_number, BillableMetric, CreateInvoice, Invoice, InvoiceStatus, InvoiceTransition,
    LineItem, ListInvoicesFilter,
};
pub use period::BillingPeriod;
pub use pricing::{CreatePricing, PricingConfig};
pub use usage::{RecordUsage, UsageEvent, UsageEventType, UsageSnapshot};
