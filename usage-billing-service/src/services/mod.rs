//! Services module for usage-billing-service.

pub mod aggregator;
pub mod calculator;
pub mod checkout;
pub mod database;
pub mod error;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod pricing;
pub mod recorder;
pub mod store;

pub use aggregator::UsageAggregator;
pub use calculator::{compute_line_items, InvoiceCalculation};
pub use checkout::WebhookVerifier;
pub use database::Database;
pub use error::{BillingError, BillingResult};
pub use invoices::InvoiceManager;
pub use memory::InMemoryBillingStore;
pub use metrics::{get_metrics, init_metrics, record_error, record_webhook_event};
pub use notifier::{InvoiceNotifier, LogNotifier, WebhookNotifier};
pub use pricing::PricingResolver;
pub use recorder::UsageRecorder;
pub use store::{BillingStore, SharedStore};
