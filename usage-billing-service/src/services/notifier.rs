//! Delivery of sent invoices to the billing contact.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::models::Invoice;

/// Hands a freshly sent invoice to whatever delivers it to the customer.
#[async_trait]
pub trait InvoiceNotifier: Send + Sync {
    async fn invoice_sent(&self, invoice: &Invoice) -> Result<()>;
}

/// Writes a log line and nothing else.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl InvoiceNotifier for LogNotifier {
    async fn invoice_sent(&self, invoice: &Invoice) -> Result<()> {
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            org_id = %invoice.org_id,
            amount_due = invoice.amount_due,
            due_date = ?invoice.due_date,
            "Invoice sent"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceSentPayload<'a> {
    event: &'static str,
    invoice: &'a Invoice,
}

/// POSTs an `invoice.sent` payload to a notification endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl InvoiceNotifier for WebhookNotifier {
    async fn invoice_sent(&self, invoice: &Invoice) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&InvoiceSentPayload {
                event: "invoice.sent",
                invoice,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(
                invoice_id = %invoice.id,
                status = %status,
                "Invoice notification delivered"
            );
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!(
                "Invoice notification rejected with {}: {}",
                status,
                body
            ))
        }
    }
}
