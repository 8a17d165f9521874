#![allow(dead_code)]

use chrono::Utc;
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use usage_billing_service::config::BillingConfig;
use usage_billing_service::services::{init_metrics, InMemoryBillingStore, WebhookVerifier};
use usage_billing_service::startup::Application;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const SERVICE_KEY: &str = "test-service-key";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub store: Arc<InMemoryBillingStore>,
    pub client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_metrics();

        let config = BillingConfig::local(ADMIN_KEY, SERVICE_KEY, WEBHOOK_SECRET);
        let store = Arc::new(InMemoryBillingStore::new());

        let app = Application::build_with_store(config, store.clone())
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            store,
            client,
        }
    }

    pub async fn admin_get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.http_address, path))
            .header("X-Admin-Api-Key", ADMIN_KEY)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_post(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(format!("{}{}", self.http_address, path))
            .header("X-Admin-Api-Key", ADMIN_KEY)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_usage_event(&self, body: &Value) -> Response {
        self.client
            .post(format!("{}/internal/usage-events", self.http_address))
            .header("X-Service-Key", SERVICE_KEY)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Deliver `body` to the payment webhook with a valid signature.
    pub async fn post_signed_webhook(&self, body: &Value) -> Response {
        let payload = body.to_string();
        let timestamp = Utc::now().timestamp();
        let signature = WebhookVerifier::new(Secret::new(WEBHOOK_SECRET.to_string()), 300)
            .sign(timestamp, payload.as_bytes())
            .expect("Failed to sign payload");

        self.post_webhook(payload, &format!("t={},v1={}", timestamp, signature))
            .await
    }

    pub async fn post_webhook(&self, payload: String, signature_header: &str) -> Response {
        self.client
            .post(format!("{}/payments/webhook", self.http_address))
            .header("Payment-Signature", signature_header)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Wait until background usage writes have landed.
    pub async fn wait_for_events(&self, expected: usize) -> usize {
        let mut count = 0;
        for _ in 0..50 {
            count = self.store.event_count().expect("store readable");
            if count >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        count
    }
}

pub async fn json_body(response: Response) -> Value {
    response.json().await.expect("Failed to parse JSON")
}
