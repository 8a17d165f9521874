use crate::config::BillingConfig;
use crate::handlers;
use crate::middleware::{admin_auth_middleware, service_auth_middleware};
use crate::services::{
    Database, InMemoryBillingStore, InvoiceManager, InvoiceNotifier, LogNotifier,
    PricingResolver, SharedStore, UsageAggregator, UsageRecorder, WebhookNotifier,
    WebhookVerifier,
};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{make_request_span, metrics_middleware, request_id_middleware};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub store: SharedStore,
    pub recorder: UsageRecorder,
    pub aggregator: UsageAggregator,
    pub pricing: PricingResolver,
    pub invoices: InvoiceManager,
    pub verifier: WebhookVerifier,
}

impl AppState {
    pub fn new(config: BillingConfig, store: SharedStore) -> Result<Self, AppError> {
        let notifier: Arc<dyn InvoiceNotifier> = match &config.invoicing.notify_url {
            Some(url) => {
                Arc::new(WebhookNotifier::new(url.clone()).map_err(AppError::ConfigError)?)
            }
            None => Arc::new(LogNotifier),
        };

        Ok(Self {
            recorder: UsageRecorder::new(store.clone()),
            aggregator: UsageAggregator::new(store.clone()),
            pricing: PricingResolver::new(store.clone()),
            invoices: InvoiceManager::new(store.clone(), notifier, config.invoicing.due_days),
            verifier: WebhookVerifier::new(
                config.webhook.secret.clone(),
                config.webhook.tolerance_secs,
            ),
            store,
            config,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/invoices", get(handlers::list_invoices))
        .route("/invoices/generate", post(handlers::generate_invoice))
        .route("/invoices/send", post(handlers::send_invoice))
        .route("/invoices/mark-paid", post(handlers::mark_invoice_paid))
        .route("/invoices/:invoice_id", get(handlers::get_invoice))
        .route("/orgs/:org_id/usage", get(handlers::get_org_usage))
        .route("/pricing", post(handlers::publish_pricing))
        .route("/pricing/active", get(handlers::get_active_pricing))
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    let internal = Router::new()
        .route("/usage-events", post(handlers::record_usage_event))
        .route_layer(from_fn_with_state(state.clone(), service_auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/payments/webhook", post(handlers::payment_webhook))
        .nest("/admin", admin)
        .nest("/internal", internal)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    /// Connect the configured store and bind the HTTP listener.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let store: SharedStore = match &config.database {
            Some(db_config) => {
                let db = Database::new(
                    db_config.url.expose_secret(),
                    db_config.max_connections,
                    db_config.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    AppError::from(e)
                })?;
                db.run_migrations().await.map_err(|e| {
                    tracing::error!("Failed to run database migrations: {}", e);
                    AppError::from(e)
                })?;
                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                Arc::new(InMemoryBillingStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    /// Bind the HTTP listener over an already constructed store.
    pub async fn build_with_store(
        config: BillingConfig,
        store: SharedStore,
    ) -> Result<Self, AppError> {
        let port = config.common.port;
        let state = AppState::new(config, store)?;
        let app = router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn http_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
