//! PostgreSQL store for usage-billing-service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    ActivateEnrollment, BillingPeriod, CreatePricing, Enrollment, EnrollmentStatus, Invoice,
    InvoiceStatus, InvoiceTransition, LineItem, ListInvoicesFilter, Organization, PricingConfig,
    UsageEvent, UsageSnapshot,
};
use crate::services::error::{BillingError, BillingResult};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::BillingStore;

const INVOICE_COLUMNS: &str = "id, org_id, invoice_number, period_start, period_end, line_items, \
     subtotal, total, amount_due, amount_paid, currency, status, due_date, sent_at, paid_at, \
     created_at, updated_at";

const PRICING_COLUMNS: &str = "id, name, version, price_per_active_student, price_per_gb_storage, \
     price_per_gb_bandwidth, price_per_certificate, free_students_limit, free_storage_gb, \
     free_bandwidth_gb, currency, is_active, created_at";

const ENROLLMENT_COLUMNS: &str =
    "id, org_id, course_id, user_id, status, payment_reference, created_at, updated_at";

#[derive(FromRow)]
struct InvoiceRow {
    id: Uuid,
    org_id: Uuid,
    invoice_number: String,
    period_start: NaiveDate,
    period_end: NaiveDate,
    line_items: Json<Vec<LineItem>>,
    subtotal: i64,
    total: i64,
    amount_due: i64,
    amount_paid: i64,
    currency: String,
    status: String,
    due_date: Option<NaiveDate>,
    sent_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = BillingError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let status = InvoiceStatus::from_string(&row.status).ok_or_else(|| {
            BillingError::store(anyhow::anyhow!(
                "Invoice {} has unknown status '{}'",
                row.id,
                row.status
            ))
        })?;

        Ok(Invoice {
            id: row.id,
            org_id: row.org_id,
            invoice_number: row.invoice_number,
            period_start: row.period_start,
            period_end: row.period_end,
            line_items: row.line_items.0,
            subtotal: row.subtotal,
            total: row.total,
            amount_due: row.amount_due,
            amount_paid: row.amount_paid,
            currency: row.currency,
            status,
            due_date: row.due_date,
            sent_at: row.sent_at,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PricingRow {
    id: Uuid,
    name: String,
    version: i32,
    price_per_active_student: i64,
    price_per_gb_storage: i64,
    price_per_gb_bandwidth: i64,
    price_per_certificate: i64,
    free_students_limit: i64,
    free_storage_gb: Decimal,
    free_bandwidth_gb: Decimal,
    currency: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<PricingRow> for PricingConfig {
    fn from(row: PricingRow) -> Self {
        PricingConfig {
            id: Some(row.id),
            name: row.name,
            version: row.version,
            price_per_active_student: row.price_per_active_student,
            price_per_gb_storage: row.price_per_gb_storage,
            price_per_gb_bandwidth: row.price_per_gb_bandwidth,
            price_per_certificate: row.price_per_certificate,
            free_students_limit: row.free_students_limit,
            free_storage_gb: row.free_storage_gb,
            free_bandwidth_gb: row.free_bandwidth_gb,
            currency: row.currency,
            is_active: row.is_active,
            created_at: Some(row.created_at),
        }
    }
}

#[derive(FromRow)]
struct EnrollmentRow {
    id: Uuid,
    org_id: Uuid,
    course_id: Uuid,
    user_id: Uuid,
    status: String,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: row.id,
            org_id: row.org_id,
            course_id: row.course_id,
            user_id: row.user_id,
            status: EnrollmentStatus::from_string(&row.status),
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    billing_email: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SnapshotRow {
    active_students: Option<i64>,
    video_storage_bytes: Option<i64>,
    video_bandwidth_bytes: Option<i64>,
    certificates_issued: Option<i64>,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> BillingError {
    move |e| BillingError::store(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "usage-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> BillingResult<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(db_error("Failed to connect"))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> BillingResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::store(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_invoice(&self, invoice_id: Uuid) -> BillingResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get invoice"))?;

        row.map(Invoice::try_from).transpose()
    }
}

#[async_trait]
impl BillingStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Health check failed"))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Usage Operations
    // =========================================================================

    #[instrument(skip(self, event), fields(org_id = %event.org_id, event_type = %event.event_type))]
    async fn insert_usage_event(&self, event: &UsageEvent) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_usage_event"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO usage_events (id, org_id, event_type, quantity, unit, resource_id, resource_type, user_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.org_id)
        .bind(event.event_type.as_str())
        .bind(event.quantity)
        .bind(&event.unit)
        .bind(&event.resource_id)
        .bind(&event.resource_type)
        .bind(event.user_id)
        .bind(Json(&event.metadata))
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert usage event"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn usage_snapshot(
        &self,
        org_id: Uuid,
        period: BillingPeriod,
    ) -> BillingResult<UsageSnapshot> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["usage_snapshot"])
            .start_timer();

        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT active_students, video_storage_bytes, video_bandwidth_bytes, certificates_issued
            FROM org_usage_snapshot($1, $2, $3)
            "#,
        )
        .bind(org_id)
        .bind(BillingPeriod::start_of_day_utc(period.start))
        .bind(BillingPeriod::start_of_day_utc(period.end))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to aggregate usage"))?;

        timer.observe_duration();

        Ok(row
            .map(|r| {
                UsageSnapshot::from_parts(
                    r.active_students,
                    r.video_storage_bytes,
                    r.video_bandwidth_bytes,
                    r.certificates_issued,
                )
            })
            .unwrap_or_default())
    }

    // =========================================================================
    // Pricing Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn active_pricing(&self) -> BillingResult<Option<PricingConfig>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_pricing"])
            .start_timer();

        let row = sqlx::query_as::<_, PricingRow>(&format!(
            "SELECT {} FROM pricing_configs WHERE is_active LIMIT 1",
            PRICING_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load active pricing"))?;

        timer.observe_duration();
        Ok(row.map(PricingConfig::from))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn publish_pricing(&self, input: &CreatePricing) -> BillingResult<PricingConfig> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["publish_pricing"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        sqlx::query("UPDATE pricing_configs SET is_active = FALSE WHERE is_active")
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to deactivate pricing"))?;

        let row = sqlx::query_as::<_, PricingRow>(&format!(
            r#"
            INSERT INTO pricing_configs (id, name, version, price_per_active_student, price_per_gb_storage,
                price_per_gb_bandwidth, price_per_certificate, free_students_limit, free_storage_gb,
                free_bandwidth_gb, currency, is_active)
            VALUES ($1, $2,
                (SELECT COALESCE(MAX(version), 0) + 1 FROM pricing_configs WHERE name = $2),
                $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            RETURNING {}
            "#,
            PRICING_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.price_per_active_student)
        .bind(input.price_per_gb_storage)
        .bind(input.price_per_gb_bandwidth)
        .bind(input.price_per_certificate)
        .bind(input.free_students_limit)
        .bind(input.free_storage_gb)
        .bind(input.free_bandwidth_gb)
        .bind(&input.currency)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to insert pricing"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit pricing"))?;

        timer.observe_duration();
        Ok(row.into())
    }

    // =========================================================================
    // Organization Operations
    // =========================================================================

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn get_organization(&self, org_id: Uuid) -> BillingResult<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, billing_email, created_at FROM organizations WHERE id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get organization"))?;

        Ok(row.map(|r| Organization {
            id: r.id,
            name: r.name,
            billing_email: r.billing_email,
            created_at: r.created_at,
        }))
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    #[instrument(skip(self), fields(org_id = %org_id, period_start = %period_start))]
    async fn find_invoice_for_period(
        &self,
        org_id: Uuid,
        period_start: NaiveDate,
    ) -> BillingResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE org_id = $1 AND period_start = $2",
            INVOICE_COLUMNS
        ))
        .bind(org_id)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to look up invoice for period"))?;

        row.map(Invoice::try_from).transpose()
    }

    #[instrument(skip(self, invoice), fields(org_id = %invoice.org_id, period_start = %invoice.period_start))]
    async fn insert_invoice(&self, invoice: &Invoice) -> BillingResult<Invoice> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let result = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            INSERT INTO invoices (id, org_id, invoice_number, period_start, period_end, line_items,
                subtotal, total, amount_due, amount_paid, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice.id)
        .bind(invoice.org_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.period_start)
        .bind(invoice.period_end)
        .bind(Json(&invoice.line_items))
        .bind(invoice.subtotal)
        .bind(invoice.total)
        .bind(invoice.amount_due)
        .bind(invoice.amount_paid)
        .bind(&invoice.currency)
        .bind(invoice.status.as_str())
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .fetch_one(&self.pool)
        .await;

        timer.observe_duration();

        match result {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(BillingError::DuplicatePeriod {
                    org_id: invoice.org_id,
                    period_start: invoice.period_start,
                })
            }
            Err(e) => Err(db_error("Failed to insert invoice")(e)),
        }
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> BillingResult<Option<Invoice>> {
        self.fetch_invoice(invoice_id).await
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(&self, filter: &ListInvoicesFilter) -> BillingResult<Vec<Invoice>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE ($1::uuid IS NULL OR org_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY period_start DESC, created_at DESC
            LIMIT $3
            "#,
            INVOICE_COLUMNS
        ))
        .bind(filter.org_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list invoices"))?;

        timer.observe_duration();
        rows.into_iter().map(Invoice::try_from).collect()
    }

    #[instrument(skip(self, transition), fields(invoice_id = %invoice_id, target = %transition.target()))]
    async fn transition_invoice(
        &self,
        invoice_id: Uuid,
        transition: &InvoiceTransition,
    ) -> BillingResult<Invoice> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_invoice"])
            .start_timer();

        let target = transition.target();
        let sources: Vec<&str> = InvoiceStatus::allowed_sources(target)
            .iter()
            .map(|s| s.as_str())
            .collect();

        // The status guard lives in the WHERE clause so the check and the
        // write are one statement.
        let query = match transition {
            InvoiceTransition::Send { due_date, at } => sqlx::query_as::<_, InvoiceRow>(&format!(
                r#"
                UPDATE invoices
                SET status = 'open', due_date = $2, sent_at = $3, updated_at = $3
                WHERE id = $1 AND status = ANY($4)
                RETURNING {}
                "#,
                INVOICE_COLUMNS
            ))
            .bind(invoice_id)
            .bind(*due_date)
            .bind(*at)
            .bind(&sources)
            .fetch_optional(&self.pool)
            .await,
            InvoiceTransition::MarkPaid { amount_paid, at } => {
                sqlx::query_as::<_, InvoiceRow>(&format!(
                    r#"
                    UPDATE invoices
                    SET status = 'paid', amount_paid = COALESCE($2, amount_due), paid_at = $3, updated_at = $3
                    WHERE id = $1 AND status = ANY($4)
                    RETURNING {}
                    "#,
                    INVOICE_COLUMNS
                ))
                .bind(invoice_id)
                .bind(*amount_paid)
                .bind(*at)
                .bind(&sources)
                .fetch_optional(&self.pool)
                .await
            }
        };

        timer.observe_duration();

        match query.map_err(db_error("Failed to update invoice status"))? {
            Some(row) => row.try_into(),
            None => match self.fetch_invoice(invoice_id).await? {
                None => Err(BillingError::InvoiceNotFound(invoice_id)),
                Some(current) => Err(BillingError::InvalidTransition {
                    from: current.status,
                    to: target,
                }),
            },
        }
    }

    // =========================================================================
    // Enrollment Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(org_id = %input.org_id, course_id = %input.course_id))]
    async fn activate_enrollment(&self, input: &ActivateEnrollment) -> BillingResult<Enrollment> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["activate_enrollment"])
            .start_timer();

        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            INSERT INTO enrollments (id, org_id, course_id, user_id, status, payment_reference)
            VALUES ($1, $2, $3, $4, 'active', $5)
            ON CONFLICT (course_id, user_id) DO UPDATE
            SET status = 'active', payment_reference = EXCLUDED.payment_reference, updated_at = NOW()
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.org_id)
        .bind(input.course_id)
        .bind(input.user_id)
        .bind(&input.payment_reference)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to activate enrollment"))?;

        timer.observe_duration();
        Ok(row.into())
    }
}
