//! Fire-and-forget usage event recording.

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{RecordUsage, UsageEventType};
use crate::services::metrics::{record_usage_event, record_usage_write_failure};
use crate::services::store::SharedStore;

/// Appends usage events without ever failing the caller.
///
/// Each write runs on its own task. Store failures are logged and counted,
/// never returned.
#[derive(Clone)]
pub struct UsageRecorder {
    store: SharedStore,
}

impl UsageRecorder {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Record one event. The returned handle may be dropped.
    pub fn record(&self, input: RecordUsage) -> JoinHandle<()> {
        let store = self.store.clone();
        let event = input.into_event();

        tokio::spawn(async move {
            match store.insert_usage_event(&event).await {
                Ok(()) => {
                    record_usage_event(event.event_type.as_str());
                    tracing::debug!(
                        org_id = %event.org_id,
                        event_type = %event.event_type,
                        quantity = event.quantity,
                        "Usage event recorded"
                    );
                }
                Err(e) => {
                    record_usage_write_failure(event.event_type.as_str());
                    tracing::error!(
                        org_id = %event.org_id,
                        event_type = %event.event_type,
                        error = %e,
                        "Failed to record usage event"
                    );
                }
            }
        })
    }

    pub fn certificate_issued(
        &self,
        org_id: Uuid,
        certificate_id: Uuid,
        user_id: Uuid,
    ) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::CertificateIssued)
                .quantity(1, "count")
                .resource("certificate", certificate_id)
                .user(Some(user_id)),
        )
    }

    pub fn video_uploaded(&self, org_id: Uuid, video_id: &str, bytes: i64) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::VideoUpload)
                .quantity(bytes, "bytes")
                .resource("video", video_id),
        )
    }

    pub fn video_streamed(
        &self,
        org_id: Uuid,
        video_id: &str,
        bytes: i64,
        user_id: Option<Uuid>,
    ) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::VideoStream)
                .quantity(bytes, "bytes")
                .resource("video", video_id)
                .user(user_id),
        )
    }

    pub fn video_deleted(&self, org_id: Uuid, video_id: &str, bytes: i64) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::VideoDelete)
                .quantity(bytes, "bytes")
                .resource("video", video_id),
        )
    }

    pub fn course_created(&self, org_id: Uuid, course_id: Uuid, user_id: Uuid) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::CourseCreated)
                .resource("course", course_id)
                .user(Some(user_id)),
        )
    }

    pub fn course_published(
        &self,
        org_id: Uuid,
        course_id: Uuid,
        user_id: Uuid,
    ) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::CoursePublished)
                .resource("course", course_id)
                .user(Some(user_id)),
        )
    }

    /// A student became billable, typically after a completed checkout.
    pub fn student_active(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        course_id: Uuid,
        payment_reference: Option<&str>,
    ) -> JoinHandle<()> {
        self.record(
            RecordUsage::new(org_id, UsageEventType::StudentActive)
                .quantity(1, "count")
                .resource("course", course_id)
                .user(Some(user_id))
                .metadata(serde_json::json!({ "paymentReference": payment_reference })),
        )
    }
}
