//! Usage event and usage snapshot models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of platform consumption an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageEventType {
    #[serde(rename = "student.login")]
    StudentLogin,
    #[serde(rename = "student.active")]
    StudentActive,
    #[serde(rename = "video.upload")]
    VideoUpload,
    #[serde(rename = "video.stream")]
    VideoStream,
    #[serde(rename = "video.delete")]
    VideoDelete,
    #[serde(rename = "certificate.issued")]
    CertificateIssued,
    #[serde(rename = "course.created")]
    CourseCreated,
    #[serde(rename = "course.published")]
    CoursePublished,
    #[serde(rename = "lesson.created")]
    LessonCreated,
    #[serde(rename = "quiz.completed")]
    QuizCompleted,
    #[serde(rename = "storage.upload")]
    StorageUpload,
    #[serde(rename = "storage.delete")]
    StorageDelete,
}

impl UsageEventType {
    pub const ALL: [UsageEventType; 12] = [
        UsageEventType::StudentLogin,
        UsageEventType::StudentActive,
        UsageEventType::VideoUpload,
        UsageEventType::VideoStream,
        UsageEventType::VideoDelete,
        UsageEventType::CertificateIssued,
        UsageEventType::CourseCreated,
        UsageEventType::CoursePublished,
        UsageEventType::LessonCreated,
        UsageEventType::QuizCompleted,
        UsageEventType::StorageUpload,
        UsageEventType::StorageDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageEventType::StudentLogin => "student.login",
            UsageEventType::StudentActive => "student.active",
            UsageEventType::VideoUpload => "video.upload",
            UsageEventType::VideoStream => "video.stream",
            UsageEventType::VideoDelete => "video.delete",
            UsageEventType::CertificateIssued => "certificate.issued",
            UsageEventType::CourseCreated => "course.created",
            UsageEventType::CoursePublished => "course.published",
            UsageEventType::LessonCreated => "lesson.created",
            UsageEventType::QuizCompleted => "quiz.completed",
            UsageEventType::StorageUpload => "storage.upload",
            UsageEventType::StorageDelete => "storage.delete",
        }
    }

    /// Events that add bytes to an organization's stored total.
    pub fn adds_storage(&self) -> bool {
        matches!(
            self,
            UsageEventType::VideoUpload | UsageEventType::StorageUpload
        )
    }

    /// Events that remove bytes from an organization's stored total.
    pub fn removes_storage(&self) -> bool {
        matches!(
            self,
            UsageEventType::VideoDelete | UsageEventType::StorageDelete
        )
    }
}

impl fmt::Display for UsageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsageEventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown usage event type: {}", s))
    }
}

/// Immutable, append-only usage fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub id: Uuid,
    pub org_id: Uuid,
    pub event_type: UsageEventType,
    pub quantity: i64,
    pub unit: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a usage event.
#[derive(Debug, Clone)]
pub struct RecordUsage {
    pub org_id: Uuid,
    pub event_type: UsageEventType,
    pub quantity: i64,
    pub unit: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl RecordUsage {
    /// A single-unit event with no references attached.
    pub fn new(org_id: Uuid, event_type: UsageEventType) -> Self {
        Self {
            org_id,
            event_type,
            quantity: 1,
            unit: None,
            resource_id: None,
            resource_type: None,
            user_id: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn quantity(mut self, quantity: i64, unit: &str) -> Self {
        self.quantity = quantity;
        self.unit = Some(unit.to_string());
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: impl ToString) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materialize the event with a fresh id and timestamp.
    pub fn into_event(self) -> UsageEvent {
        UsageEvent {
            id: Uuid::new_v4(),
            org_id: self.org_id,
            event_type: self.event_type,
            quantity: self.quantity,
            unit: self.unit,
            resource_id: self.resource_id,
            resource_type: self.resource_type,
            user_id: self.user_id,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Per-organization usage for one billing period.
///
/// `active_students` and `video_storage_bytes` are point-in-time totals;
/// bandwidth and certificates are summed over the period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub active_students: i64,
    pub video_storage_bytes: i64,
    pub video_bandwidth_bytes: i64,
    pub certificates_issued: i64,
}

impl UsageSnapshot {
    /// Build a snapshot from possibly-missing aggregate columns.
    pub fn from_parts(
        active_students: Option<i64>,
        video_storage_bytes: Option<i64>,
        video_bandwidth_bytes: Option<i64>,
        certificates_issued: Option<i64>,
    ) -> Self {
        let clamp = |v: Option<i64>| v.unwrap_or(0).max(0);
        Self {
            active_students: clamp(active_students),
            video_storage_bytes: clamp(video_storage_bytes),
            video_bandwidth_bytes: clamp(video_bandwidth_bytes),
            certificates_issued: clamp(certificates_issued),
        }
    }
}
