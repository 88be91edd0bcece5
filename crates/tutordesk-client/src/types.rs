//! Request and response types for the tutordesk client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutordesk_core::{CourseBookingId, CourseId, LessonId, UserId};

/// A course pushed to the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CourseSync {
    /// The course id.
    pub id: CourseId,
    /// Course name.
    pub name: String,
    /// Wallet credits required to enroll.
    pub credit_cost: i64,
}

/// A user profile pushed to the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct UserSync {
    /// The user id.
    pub id: UserId,
    /// Email address; matched against webhook participant events.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Platform role: `student`, `tutor`, or `admin`.
    pub role: String,
    /// Whether the account is active.
    pub active: bool,
    /// Whether the account passed vetting (tutors).
    pub approved: bool,
    /// IANA timezone.
    pub timezone: String,
}

/// Response from a catalog sync call.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    /// How many records were written.
    pub synced: usize,
}

/// A user's wallet balance.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletResponse {
    /// The wallet owner.
    pub user_id: UserId,
    /// Credits ever added.
    pub total_credits: i64,
    /// Credits ever consumed.
    pub used_credits: i64,
    /// Credits currently available.
    pub remaining_credits: i64,
}

/// A lesson request submitted on a student's behalf.
#[derive(Debug, Clone, Serialize)]
pub struct LessonRequestInput {
    /// The course to be taught.
    pub course_id: CourseId,
    /// The approved enrollment funding this lesson, if linked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_booking_id: Option<CourseBookingId>,
    /// Start of the acceptable window.
    pub date_from: DateTime<Utc>,
    /// End of the acceptable window.
    pub date_to: DateTime<Utc>,
    /// The three candidate start times.
    pub options: [DateTime<Utc>; 3],
    /// Lesson length in minutes.
    pub duration_minutes: i32,
}

/// A lesson as returned by the API.
///
/// Carries the fields the platform cares about; the full record has more.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonResponse {
    /// The lesson id.
    pub id: LessonId,
    /// The course being taught.
    pub course_id: CourseId,
    /// The student.
    pub student_id: UserId,
    /// The assigned tutor, once scheduled.
    pub tutor_id: Option<UserId>,
    /// Lifecycle state.
    pub status: String,
    /// Committed start, once scheduled.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Committed end, once scheduled.
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Meeting join URL, once provisioned.
    pub meeting_join_url: Option<String>,
}

/// API error response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// The error body.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details, when present.
    pub details: Option<serde_json::Value>,
}
