//! Catalog reference data and enrollment requests.
//!
//! Courses and user profiles are owned by the main platform and consumed here
//! read-only. The only catalog record this system mutates is a
//! [`CourseBooking`]'s status and decision fields, at enrollment approval or
//! rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{CourseBookingId, CourseId, UserId};

/// Platform role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// A student who books lessons.
    Student,

    /// A tutor who delivers lessons.
    Tutor,

    /// Back-office staff.
    Admin,
}

impl UserRole {
    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Tutor => "tutor",
            Self::Admin => "admin",
        }
    }
}

/// A user profile, synced from the main platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user id.
    pub id: UserId,

    /// Email address; used to match webhook participant events.
    pub email: String,

    /// Display name.
    pub display_name: String,

    /// Platform role.
    pub role: UserRole,

    /// Whether the account is active.
    pub active: bool,

    /// Whether the account passed vetting (tutors).
    pub approved: bool,

    /// IANA timezone, used when provisioning meetings.
    pub timezone: String,
}

impl UserProfile {
    /// Check whether this user may be assigned as the tutor of a lesson.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TutorUnavailable`] naming the first failed check.
    pub fn ensure_assignable_tutor(&self) -> Result<()> {
        if self.role != UserRole::Tutor {
            return Err(CoreError::TutorUnavailable {
                reason: format!("user {} is not a tutor", self.id),
            });
        }
        if !self.active {
            return Err(CoreError::TutorUnavailable {
                reason: format!("tutor {} is inactive", self.id),
            });
        }
        if !self.approved {
            return Err(CoreError::TutorUnavailable {
                reason: format!("tutor {} is not approved", self.id),
            });
        }
        Ok(())
    }
}

/// A catalog course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// The course id.
    pub id: CourseId,

    /// Course name.
    pub name: String,

    /// Wallet credits required to enroll.
    pub credit_cost: i64,
}

/// Status of an enrollment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Awaiting a staff decision.
    Pending,

    /// Approved; course credits were allocated.
    Approved,

    /// Rejected, manually or automatically on insufficient funds.
    Rejected,
}

impl BookingStatus {
    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A student's request to enroll in a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseBooking {
    /// The enrollment id.
    pub id: CourseBookingId,

    /// The requested course.
    pub course_id: CourseId,

    /// The requesting student.
    pub student_id: UserId,

    /// Decision state.
    pub status: BookingStatus,

    /// When the decision was made.
    pub decision_at: Option<DateTime<Utc>>,

    /// Who made the decision; `None` for automatic rejections.
    pub decision_by: Option<UserId>,

    /// Explanatory note attached to the decision.
    pub decision_note: Option<String>,

    /// When the request was created.
    pub created_at: DateTime<Utc>,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CourseBooking {
    /// Create a pending enrollment request.
    #[must_use]
    pub fn new(course_id: CourseId, student_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CourseBookingId::generate(),
            course_id,
            student_id,
            status: BookingStatus::Pending,
            decision_at: None,
            decision_by: None,
            decision_note: None,
            created_at: now,
            deleted_at: None,
        }
    }

    /// Approve a pending enrollment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EnrollmentAlreadyDecided`] unless pending.
    pub fn approve(&mut self, admin_id: UserId, now: DateTime<Utc>) -> Result<()> {
        self.decide(BookingStatus::Approved, Some(admin_id), None, now)
    }

    /// Reject a pending enrollment with a note. `decided_by` is `None` for
    /// automatic rejections (e.g. insufficient funds at approval time).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EnrollmentAlreadyDecided`] unless pending.
    pub fn reject(
        &mut self,
        decided_by: Option<UserId>,
        note: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.decide(BookingStatus::Rejected, decided_by, Some(note.into()), now)
    }

    fn decide(
        &mut self,
        status: BookingStatus,
        decided_by: Option<UserId>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != BookingStatus::Pending {
            return Err(CoreError::EnrollmentAlreadyDecided);
        }
        self.status = status;
        self.decision_at = Some(now);
        self.decision_by = decided_by;
        self.decision_note = note;
        Ok(())
    }
}
