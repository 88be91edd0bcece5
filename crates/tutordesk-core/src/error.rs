//! Error types for tutordesk core rules.

use crate::ids::IdError;
use crate::lesson::LessonStatus;

/// Result type for core domain operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the ledger and lesson state-machine rules.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A lesson proposal failed validation before any persistence.
    #[error("invalid proposal: {reason}")]
    InvalidProposal {
        /// What was wrong with the proposal.
        reason: String,
    },

    /// One of the three proposed start times falls outside the date window.
    #[error("option {option} is outside the requested window")]
    OptionOutOfRange {
        /// The offending option (1-based).
        option: u8,
    },

    /// Wallet balance too low for a consumption-type transaction.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current remaining credits.
        balance: i64,
        /// Credits required by the operation.
        required: i64,
    },

    /// Course ledger balance too low for the requested consumption.
    #[error("insufficient course credits: remaining={remaining}, required={required}")]
    InsufficientCourseCredits {
        /// Remaining course credits.
        remaining: i64,
        /// Credits required by the operation.
        required: i64,
    },

    /// A course ledger already exists for this student/course pair.
    #[error("course credits already allocated for student {student_id} on course {course_id}")]
    DuplicateAllocation {
        /// The student.
        student_id: String,
        /// The course.
        course_id: String,
    },

    /// The requested lesson transition is not allowed from the current state.
    #[error("cannot {action} a lesson in state {from:?}")]
    InvalidTransition {
        /// Current lesson status.
        from: LessonStatus,
        /// The attempted action.
        action: &'static str,
    },

    /// The chosen tutor cannot take this lesson.
    #[error("tutor unavailable: {reason}")]
    TutorUnavailable {
        /// Why the tutor was rejected.
        reason: String,
    },

    /// The enrollment decision is not allowed from its current state.
    #[error("enrollment is not pending (already decided)")]
    EnrollmentAlreadyDecided,

    /// A transaction amount violates the rules for its type.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
