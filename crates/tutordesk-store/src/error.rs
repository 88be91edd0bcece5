//! Error types for tutordesk storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Wallet balance too low for a consumption-type transaction.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current remaining credits.
        balance: i64,
        /// Credits required.
        required: i64,
    },

    /// Course ledger balance too low for the requested consumption.
    #[error("insufficient course credits: remaining={remaining}, required={required}")]
    InsufficientCourseCredits {
        /// Remaining course credits.
        remaining: i64,
        /// Credits required.
        required: i64,
    },

    /// A live course ledger already exists for the student/course pair.
    #[error("course credits already allocated for student {student_id} on course {course_id}")]
    DuplicateAllocation {
        /// The student.
        student_id: String,
        /// The course.
        course_id: String,
    },

    /// The enrollment was already decided.
    #[error("enrollment already decided")]
    AlreadyDecided,

    /// Optimistic-concurrency token mismatch; the caller should reload and
    /// retry.
    #[error("concurrent modification detected")]
    Conflict,

    /// A domain rule rejected the write; the store is unchanged.
    #[error(transparent)]
    Domain(tutordesk_core::CoreError),
}

impl From<tutordesk_core::CoreError> for StoreError {
    fn from(err: tutordesk_core::CoreError) -> Self {
        use tutordesk_core::CoreError;
        match err {
            CoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            CoreError::InsufficientCourseCredits {
                remaining,
                required,
            } => Self::InsufficientCourseCredits {
                remaining,
                required,
            },
            CoreError::DuplicateAllocation {
                student_id,
                course_id,
            } => Self::DuplicateAllocation {
                student_id,
                course_id,
            },
            CoreError::EnrollmentAlreadyDecided => Self::AlreadyDecided,
            other => Self::Domain(other),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                id: String::new(),
            },
            other => Self::Database(other.to_string()),
        }
    }
}
