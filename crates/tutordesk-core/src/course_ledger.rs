//! Course-scoped credit ledgers.
//!
//! When an enrollment is approved, the course's credit cost is moved out of
//! the student's wallet and earmarked here, one ledger per student/course
//! pair. Lesson completion consumes from the earmarked pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ids::{CourseBookingId, CourseId, TransactionId, UserId};

/// A per-student-per-course credit sub-account.
///
/// Invariant: `credits_allocated == credits_used + credits_remaining`.
/// `credits_allocated` is set once, at enrollment approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseCreditLedger {
    /// The enrolled student.
    pub student_id: UserId,

    /// The course the credits are earmarked for.
    pub course_id: CourseId,

    /// The enrollment that funded this ledger, if known.
    pub course_booking_id: Option<CourseBookingId>,

    /// Credits allocated at approval time. Set once.
    pub credits_allocated: i64,

    /// Credits consumed so far.
    pub credits_used: i64,

    /// Credits still available for this course.
    pub credits_remaining: i64,

    /// When the ledger was created.
    pub created_at: DateTime<Utc>,

    /// When the ledger was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CourseCreditLedger {
    /// Create a ledger from an enrollment approval.
    #[must_use]
    pub fn new_allocation(
        student_id: UserId,
        course_id: CourseId,
        course_booking_id: Option<CourseBookingId>,
        credits_allocated: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id,
            course_id,
            course_booking_id,
            credits_allocated,
            credits_used: 0,
            credits_remaining: credits_allocated,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Check the allocation identity.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.credits_allocated == self.credits_used + self.credits_remaining
    }

    /// Consume `amount` credits from the earmarked pool.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientCourseCredits`] if the consumption
    /// would drive `credits_remaining` below zero; the ledger is unchanged.
    pub fn consume(&mut self, amount: i64, now: DateTime<Utc>) -> Result<()> {
        if amount <= 0 {
            return Err(CoreError::InvalidAmount(format!(
                "consumption amount must be positive, got {amount}"
            )));
        }
        if self.credits_remaining < amount {
            return Err(CoreError::InsufficientCourseCredits {
                remaining: self.credits_remaining,
                required: amount,
            });
        }

        self.credits_used += amount;
        self.credits_remaining -= amount;
        self.updated_at = now;

        debug_assert!(self.is_balanced());
        Ok(())
    }
}

/// Type of course ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseLedgerEntryType {
    /// Credits earmarked at enrollment approval.
    Allocation,

    /// Credits consumed, e.g. by a completed lesson.
    Consumption,
}

impl CourseLedgerEntryType {
    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Consumption => "consumption",
        }
    }
}

/// An append-only course ledger row, scoped to a student/course pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseLedgerTransaction {
    /// Time-ordered transaction id.
    pub id: TransactionId,

    /// The enrolled student.
    pub student_id: UserId,

    /// The course.
    pub course_id: CourseId,

    /// Signed amount. Allocations are positive, consumptions negative.
    pub amount: i64,

    /// Entry type.
    pub entry_type: CourseLedgerEntryType,

    /// Free-form notes.
    pub notes: Option<String>,

    /// The business record that caused the entry (enrollment or lesson id).
    pub reference_id: Option<Uuid>,

    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl CourseLedgerTransaction {
    /// Record an allocation entry.
    #[must_use]
    pub fn allocation(
        student_id: UserId,
        course_id: CourseId,
        amount: i64,
        reference_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            student_id,
            course_id,
            amount: amount.abs(),
            entry_type: CourseLedgerEntryType::Allocation,
            notes: None,
            reference_id,
            created_at: now,
        }
    }

    /// Record a consumption entry. The amount is stored negative.
    #[must_use]
    pub fn consumption(
        student_id: UserId,
        course_id: CourseId,
        amount: i64,
        reference_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            student_id,
            course_id,
            amount: -amount.abs(),
            entry_type: CourseLedgerEntryType::Consumption,
            notes: None,
            reference_id,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(allocated: i64) -> CourseCreditLedger {
        CourseCreditLedger::new_allocation(
            UserId::generate(),
            CourseId::generate(),
            Some(CourseBookingId::generate()),
            allocated,
            Utc::now(),
        )
    }

    #[test]
    fn allocation_sets_remaining_to_allocated() {
        let l = ledger(5);
        assert_eq!(l.credits_allocated, 5);
        assert_eq!(l.credits_used, 0);
        assert_eq!(l.credits_remaining, 5);
        assert!(l.is_balanced());
    }

    #[test]
    fn consume_moves_credits_to_used() {
        let mut l = ledger(5);
        l.consume(2, Utc::now()).unwrap();
        assert_eq!(l.credits_used, 2);
        assert_eq!(l.credits_remaining, 3);
        assert!(l.is_balanced());
    }

    #[test]
    fn consume_beyond_remaining_rejected() {
        let mut l = ledger(1);
        let err = l.consume(2, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientCourseCredits {
                remaining: 1,
                required: 2
            }
        ));
        assert_eq!(l.credits_remaining, 1);
    }

    #[test]
    fn consume_rejects_non_positive_amounts() {
        let mut l = ledger(5);
        assert!(l.consume(0, Utc::now()).is_err());
        assert!(l.consume(-1, Utc::now()).is_err());
    }

    #[test]
    fn consumption_entry_is_negative() {
        let e = CourseLedgerTransaction::consumption(
            UserId::generate(),
            CourseId::generate(),
            1,
            None,
            Utc::now(),
        );
        assert_eq!(e.amount, -1);
        assert_eq!(e.entry_type, CourseLedgerEntryType::Consumption);
    }
}
