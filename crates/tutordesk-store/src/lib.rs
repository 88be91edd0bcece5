//! Storage layer for tutordesk.
//!
//! This crate persists wallets, ledgers, enrollments, lessons, and the lesson
//! change log. The production backend is PostgreSQL via sqlx ([`PgStore`]);
//! [`MemStore`] provides the same semantics in memory for tests and demos.
//!
//! # Atomicity
//!
//! Every mutating trait operation is one atomic unit: the backing transaction
//! either applies all of its writes (balance update + ledger row, or lesson
//! row + change-log row) or none of them. Concurrent mutations of the same
//! wallet or ledger row serialize through row-level locking in PostgreSQL;
//! lesson rows additionally carry an optimistic `revision` token so webhook-
//! and user-driven transitions on the same lesson can race safely across
//! stateless replicas. No application-level mutex guards any of this.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod mem;
pub mod pg;

pub use error::{Result, StoreError};
pub use mem::MemStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tutordesk_core::{
    Course, CourseBooking, CourseBookingId, CourseCreditLedger, CourseId, CourseLedgerTransaction,
    LessonBooking, LessonChangeLogEntry, LessonId, NewWalletTransaction, UserId, UserProfile,
    Wallet, WalletTransaction,
};

/// Result of a funds-gated enrollment approval.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// The wallet covered the course cost: credits were spent, the course
    /// ledger allocated, and the booking approved — all in one transaction.
    Approved {
        /// The approved booking.
        booking: CourseBooking,
        /// The freshly allocated course ledger.
        ledger: CourseCreditLedger,
        /// The wallet after the spend.
        wallet: Wallet,
    },

    /// The wallet could not cover the course cost: the booking was rejected
    /// with an explanatory note instead of being left pending. Nothing else
    /// was written.
    AutoRejected {
        /// The rejected booking.
        booking: CourseBooking,
        /// The wallet balance at decision time.
        balance: i64,
        /// The course cost that could not be covered.
        required: i64,
    },
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (PostgreSQL in production, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Wallets
    // =========================================================================

    /// Return the user's wallet, inserting a zeroed one on first access.
    ///
    /// Race-safe under concurrent first access: losers of the insert race
    /// re-read the winner's row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_or_create_wallet(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Wallet>;

    /// Apply a transaction to the wallet and append the ledger row, atomically.
    ///
    /// Returns the updated wallet and the recorded transaction (carrying the
    /// `balance_after` snapshot).
    ///
    /// # Errors
    ///
    /// `StoreError::InsufficientCredits` if a consumption would drive the
    /// balance negative; nothing is written in that case.
    async fn add_wallet_transaction(
        &self,
        new: NewWalletTransaction,
        now: DateTime<Utc>,
    ) -> Result<(Wallet, WalletTransaction)>;

    /// List a user's wallet transactions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_wallet_transactions(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>>;

    // =========================================================================
    // Course ledgers
    // =========================================================================

    /// Allocate course credits for a student/course pair, atomically with the
    /// allocation ledger row. Does not touch the wallet.
    ///
    /// # Errors
    ///
    /// `StoreError::DuplicateAllocation` if a live ledger already exists for
    /// the pair; the ledger amount is never doubled.
    async fn allocate_course_credits(
        &self,
        student_id: UserId,
        course_id: CourseId,
        course_booking_id: Option<CourseBookingId>,
        credits: i64,
        reference_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CourseCreditLedger>;

    /// Consume credits from a course ledger, atomically with the consumption
    /// ledger row.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if no live ledger exists for the pair.
    /// - `StoreError::InsufficientCourseCredits` if the ledger cannot cover
    ///   the amount; nothing is written.
    async fn consume_course_credits(
        &self,
        student_id: UserId,
        course_id: CourseId,
        amount: i64,
        reference_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CourseCreditLedger>;

    /// Get the course ledger for a student/course pair, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_course_ledger(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseCreditLedger>>;

    /// List the course ledger rows for a student/course pair, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_course_ledger_transactions(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<CourseLedgerTransaction>>;

    // =========================================================================
    // Enrollments
    // =========================================================================

    /// Insert a pending enrollment request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_course_booking(&self, booking: &CourseBooking) -> Result<()>;

    /// Get an enrollment request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_course_booking(&self, id: CourseBookingId) -> Result<Option<CourseBooking>>;

    /// List a student's enrollment requests, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_course_bookings_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<CourseBooking>>;

    /// Approve an enrollment, funds-gated, in one transaction: wallet spend,
    /// course-ledger allocation, and booking decision succeed or fail
    /// together. Insufficient funds is not an error: the booking is rejected
    /// with a note and reported as [`ApprovalOutcome::AutoRejected`].
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the booking or its course is missing.
    /// - `StoreError::AlreadyDecided` if the booking is not pending.
    /// - `StoreError::DuplicateAllocation` if a live course ledger already
    ///   exists for the pair; nothing is written, no credits are spent.
    async fn approve_enrollment(
        &self,
        booking_id: CourseBookingId,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome>;

    /// Reject a pending enrollment with a note.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the booking is missing.
    /// - `StoreError::AlreadyDecided` if the booking is not pending.
    async fn reject_enrollment(
        &self,
        booking_id: CourseBookingId,
        admin_id: UserId,
        note: String,
        now: DateTime<Utc>,
    ) -> Result<CourseBooking>;

    // =========================================================================
    // Lessons
    // =========================================================================

    /// Insert a freshly requested lesson with its first change-log row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_lesson(
        &self,
        lesson: &LessonBooking,
        log: &LessonChangeLogEntry,
    ) -> Result<()>;

    /// Get a lesson by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonBooking>>;

    /// Find the lesson holding a provisioned meeting id, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_lesson_by_meeting_id(&self, meeting_id: &str) -> Result<Option<LessonBooking>>;

    /// Persist a mutated lesson guarded by its optimistic `revision` token,
    /// atomically with an optional change-log row. The stored revision
    /// becomes `expected_revision + 1`.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the stored revision no longer matches;
    ///   the caller should reload and retry.
    /// - `StoreError::NotFound` if the lesson is missing.
    async fn update_lesson(
        &self,
        lesson: &LessonBooking,
        expected_revision: i64,
        log: Option<&LessonChangeLogEntry>,
    ) -> Result<()>;

    /// List a lesson's change log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_lesson_history(&self, id: LessonId) -> Result<Vec<LessonChangeLogEntry>>;

    // =========================================================================
    // Webhook delivery dedup
    // =========================================================================

    /// Check whether a webhook delivery key has already been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn webhook_event_seen(&self, key: &str) -> Result<bool>;

    /// Record a webhook delivery key, after the event has been applied.
    /// Returns `false` if the key was already recorded (duplicate delivery).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_webhook_event(&self, key: &str, now: DateTime<Utc>) -> Result<bool>;

    // =========================================================================
    // Catalog reference data (synced from the main platform)
    // =========================================================================

    /// Insert or update a catalog course.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_course(&self, course: &Course) -> Result<()>;

    /// Get a catalog course by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// Insert or update a user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_user(&self, user: &UserProfile) -> Result<()>;

    /// Get a user profile by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>>;
}
