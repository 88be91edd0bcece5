//! Core types and rules for the tutordesk back office.
//!
//! This crate provides the foundational types used throughout the platform:
//!
//! - **Identifiers**: `UserId`, `CourseId`, `CourseBookingId`, `LessonId`,
//!   `TransactionId`
//! - **Wallets**: `Wallet`, `WalletTransaction`, `WalletTransactionType`
//! - **Course ledgers**: `CourseCreditLedger`, `CourseLedgerTransaction`
//! - **Lessons**: `LessonBooking`, `LessonStatus`, `LessonChangeLogEntry`
//! - **Catalog**: `Course`, `CourseBooking`, `UserProfile` (read-only
//!   reference data)
//!
//! # Credits
//!
//! Credits are an internal unit, not currency. A course's `credit_cost` is
//! debited from the student's wallet at enrollment approval and earmarked in
//! a per-course ledger; completed lessons consume from that ledger. Balances
//! are stored as `i64` and every movement writes an append-only transaction
//! row with a `balance_after` snapshot.
//!
//! All state-machine and ledger rules here are pure: they take `now` and the
//! acting user explicitly and never touch ambient state, so the storage layer
//! can apply them inside its own transaction boundaries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod course_ledger;
pub mod error;
pub mod ids;
pub mod lesson;
pub mod wallet;

pub use catalog::{BookingStatus, Course, CourseBooking, UserProfile, UserRole};
pub use course_ledger::{CourseCreditLedger, CourseLedgerEntryType, CourseLedgerTransaction};
pub use error::{CoreError, Result};
pub use ids::{CourseBookingId, CourseId, IdError, LessonId, TransactionId, UserId};
pub use lesson::{
    LessonAction, LessonBooking, LessonChangeLogEntry, LessonRequest, LessonStatus, Participant,
    RescheduleOutcome, ScheduleOption, SessionEndOutcome, RESCHEDULE_CUTOFF_HOURS,
};
pub use wallet::{
    LedgerReference, NewWalletTransaction, ReferenceType, Wallet, WalletTransaction,
    WalletTransactionType,
};
