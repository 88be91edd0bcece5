//! In-memory storage implementation.
//!
//! `MemStore` mirrors the PostgreSQL backend's semantics — atomic compound
//! operations, funds checks, duplicate-allocation guards, revision conflicts,
//! webhook dedup — behind a single async mutex. One lock acquisition plays
//! the role of one database transaction. Used by integration tests and local
//! demos; production runs [`crate::PgStore`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use tutordesk_core::{
    Course, CourseBooking, CourseBookingId, CourseCreditLedger, CourseId, CourseLedgerTransaction,
    LessonBooking, LessonChangeLogEntry, LessonId, NewWalletTransaction, UserId, UserProfile,
    Wallet, WalletTransaction,
};

use crate::error::{Result, StoreError};
use crate::{ApprovalOutcome, Store};

/// Uniform soft-delete filter used by every read.
const fn live(deleted_at: Option<DateTime<Utc>>) -> bool {
    deleted_at.is_none()
}

#[derive(Default)]
struct Inner {
    wallets: HashMap<UserId, Wallet>,
    wallet_txns: Vec<WalletTransaction>,
    course_ledgers: HashMap<(UserId, CourseId), CourseCreditLedger>,
    course_ledger_txns: Vec<CourseLedgerTransaction>,
    course_bookings: HashMap<CourseBookingId, CourseBooking>,
    lessons: HashMap<LessonId, LessonBooking>,
    lesson_logs: Vec<LessonChangeLogEntry>,
    webhook_events: HashSet<String>,
    courses: HashMap<CourseId, Course>,
    users: HashMap<UserId, UserProfile>,
}

/// Map-backed storage implementation.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn wallet_entry(&mut self, user_id: UserId, now: DateTime<Utc>) -> &mut Wallet {
        self.wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id, now))
    }

    fn live_ledger(&self, student_id: UserId, course_id: CourseId) -> Option<&CourseCreditLedger> {
        self.course_ledgers
            .get(&(student_id, course_id))
            .filter(|l| live(l.deleted_at))
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get_or_create_wallet(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Wallet> {
        let mut inner = self.inner.lock().await;
        Ok(inner.wallet_entry(user_id, now).clone())
    }

    async fn add_wallet_transaction(
        &self,
        new: NewWalletTransaction,
        now: DateTime<Utc>,
    ) -> Result<(Wallet, WalletTransaction)> {
        let mut inner = self.inner.lock().await;
        let mut wallet = inner.wallet_entry(new.user_id, now).clone();
        wallet.apply(new.amount, new.transaction_type, now)?;

        let txn = WalletTransaction::record(new, wallet.remaining_credits, now);
        inner.wallets.insert(wallet.user_id, wallet.clone());
        inner.wallet_txns.push(txn.clone());
        Ok((wallet, txn))
    }

    async fn list_wallet_transactions(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>> {
        let inner = self.inner.lock().await;
        let mut txns: Vec<_> = inner
            .wallet_txns
            .iter()
            .filter(|t| t.user_id == user_id && live(t.deleted_at))
            .cloned()
            .collect();
        txns.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(txns
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn allocate_course_credits(
        &self,
        student_id: UserId,
        course_id: CourseId,
        course_booking_id: Option<CourseBookingId>,
        credits: i64,
        reference_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CourseCreditLedger> {
        let mut inner = self.inner.lock().await;
        if inner.live_ledger(student_id, course_id).is_some() {
            return Err(StoreError::DuplicateAllocation {
                student_id: student_id.to_string(),
                course_id: course_id.to_string(),
            });
        }

        let ledger = CourseCreditLedger::new_allocation(
            student_id,
            course_id,
            course_booking_id,
            credits,
            now,
        );
        inner
            .course_ledgers
            .insert((student_id, course_id), ledger.clone());
        inner
            .course_ledger_txns
            .push(CourseLedgerTransaction::allocation(
                student_id,
                course_id,
                credits,
                reference_id,
                now,
            ));
        Ok(ledger)
    }

    async fn consume_course_credits(
        &self,
        student_id: UserId,
        course_id: CourseId,
        amount: i64,
        reference_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CourseCreditLedger> {
        let mut inner = self.inner.lock().await;
        let mut ledger = inner
            .live_ledger(student_id, course_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "course ledger",
                id: format!("{student_id}/{course_id}"),
            })?;
        ledger.consume(amount, now)?;

        inner
            .course_ledgers
            .insert((student_id, course_id), ledger.clone());
        inner
            .course_ledger_txns
            .push(CourseLedgerTransaction::consumption(
                student_id,
                course_id,
                amount,
                reference_id,
                now,
            ));
        Ok(ledger)
    }

    async fn get_course_ledger(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseCreditLedger>> {
        let inner = self.inner.lock().await;
        Ok(inner.live_ledger(student_id, course_id).cloned())
    }

    async fn list_course_ledger_transactions(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<CourseLedgerTransaction>> {
        let inner = self.inner.lock().await;
        let mut txns: Vec<_> = inner
            .course_ledger_txns
            .iter()
            .filter(|t| t.student_id == student_id && t.course_id == course_id)
            .cloned()
            .collect();
        txns.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(txns)
    }

    async fn insert_course_booking(&self, booking: &CourseBooking) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.course_bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_course_booking(&self, id: CourseBookingId) -> Result<Option<CourseBooking>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .course_bookings
            .get(&id)
            .filter(|b| live(b.deleted_at))
            .cloned())
    }

    async fn list_course_bookings_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<CourseBooking>> {
        let inner = self.inner.lock().await;
        let mut bookings: Vec<_> = inner
            .course_bookings
            .values()
            .filter(|b| b.student_id == student_id && live(b.deleted_at))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn approve_enrollment(
        &self,
        booking_id: CourseBookingId,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome> {
        let mut inner = self.inner.lock().await;

        let mut booking = inner
            .course_bookings
            .get(&booking_id)
            .filter(|b| live(b.deleted_at))
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "enrollment",
                id: booking_id.to_string(),
            })?;
        if booking.status != tutordesk_core::BookingStatus::Pending {
            return Err(StoreError::AlreadyDecided);
        }

        let course = inner
            .courses
            .get(&booking.course_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "course",
                id: booking.course_id.to_string(),
            })?;

        let mut wallet = inner.wallet_entry(booking.student_id, now).clone();

        if !wallet.has_sufficient_credits(course.credit_cost) {
            let note = format!(
                "auto-rejected: insufficient credits (balance {}, course cost {})",
                wallet.remaining_credits, course.credit_cost
            );
            booking.reject(None, note, now)?;
            let balance = wallet.remaining_credits;
            inner.course_bookings.insert(booking.id, booking.clone());
            return Ok(ApprovalOutcome::AutoRejected {
                booking,
                balance,
                required: course.credit_cost,
            });
        }

        // Duplicate check before spending so a conflict never leaves credits
        // silently spent.
        if inner
            .live_ledger(booking.student_id, booking.course_id)
            .is_some()
        {
            return Err(StoreError::DuplicateAllocation {
                student_id: booking.student_id.to_string(),
                course_id: booking.course_id.to_string(),
            });
        }

        let spend = NewWalletTransaction::spend(
            booking.student_id,
            course.credit_cost,
            "enrollment_approval",
        )
        .with_reference(
            tutordesk_core::ReferenceType::CourseBooking,
            *booking.id.as_uuid(),
        )
        .by(admin_id);
        wallet.apply(spend.amount, spend.transaction_type, now)?;
        let wallet_txn = WalletTransaction::record(spend, wallet.remaining_credits, now);

        let ledger = CourseCreditLedger::new_allocation(
            booking.student_id,
            booking.course_id,
            Some(booking.id),
            course.credit_cost,
            now,
        );
        let allocation = CourseLedgerTransaction::allocation(
            booking.student_id,
            booking.course_id,
            course.credit_cost,
            Some(*booking.id.as_uuid()),
            now,
        );

        booking.approve(admin_id, now)?;

        inner.wallets.insert(wallet.user_id, wallet.clone());
        inner.wallet_txns.push(wallet_txn);
        inner
            .course_ledgers
            .insert((ledger.student_id, ledger.course_id), ledger.clone());
        inner.course_ledger_txns.push(allocation);
        inner.course_bookings.insert(booking.id, booking.clone());

        Ok(ApprovalOutcome::Approved {
            booking,
            ledger,
            wallet,
        })
    }

    async fn reject_enrollment(
        &self,
        booking_id: CourseBookingId,
        admin_id: UserId,
        note: String,
        now: DateTime<Utc>,
    ) -> Result<CourseBooking> {
        let mut inner = self.inner.lock().await;
        let mut booking = inner
            .course_bookings
            .get(&booking_id)
            .filter(|b| live(b.deleted_at))
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "enrollment",
                id: booking_id.to_string(),
            })?;
        booking.reject(Some(admin_id), note, now)?;
        inner.course_bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn insert_lesson(
        &self,
        lesson: &LessonBooking,
        log: &LessonChangeLogEntry,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.lessons.insert(lesson.id, lesson.clone());
        inner.lesson_logs.push(log.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonBooking>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lessons
            .get(&id)
            .filter(|l| live(l.deleted_at))
            .cloned())
    }

    async fn find_lesson_by_meeting_id(&self, meeting_id: &str) -> Result<Option<LessonBooking>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lessons
            .values()
            .find(|l| live(l.deleted_at) && l.meeting_id.as_deref() == Some(meeting_id))
            .cloned())
    }

    async fn update_lesson(
        &self,
        lesson: &LessonBooking,
        expected_revision: i64,
        log: Option<&LessonChangeLogEntry>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .lessons
            .get(&lesson.id)
            .filter(|l| live(l.deleted_at))
            .ok_or(StoreError::NotFound {
                entity: "lesson",
                id: lesson.id.to_string(),
            })?;
        if current.revision != expected_revision {
            return Err(StoreError::Conflict);
        }

        let mut stored = lesson.clone();
        stored.revision = expected_revision + 1;
        inner.lessons.insert(stored.id, stored);
        if let Some(log) = log {
            inner.lesson_logs.push(log.clone());
        }
        Ok(())
    }

    async fn list_lesson_history(&self, id: LessonId) -> Result<Vec<LessonChangeLogEntry>> {
        let inner = self.inner.lock().await;
        let mut logs: Vec<_> = inner
            .lesson_logs
            .iter()
            .filter(|l| l.lesson_id == id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    async fn webhook_event_seen(&self, key: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.webhook_events.contains(key))
    }

    async fn record_webhook_event(&self, key: &str, _now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.webhook_events.insert(key.to_string()))
    }

    async fn upsert_course(&self, course: &Course) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>> {
        let inner = self.inner.lock().await;
        Ok(inner.courses.get(&id).cloned())
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutordesk_core::{BookingStatus, NewWalletTransaction};

    fn course(cost: i64) -> Course {
        Course {
            id: CourseId::generate(),
            name: "Algebra".into(),
            credit_cost: cost,
        }
    }

    async fn pending_booking(store: &MemStore, course: &Course) -> CourseBooking {
        let booking = CourseBooking::new(course.id, UserId::generate(), Utc::now());
        store.upsert_course(course).await.unwrap();
        store.insert_course_booking(&booking).await.unwrap();
        booking
    }

    #[tokio::test]
    async fn get_or_create_wallet_is_stable() {
        let store = MemStore::new();
        let user = UserId::generate();
        let a = store.get_or_create_wallet(user, Utc::now()).await.unwrap();
        let b = store.get_or_create_wallet(user, Utc::now()).await.unwrap();
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(b.remaining_credits, 0);
    }

    #[tokio::test]
    async fn ledger_replay_reproduces_balance_snapshots() {
        let store = MemStore::new();
        let user = UserId::generate();
        let now = Utc::now();

        for new in [
            NewWalletTransaction::purchase(user, 10, "topup"),
            NewWalletTransaction::spend(user, 3, "enrollment_approval"),
            NewWalletTransaction::bonus(user, 2, "promo"),
            NewWalletTransaction::adjustment(user, -4, "correction"),
        ] {
            store.add_wallet_transaction(new, now).await.unwrap();
        }

        let txns = store.list_wallet_transactions(user, 100, 0).await.unwrap();
        assert_eq!(txns.len(), 4);

        let mut running = 0i64;
        for txn in &txns {
            running += txn.amount;
            assert_eq!(txn.balance_after, running);
        }
        let wallet = store.get_or_create_wallet(user, now).await.unwrap();
        assert_eq!(wallet.remaining_credits, running);
        assert!(wallet.is_balanced());
    }

    #[tokio::test]
    async fn insufficient_spend_writes_nothing() {
        let store = MemStore::new();
        let user = UserId::generate();
        let err = store
            .add_wallet_transaction(NewWalletTransaction::spend(user, 5, "x"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { .. }));
        assert!(store
            .list_wallet_transactions(user, 10, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn approval_spends_wallet_and_allocates_ledger() {
        let store = MemStore::new();
        let course = course(5);
        let booking = pending_booking(&store, &course).await;
        let student = booking.student_id;
        store
            .add_wallet_transaction(NewWalletTransaction::purchase(student, 10, "topup"), Utc::now())
            .await
            .unwrap();

        let outcome = store
            .approve_enrollment(booking.id, UserId::generate(), Utc::now())
            .await
            .unwrap();

        let ApprovalOutcome::Approved {
            booking,
            ledger,
            wallet,
        } = outcome
        else {
            panic!("expected approval");
        };
        assert_eq!(booking.status, BookingStatus::Approved);
        assert_eq!(wallet.remaining_credits, 5);
        assert_eq!(ledger.credits_allocated, 5);
        assert_eq!(ledger.credits_remaining, 5);
        assert!(ledger.is_balanced());
    }

    #[tokio::test]
    async fn approval_without_funds_auto_rejects() {
        let store = MemStore::new();
        let course = course(5);
        let booking = pending_booking(&store, &course).await;
        let student = booking.student_id;
        store
            .add_wallet_transaction(NewWalletTransaction::purchase(student, 3, "topup"), Utc::now())
            .await
            .unwrap();

        let outcome = store
            .approve_enrollment(booking.id, UserId::generate(), Utc::now())
            .await
            .unwrap();

        let ApprovalOutcome::AutoRejected {
            booking, balance, ..
        } = outcome
        else {
            panic!("expected auto-rejection");
        };
        assert_eq!(booking.status, BookingStatus::Rejected);
        assert!(booking.decision_by.is_none());
        assert!(booking.decision_note.is_some());
        assert_eq!(balance, 3);

        // No ledger allocated and no credits spent.
        assert!(store
            .get_course_ledger(student, course.id)
            .await
            .unwrap()
            .is_none());
        let wallet = store.get_or_create_wallet(student, Utc::now()).await.unwrap();
        assert_eq!(wallet.remaining_credits, 3);
    }

    #[tokio::test]
    async fn double_allocation_rejected() {
        let store = MemStore::new();
        let student = UserId::generate();
        let course_id = CourseId::generate();

        store
            .allocate_course_credits(student, course_id, None, 5, None, Utc::now())
            .await
            .unwrap();
        let err = store
            .allocate_course_credits(student, course_id, None, 5, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAllocation { .. }));

        let ledger = store
            .get_course_ledger(student, course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.credits_allocated, 5);
    }

    #[tokio::test]
    async fn consume_course_credits_updates_ledger_and_log() {
        let store = MemStore::new();
        let student = UserId::generate();
        let course_id = CourseId::generate();
        store
            .allocate_course_credits(student, course_id, None, 2, None, Utc::now())
            .await
            .unwrap();

        store
            .consume_course_credits(student, course_id, 1, None, Utc::now())
            .await
            .unwrap();
        let err = store
            .consume_course_credits(student, course_id, 2, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCourseCredits { .. }));

        let txns = store
            .list_course_ledger_transactions(student, course_id)
            .await
            .unwrap();
        assert_eq!(txns.len(), 2); // allocation + one consumption
        assert_eq!(txns[1].amount, -1);
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        use chrono::Duration;
        use tutordesk_core::{LessonAction, LessonRequest, ScheduleOption};

        let store = MemStore::new();
        let now = Utc::now();
        let lesson = LessonBooking::new_request(
            LessonRequest {
                course_booking_id: None,
                course_id: CourseId::generate(),
                student_id: UserId::generate(),
                date_from: now,
                date_to: now + Duration::days(7),
                options: [
                    now + Duration::days(1),
                    now + Duration::days(2),
                    now + Duration::days(3),
                ],
                duration_minutes: 60,
            },
            now,
        )
        .unwrap();
        let log = LessonChangeLogEntry::new(lesson.id, LessonAction::Requested, None, now);
        store.insert_lesson(&lesson, &log).await.unwrap();

        let mut first = store.get_lesson(lesson.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first
            .schedule(ScheduleOption::First, UserId::generate(), UserId::generate(), None, now)
            .unwrap();
        store.update_lesson(&first, 0, None).await.unwrap();

        second
            .cancel(UserId::generate(), None, now)
            .unwrap();
        let err = store.update_lesson(&second, 0, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let stored = store.get_lesson(lesson.id).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn webhook_event_dedup() {
        let store = MemStore::new();
        assert!(!store.webhook_event_seen("meeting.ended:42:100").await.unwrap());
        assert!(store
            .record_webhook_event("meeting.ended:42:100", Utc::now())
            .await
            .unwrap());
        assert!(store.webhook_event_seen("meeting.ended:42:100").await.unwrap());
        assert!(!store
            .record_webhook_event("meeting.ended:42:100", Utc::now())
            .await
            .unwrap());
    }
}
