//! PostgreSQL storage implementation.
//!
//! Runtime sqlx queries with manual row mapping; enums are stored in their
//! stable string form and transaction ids as ULID text (which sorts
//! chronologically). Compound operations run in one database transaction and
//! serialize concurrent writers with `SELECT ... FOR UPDATE`; lesson updates
//! are additionally guarded by the optimistic `revision` token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use tutordesk_core::{
    BookingStatus, Course, CourseBooking, CourseBookingId, CourseCreditLedger, CourseId,
    CourseLedgerEntryType, CourseLedgerTransaction, LedgerReference, LessonAction, LessonBooking,
    LessonChangeLogEntry, LessonId, LessonStatus, NewWalletTransaction, ReferenceType,
    TransactionId, UserId, UserProfile, UserRole, Wallet, WalletTransaction,
    WalletTransactionType,
};

use crate::error::{Result, StoreError};
use crate::{ApprovalOutcome, Store};

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

fn bad_enum(column: &'static str, value: &str) -> StoreError {
    StoreError::Serialization(format!("unknown {column} value: {value}"))
}

fn parse_transaction_id(s: &str) -> Result<TransactionId> {
    s.parse()
        .map_err(|_| StoreError::Serialization(format!("invalid transaction id: {s}")))
}

fn parse_wallet_txn_type(s: &str) -> Result<WalletTransactionType> {
    match s {
        "purchase" => Ok(WalletTransactionType::Purchase),
        "bonus" => Ok(WalletTransactionType::Bonus),
        "refund" => Ok(WalletTransactionType::Refund),
        "adjustment" => Ok(WalletTransactionType::Adjustment),
        "spend" => Ok(WalletTransactionType::Spend),
        other => Err(bad_enum("transaction_type", other)),
    }
}

fn parse_reference_type(s: &str) -> Result<ReferenceType> {
    match s {
        "course_booking" => Ok(ReferenceType::CourseBooking),
        "lesson" => Ok(ReferenceType::Lesson),
        "course" => Ok(ReferenceType::Course),
        other => Err(bad_enum("reference_type", other)),
    }
}

fn parse_ledger_entry_type(s: &str) -> Result<CourseLedgerEntryType> {
    match s {
        "allocation" => Ok(CourseLedgerEntryType::Allocation),
        "consumption" => Ok(CourseLedgerEntryType::Consumption),
        other => Err(bad_enum("entry_type", other)),
    }
}

fn parse_booking_status(s: &str) -> Result<BookingStatus> {
    match s {
        "pending" => Ok(BookingStatus::Pending),
        "approved" => Ok(BookingStatus::Approved),
        "rejected" => Ok(BookingStatus::Rejected),
        other => Err(bad_enum("status", other)),
    }
}

fn parse_lesson_status(s: &str) -> Result<LessonStatus> {
    match s {
        "pending" => Ok(LessonStatus::Pending),
        "scheduled" => Ok(LessonStatus::Scheduled),
        "reschedule_requested" => Ok(LessonStatus::RescheduleRequested),
        "rescheduled" => Ok(LessonStatus::Rescheduled),
        "completed" => Ok(LessonStatus::Completed),
        "cancelled" => Ok(LessonStatus::Cancelled),
        "rejected" => Ok(LessonStatus::Rejected),
        "no_show" => Ok(LessonStatus::NoShow),
        other => Err(bad_enum("status", other)),
    }
}

fn parse_lesson_action(s: &str) -> Result<LessonAction> {
    match s {
        "requested" => Ok(LessonAction::Requested),
        "scheduled" => Ok(LessonAction::Scheduled),
        "reschedule_requested" => Ok(LessonAction::RescheduleRequested),
        "cancelled" => Ok(LessonAction::Cancelled),
        "rejected" => Ok(LessonAction::Rejected),
        "no_show" => Ok(LessonAction::NoShow),
        "meeting_provisioned" => Ok(LessonAction::MeetingProvisioned),
        "meeting_cleared" => Ok(LessonAction::MeetingCleared),
        "session_started" => Ok(LessonAction::SessionStarted),
        "session_ended" => Ok(LessonAction::SessionEnded),
        "attendance_recorded" => Ok(LessonAction::AttendanceRecorded),
        other => Err(bad_enum("action", other)),
    }
}

fn parse_user_role(s: &str) -> Result<UserRole> {
    match s {
        "student" => Ok(UserRole::Student),
        "tutor" => Ok(UserRole::Tutor),
        "admin" => Ok(UserRole::Admin),
        other => Err(bad_enum("role", other)),
    }
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet> {
    Ok(Wallet {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        total_credits: row.try_get("total_credits")?,
        used_credits: row.try_get("used_credits")?,
        remaining_credits: row.try_get("remaining_credits")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn wallet_txn_from_row(row: &PgRow) -> Result<WalletTransaction> {
    let id: String = row.try_get("id")?;
    let txn_type: String = row.try_get("transaction_type")?;
    let reference_type: Option<String> = row.try_get("reference_type")?;
    let reference_id: Option<Uuid> = row.try_get("reference_id")?;
    let reference = match (reference_type, reference_id) {
        (Some(kind), Some(id)) => Some(LedgerReference {
            kind: parse_reference_type(&kind)?,
            id,
        }),
        _ => None,
    };
    Ok(WalletTransaction {
        id: parse_transaction_id(&id)?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        amount: row.try_get("amount")?,
        transaction_type: parse_wallet_txn_type(&txn_type)?,
        reason: row.try_get("reason")?,
        notes: row.try_get("notes")?,
        reference,
        balance_after: row.try_get("balance_after")?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")?
            .map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn course_ledger_from_row(row: &PgRow) -> Result<CourseCreditLedger> {
    Ok(CourseCreditLedger {
        student_id: UserId::from_uuid(row.try_get("student_id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        course_booking_id: row
            .try_get::<Option<Uuid>, _>("course_booking_id")?
            .map(CourseBookingId::from_uuid),
        credits_allocated: row.try_get("credits_allocated")?,
        credits_used: row.try_get("credits_used")?,
        credits_remaining: row.try_get("credits_remaining")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn course_ledger_txn_from_row(row: &PgRow) -> Result<CourseLedgerTransaction> {
    let id: String = row.try_get("id")?;
    let entry_type: String = row.try_get("entry_type")?;
    Ok(CourseLedgerTransaction {
        id: parse_transaction_id(&id)?,
        student_id: UserId::from_uuid(row.try_get("student_id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        amount: row.try_get("amount")?,
        entry_type: parse_ledger_entry_type(&entry_type)?,
        notes: row.try_get("notes")?,
        reference_id: row.try_get("reference_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn course_booking_from_row(row: &PgRow) -> Result<CourseBooking> {
    let status: String = row.try_get("status")?;
    Ok(CourseBooking {
        id: CourseBookingId::from_uuid(row.try_get("id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        student_id: UserId::from_uuid(row.try_get("student_id")?),
        status: parse_booking_status(&status)?,
        decision_at: row.try_get("decision_at")?,
        decision_by: row
            .try_get::<Option<Uuid>, _>("decision_by")?
            .map(UserId::from_uuid),
        decision_note: row.try_get("decision_note")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn lesson_from_row(row: &PgRow) -> Result<LessonBooking> {
    let status: String = row.try_get("status")?;
    Ok(LessonBooking {
        id: LessonId::from_uuid(row.try_get("id")?),
        course_booking_id: row
            .try_get::<Option<Uuid>, _>("course_booking_id")?
            .map(CourseBookingId::from_uuid),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        student_id: UserId::from_uuid(row.try_get("student_id")?),
        tutor_id: row
            .try_get::<Option<Uuid>, _>("tutor_id")?
            .map(UserId::from_uuid),
        date_from: row.try_get("date_from")?,
        date_to: row.try_get("date_to")?,
        option1: row.try_get("option1")?,
        option2: row.try_get("option2")?,
        option3: row.try_get("option3")?,
        duration_minutes: row.try_get("duration_minutes")?,
        scheduled_start: row.try_get("scheduled_start")?,
        scheduled_end: row.try_get("scheduled_end")?,
        meeting_id: row.try_get("meeting_id")?,
        meeting_join_url: row.try_get("meeting_join_url")?,
        meeting_password: row.try_get("meeting_password")?,
        session_started_at: row.try_get("session_started_at")?,
        session_ended_at: row.try_get("session_ended_at")?,
        student_joined_at: row.try_get("student_joined_at")?,
        tutor_joined_at: row.try_get("tutor_joined_at")?,
        student_attended: row.try_get("student_attended")?,
        tutor_attended: row.try_get("tutor_attended")?,
        attendance_note: row.try_get("attendance_note")?,
        reschedule_requested: row.try_get("reschedule_requested")?,
        reschedule_requested_at: row.try_get("reschedule_requested_at")?,
        reschedule_note: row.try_get("reschedule_note")?,
        reschedule_count: row.try_get("reschedule_count")?,
        cancellation_requested: row.try_get("cancellation_requested")?,
        cancellation_requested_at: row.try_get("cancellation_requested_at")?,
        cancellation_requested_by: row
            .try_get::<Option<Uuid>, _>("cancellation_requested_by")?
            .map(UserId::from_uuid),
        cancelled_at: row.try_get("cancelled_at")?,
        cancelled_by: row
            .try_get::<Option<Uuid>, _>("cancelled_by")?
            .map(UserId::from_uuid),
        cancel_reason: row.try_get("cancel_reason")?,
        decision_at: row.try_get("decision_at")?,
        decision_by: row
            .try_get::<Option<Uuid>, _>("decision_by")?
            .map(UserId::from_uuid),
        decision_note: row.try_get("decision_note")?,
        status: parse_lesson_status(&status)?,
        revision: row.try_get("revision")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn change_log_from_row(row: &PgRow) -> Result<LessonChangeLogEntry> {
    let action: String = row.try_get("action")?;
    Ok(LessonChangeLogEntry {
        id: row.try_get("id")?,
        lesson_id: LessonId::from_uuid(row.try_get("lesson_id")?),
        action: parse_lesson_action(&action)?,
        note: row.try_get("note")?,
        old_start: row.try_get("old_start")?,
        old_end: row.try_get("old_end")?,
        new_start: row.try_get("new_start")?,
        new_end: row.try_get("new_end")?,
        actor: row
            .try_get::<Option<Uuid>, _>("actor")?
            .map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn course_from_row(row: &PgRow) -> Result<Course> {
    Ok(Course {
        id: CourseId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        credit_cost: row.try_get("credit_cost")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<UserProfile> {
    let role: String = row.try_get("role")?;
    Ok(UserProfile {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        role: parse_user_role(&role)?,
        active: row.try_get("active")?,
        approved: row.try_get("approved")?,
        timezone: row.try_get("timezone")?,
    })
}

/// Insert a zeroed wallet row unless one exists, then lock and return it.
async fn lock_wallet(
    tx: &mut sqlx::PgConnection,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<Wallet> {
    sqlx::query(
        "INSERT INTO wallets (user_id, total_credits, used_credits, remaining_credits, created_at, updated_at)
         VALUES ($1, 0, 0, 0, $2, $2)
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(*user_id.as_uuid())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(*user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
    wallet_from_row(&row)
}

async fn save_wallet(tx: &mut sqlx::PgConnection, wallet: &Wallet) -> Result<()> {
    sqlx::query(
        "UPDATE wallets
         SET total_credits = $2, used_credits = $3, remaining_credits = $4, updated_at = $5
         WHERE user_id = $1",
    )
    .bind(*wallet.user_id.as_uuid())
    .bind(wallet.total_credits)
    .bind(wallet.used_credits)
    .bind(wallet.remaining_credits)
    .bind(wallet.updated_at)
    .execute(tx)
    .await?;
    Ok(())
}

async fn insert_wallet_txn(
    tx: &mut sqlx::PgConnection,
    txn: &WalletTransaction,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallet_transactions
         (id, user_id, amount, transaction_type, reason, notes, reference_type, reference_id,
          balance_after, created_by, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(txn.id.to_string())
    .bind(*txn.user_id.as_uuid())
    .bind(txn.amount)
    .bind(txn.transaction_type.as_str())
    .bind(&txn.reason)
    .bind(&txn.notes)
    .bind(txn.reference.map(|r| r.kind.as_str()))
    .bind(txn.reference.map(|r| r.id))
    .bind(txn.balance_after)
    .bind(txn.created_by.map(|u| *u.as_uuid()))
    .bind(txn.created_at)
    .execute(tx)
    .await?;
    Ok(())
}

/// Lock the ledger row for a pair, if one exists (live or soft-deleted).
async fn lock_course_ledger(
    tx: &mut sqlx::PgConnection,
    student_id: UserId,
    course_id: CourseId,
) -> Result<Option<CourseCreditLedger>> {
    let row = sqlx::query(
        "SELECT * FROM course_ledgers WHERE student_id = $1 AND course_id = $2 FOR UPDATE",
    )
    .bind(*student_id.as_uuid())
    .bind(*course_id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?;
    row.as_ref().map(course_ledger_from_row).transpose()
}

/// Write a ledger, replacing any previous (soft-deleted) row for the pair.
async fn save_course_ledger(
    tx: &mut sqlx::PgConnection,
    ledger: &CourseCreditLedger,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO course_ledgers
         (student_id, course_id, course_booking_id, credits_allocated, credits_used,
          credits_remaining, created_at, updated_at, deleted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (student_id, course_id) DO UPDATE SET
           course_booking_id = EXCLUDED.course_booking_id,
           credits_allocated = EXCLUDED.credits_allocated,
           credits_used = EXCLUDED.credits_used,
           credits_remaining = EXCLUDED.credits_remaining,
           updated_at = EXCLUDED.updated_at,
           deleted_at = EXCLUDED.deleted_at",
    )
    .bind(*ledger.student_id.as_uuid())
    .bind(*ledger.course_id.as_uuid())
    .bind(ledger.course_booking_id.map(|id| *id.as_uuid()))
    .bind(ledger.credits_allocated)
    .bind(ledger.credits_used)
    .bind(ledger.credits_remaining)
    .bind(ledger.created_at)
    .bind(ledger.updated_at)
    .bind(ledger.deleted_at)
    .execute(tx)
    .await?;
    Ok(())
}

async fn insert_course_ledger_txn(
    tx: &mut sqlx::PgConnection,
    txn: &CourseLedgerTransaction,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO course_ledger_transactions
         (id, student_id, course_id, amount, entry_type, notes, reference_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(txn.id.to_string())
    .bind(*txn.student_id.as_uuid())
    .bind(*txn.course_id.as_uuid())
    .bind(txn.amount)
    .bind(txn.entry_type.as_str())
    .bind(&txn.notes)
    .bind(txn.reference_id)
    .bind(txn.created_at)
    .execute(tx)
    .await?;
    Ok(())
}

async fn save_course_booking(
    tx: &mut sqlx::PgConnection,
    booking: &CourseBooking,
) -> Result<()> {
    sqlx::query(
        "UPDATE course_bookings
         SET status = $2, decision_at = $3, decision_by = $4, decision_note = $5, deleted_at = $6
         WHERE id = $1",
    )
    .bind(*booking.id.as_uuid())
    .bind(booking.status.as_str())
    .bind(booking.decision_at)
    .bind(booking.decision_by.map(|u| *u.as_uuid()))
    .bind(&booking.decision_note)
    .bind(booking.deleted_at)
    .execute(tx)
    .await?;
    Ok(())
}

async fn insert_change_log(
    tx: &mut sqlx::PgConnection,
    log: &LessonChangeLogEntry,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO lesson_change_log
         (id, lesson_id, action, note, old_start, old_end, new_start, new_end, actor, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(log.id)
    .bind(*log.lesson_id.as_uuid())
    .bind(log.action.as_str())
    .bind(&log.note)
    .bind(log.old_start)
    .bind(log.old_end)
    .bind(log.new_start)
    .bind(log.new_end)
    .bind(log.actor.map(|u| *u.as_uuid()))
    .bind(log.created_at)
    .execute(tx)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn get_or_create_wallet(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Wallet> {
        sqlx::query(
            "INSERT INTO wallets (user_id, total_credits, used_credits, remaining_credits, created_at, updated_at)
             VALUES ($1, 0, 0, 0, $2, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(*user_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM wallets WHERE user_id = $1")
            .bind(*user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        wallet_from_row(&row)
    }

    async fn add_wallet_transaction(
        &self,
        new: NewWalletTransaction,
        now: DateTime<Utc>,
    ) -> Result<(Wallet, WalletTransaction)> {
        let mut tx = self.pool.begin().await?;

        let mut wallet = lock_wallet(&mut tx, new.user_id, now).await?;
        wallet.apply(new.amount, new.transaction_type, now)?;
        let txn = WalletTransaction::record(new, wallet.remaining_credits, now);

        save_wallet(&mut tx, &wallet).await?;
        insert_wallet_txn(&mut tx, &txn).await?;
        tx.commit().await?;
        Ok((wallet, txn))
    }

    async fn list_wallet_transactions(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM wallet_transactions
             WHERE user_id = $1 AND deleted_at IS NULL
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3",
        )
        .bind(*user_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(wallet_txn_from_row).collect()
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
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = lock_course_ledger(&mut tx, student_id, course_id).await? {
            if existing.deleted_at.is_none() {
                return Err(StoreError::DuplicateAllocation {
                    student_id: student_id.to_string(),
                    course_id: course_id.to_string(),
                });
            }
        }

        let ledger = CourseCreditLedger::new_allocation(
            student_id,
            course_id,
            course_booking_id,
            credits,
            now,
        );
        save_course_ledger(&mut tx, &ledger).await?;
        insert_course_ledger_txn(
            &mut tx,
            &CourseLedgerTransaction::allocation(student_id, course_id, credits, reference_id, now),
        )
        .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let mut ledger = lock_course_ledger(&mut tx, student_id, course_id)
            .await?
            .filter(|l| l.deleted_at.is_none())
            .ok_or(StoreError::NotFound {
                entity: "course ledger",
                id: format!("{student_id}/{course_id}"),
            })?;
        ledger.consume(amount, now)?;

        save_course_ledger(&mut tx, &ledger).await?;
        insert_course_ledger_txn(
            &mut tx,
            &CourseLedgerTransaction::consumption(
                student_id,
                course_id,
                amount,
                reference_id,
                now,
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(ledger)
    }

    async fn get_course_ledger(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseCreditLedger>> {
        let row = sqlx::query(
            "SELECT * FROM course_ledgers
             WHERE student_id = $1 AND course_id = $2 AND deleted_at IS NULL",
        )
        .bind(*student_id.as_uuid())
        .bind(*course_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(course_ledger_from_row).transpose()
    }

    async fn list_course_ledger_transactions(
        &self,
        student_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<CourseLedgerTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM course_ledger_transactions
             WHERE student_id = $1 AND course_id = $2
             ORDER BY created_at, id",
        )
        .bind(*student_id.as_uuid())
        .bind(*course_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(course_ledger_txn_from_row).collect()
    }

    async fn insert_course_booking(&self, booking: &CourseBooking) -> Result<()> {
        sqlx::query(
            "INSERT INTO course_bookings
             (id, course_id, student_id, status, decision_at, decision_by, decision_note,
              created_at, deleted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*booking.id.as_uuid())
        .bind(*booking.course_id.as_uuid())
        .bind(*booking.student_id.as_uuid())
        .bind(booking.status.as_str())
        .bind(booking.decision_at)
        .bind(booking.decision_by.map(|u| *u.as_uuid()))
        .bind(&booking.decision_note)
        .bind(booking.created_at)
        .bind(booking.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_course_booking(&self, id: CourseBookingId) -> Result<Option<CourseBooking>> {
        let row =
            sqlx::query("SELECT * FROM course_bookings WHERE id = $1 AND deleted_at IS NULL")
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(course_booking_from_row).transpose()
    }

    async fn list_course_bookings_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<CourseBooking>> {
        let rows = sqlx::query(
            "SELECT * FROM course_bookings
             WHERE student_id = $1 AND deleted_at IS NULL
             ORDER BY created_at, id",
        )
        .bind(*student_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(course_booking_from_row).collect()
    }

    async fn approve_enrollment(
        &self,
        booking_id: CourseBookingId,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM course_bookings WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(*booking_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "enrollment",
            id: booking_id.to_string(),
        })?;
        let mut booking = course_booking_from_row(&row)?;
        if booking.status != BookingStatus::Pending {
            return Err(StoreError::AlreadyDecided);
        }

        let row = sqlx::query("SELECT * FROM courses WHERE id = $1")
            .bind(*booking.course_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "course",
                id: booking.course_id.to_string(),
            })?;
        let course = course_from_row(&row)?;

        let mut wallet = lock_wallet(&mut tx, booking.student_id, now).await?;

        if !wallet.has_sufficient_credits(course.credit_cost) {
            tracing::info!(
                booking_id = %booking.id,
                balance = wallet.remaining_credits,
                required = course.credit_cost,
                "auto-rejecting enrollment, wallet cannot cover course cost"
            );
            let note = format!(
                "auto-rejected: insufficient credits (balance {}, course cost {})",
                wallet.remaining_credits, course.credit_cost
            );
            booking.reject(None, note, now)?;
            save_course_booking(&mut tx, &booking).await?;
            tx.commit().await?;
            return Ok(ApprovalOutcome::AutoRejected {
                booking,
                balance: wallet.remaining_credits,
                required: course.credit_cost,
            });
        }

        // Duplicate check before spending so a conflict never leaves credits
        // silently spent.
        if let Some(existing) =
            lock_course_ledger(&mut tx, booking.student_id, booking.course_id).await?
        {
            if existing.deleted_at.is_none() {
                return Err(StoreError::DuplicateAllocation {
                    student_id: booking.student_id.to_string(),
                    course_id: booking.course_id.to_string(),
                });
            }
        }

        let spend = NewWalletTransaction::spend(
            booking.student_id,
            course.credit_cost,
            "enrollment_approval",
        )
        .with_reference(ReferenceType::CourseBooking, *booking.id.as_uuid())
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
        booking.approve(admin_id, now)?;

        save_wallet(&mut tx, &wallet).await?;
        insert_wallet_txn(&mut tx, &wallet_txn).await?;
        save_course_ledger(&mut tx, &ledger).await?;
        insert_course_ledger_txn(
            &mut tx,
            &CourseLedgerTransaction::allocation(
                booking.student_id,
                booking.course_id,
                course.credit_cost,
                Some(*booking.id.as_uuid()),
                now,
            ),
        )
        .await?;
        save_course_booking(&mut tx, &booking).await?;
        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM course_bookings WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(*booking_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "enrollment",
            id: booking_id.to_string(),
        })?;
        let mut booking = course_booking_from_row(&row)?;
        booking.reject(Some(admin_id), note, now)?;

        save_course_booking(&mut tx, &booking).await?;
        tx.commit().await?;
        Ok(booking)
    }

    async fn insert_lesson(
        &self,
        lesson: &LessonBooking,
        log: &LessonChangeLogEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO lessons
             (id, course_booking_id, course_id, student_id, tutor_id, date_from, date_to,
              option1, option2, option3, duration_minutes, scheduled_start, scheduled_end,
              meeting_id, meeting_join_url, meeting_password, session_started_at,
              session_ended_at, student_joined_at, tutor_joined_at, student_attended,
              tutor_attended, attendance_note, reschedule_requested, reschedule_requested_at,
              reschedule_note, reschedule_count, cancellation_requested,
              cancellation_requested_at, cancellation_requested_by, cancelled_at, cancelled_by,
              cancel_reason, decision_at, decision_by, decision_note, status, revision,
              created_at, updated_at, deleted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                     $31, $32, $33, $34, $35, $36, $37, $38, $39, $40, $41)",
        )
        .bind(*lesson.id.as_uuid())
        .bind(lesson.course_booking_id.map(|id| *id.as_uuid()))
        .bind(*lesson.course_id.as_uuid())
        .bind(*lesson.student_id.as_uuid())
        .bind(lesson.tutor_id.map(|u| *u.as_uuid()))
        .bind(lesson.date_from)
        .bind(lesson.date_to)
        .bind(lesson.option1)
        .bind(lesson.option2)
        .bind(lesson.option3)
        .bind(lesson.duration_minutes)
        .bind(lesson.scheduled_start)
        .bind(lesson.scheduled_end)
        .bind(&lesson.meeting_id)
        .bind(&lesson.meeting_join_url)
        .bind(&lesson.meeting_password)
        .bind(lesson.session_started_at)
        .bind(lesson.session_ended_at)
        .bind(lesson.student_joined_at)
        .bind(lesson.tutor_joined_at)
        .bind(lesson.student_attended)
        .bind(lesson.tutor_attended)
        .bind(&lesson.attendance_note)
        .bind(lesson.reschedule_requested)
        .bind(lesson.reschedule_requested_at)
        .bind(&lesson.reschedule_note)
        .bind(lesson.reschedule_count)
        .bind(lesson.cancellation_requested)
        .bind(lesson.cancellation_requested_at)
        .bind(lesson.cancellation_requested_by.map(|u| *u.as_uuid()))
        .bind(lesson.cancelled_at)
        .bind(lesson.cancelled_by.map(|u| *u.as_uuid()))
        .bind(&lesson.cancel_reason)
        .bind(lesson.decision_at)
        .bind(lesson.decision_by.map(|u| *u.as_uuid()))
        .bind(&lesson.decision_note)
        .bind(lesson.status.as_str())
        .bind(lesson.revision)
        .bind(lesson.created_at)
        .bind(lesson.updated_at)
        .bind(lesson.deleted_at)
        .execute(&mut *tx)
        .await?;

        insert_change_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonBooking>> {
        let row = sqlx::query("SELECT * FROM lessons WHERE id = $1 AND deleted_at IS NULL")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lesson_from_row).transpose()
    }

    async fn find_lesson_by_meeting_id(&self, meeting_id: &str) -> Result<Option<LessonBooking>> {
        let row =
            sqlx::query("SELECT * FROM lessons WHERE meeting_id = $1 AND deleted_at IS NULL")
                .bind(meeting_id)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(lesson_from_row).transpose()
    }

    async fn update_lesson(
        &self,
        lesson: &LessonBooking,
        expected_revision: i64,
        log: Option<&LessonChangeLogEntry>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE lessons SET
               tutor_id = $3, scheduled_start = $4, scheduled_end = $5, meeting_id = $6,
               meeting_join_url = $7, meeting_password = $8, session_started_at = $9,
               session_ended_at = $10, student_joined_at = $11, tutor_joined_at = $12,
               student_attended = $13, tutor_attended = $14, attendance_note = $15,
               reschedule_requested = $16, reschedule_requested_at = $17,
               reschedule_note = $18, reschedule_count = $19, cancellation_requested = $20,
               cancellation_requested_at = $21, cancellation_requested_by = $22,
               cancelled_at = $23, cancelled_by = $24, cancel_reason = $25, decision_at = $26,
               decision_by = $27, decision_note = $28, status = $29, updated_at = $30,
               deleted_at = $31, revision = $2 + 1
             WHERE id = $1 AND revision = $2 AND deleted_at IS NULL",
        )
        .bind(*lesson.id.as_uuid())
        .bind(expected_revision)
        .bind(lesson.tutor_id.map(|u| *u.as_uuid()))
        .bind(lesson.scheduled_start)
        .bind(lesson.scheduled_end)
        .bind(&lesson.meeting_id)
        .bind(&lesson.meeting_join_url)
        .bind(&lesson.meeting_password)
        .bind(lesson.session_started_at)
        .bind(lesson.session_ended_at)
        .bind(lesson.student_joined_at)
        .bind(lesson.tutor_joined_at)
        .bind(lesson.student_attended)
        .bind(lesson.tutor_attended)
        .bind(&lesson.attendance_note)
        .bind(lesson.reschedule_requested)
        .bind(lesson.reschedule_requested_at)
        .bind(&lesson.reschedule_note)
        .bind(lesson.reschedule_count)
        .bind(lesson.cancellation_requested)
        .bind(lesson.cancellation_requested_at)
        .bind(lesson.cancellation_requested_by.map(|u| *u.as_uuid()))
        .bind(lesson.cancelled_at)
        .bind(lesson.cancelled_by.map(|u| *u.as_uuid()))
        .bind(&lesson.cancel_reason)
        .bind(lesson.decision_at)
        .bind(lesson.decision_by.map(|u| *u.as_uuid()))
        .bind(&lesson.decision_note)
        .bind(lesson.status.as_str())
        .bind(lesson.updated_at)
        .bind(lesson.deleted_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query(
                "SELECT 1 AS one FROM lessons WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(*lesson.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
            if exists {
                tracing::debug!(
                    lesson_id = %lesson.id,
                    expected_revision,
                    "lesson revision mismatch"
                );
                return Err(StoreError::Conflict);
            }
            return Err(StoreError::NotFound {
                entity: "lesson",
                id: lesson.id.to_string(),
            });
        }

        if let Some(log) = log {
            insert_change_log(&mut tx, log).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_lesson_history(&self, id: LessonId) -> Result<Vec<LessonChangeLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM lesson_change_log WHERE lesson_id = $1 ORDER BY created_at, id",
        )
        .bind(*id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(change_log_from_row).collect()
    }

    async fn webhook_event_seen(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM webhook_events WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn record_webhook_event(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO webhook_events (key, received_at) VALUES ($1, $2)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_course(&self, course: &Course) -> Result<()> {
        sqlx::query(
            "INSERT INTO courses (id, name, credit_cost) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name,
               credit_cost = EXCLUDED.credit_cost",
        )
        .bind(*course.id.as_uuid())
        .bind(&course.name)
        .bind(course.credit_cost)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT * FROM courses WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(course_from_row).transpose()
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, display_name, role, active, approved, timezone)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
               email = EXCLUDED.email,
               display_name = EXCLUDED.display_name,
               role = EXCLUDED.role,
               active = EXCLUDED.active,
               approved = EXCLUDED.approved,
               timezone = EXCLUDED.timezone",
        )
        .bind(*user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(user.approved)
        .bind(user.timezone.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}
