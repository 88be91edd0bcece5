//! Wallet balances and wallet transactions.
//!
//! A wallet is a user's overall credit account. Every balance change is
//! recorded as an append-only [`WalletTransaction`] carrying a `balance_after`
//! snapshot, so the full history can be replayed against the opening balance
//! and must reproduce every recorded snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ids::{TransactionId, UserId};

/// A user's credit balance account.
///
/// Invariant: `total_credits == used_credits + remaining_credits` at all
/// times. Mutated only through [`Wallet::apply`]; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// The owning user.
    pub user_id: UserId,

    /// Lifetime credits added to the wallet.
    pub total_credits: i64,

    /// Lifetime credits consumed.
    pub used_credits: i64,

    /// Credits currently available.
    pub remaining_credits: i64,

    /// When the wallet row was created.
    pub created_at: DateTime<Utc>,

    /// When the wallet was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a zeroed wallet for a user.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_credits: 0,
            used_credits: 0,
            remaining_credits: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the balance identity.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.total_credits == self.used_credits + self.remaining_credits
    }

    /// Check whether the wallet can fund a deduction of `amount` credits.
    #[must_use]
    pub const fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.remaining_credits >= amount
    }

    /// Apply a signed transaction amount to the wallet.
    ///
    /// Positive amounts raise `total_credits` and `remaining_credits`
    /// together; negative amounts raise `used_credits` while lowering
    /// `remaining_credits`, so the identity
    /// `total == used + remaining` holds for every transaction type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientCredits`] if a negative amount would
    /// drive `remaining_credits` below zero. `Adjustment` transactions are
    /// exempt from the floor: they are administrative corrections.
    pub fn apply(
        &mut self,
        amount: i64,
        transaction_type: WalletTransactionType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if amount < 0
            && transaction_type != WalletTransactionType::Adjustment
            && self.remaining_credits + amount < 0
        {
            return Err(CoreError::InsufficientCredits {
                balance: self.remaining_credits,
                required: -amount,
            });
        }

        if amount >= 0 {
            self.total_credits += amount;
        } else {
            self.used_credits += -amount;
        }
        self.remaining_credits += amount;
        self.updated_at = now;

        debug_assert!(self.is_balanced());
        Ok(())
    }
}

/// Type of wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    /// User purchased credits.
    Purchase,

    /// Promotional or goodwill credits.
    Bonus,

    /// Refund issued back to the wallet.
    Refund,

    /// Administrative correction; the only type allowed to be signed freely.
    Adjustment,

    /// Credits consumed, e.g. by an enrollment approval.
    Spend,
}

impl WalletTransactionType {
    /// Transaction types that add credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Purchase | Self::Bonus | Self::Refund)
    }

    /// Transaction types that consume credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Spend)
    }

    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Bonus => "bonus",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
            Self::Spend => "spend",
        }
    }
}

/// The kind of business record a ledger row refers back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    /// An enrollment request.
    CourseBooking,

    /// A lesson booking.
    Lesson,

    /// A catalog course.
    Course,
}

impl ReferenceType {
    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CourseBooking => "course_booking",
            Self::Lesson => "lesson",
            Self::Course => "course",
        }
    }
}

/// Link from a ledger row to the business event that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReference {
    /// What kind of record is referenced.
    pub kind: ReferenceType,
    /// The referenced record's id.
    pub id: Uuid,
}

/// Input for recording a wallet transaction.
///
/// The store assigns the id, timestamp, and `balance_after` snapshot when the
/// transaction is applied atomically with the wallet update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWalletTransaction {
    /// The wallet owner.
    pub user_id: UserId,

    /// Signed amount. Positive = credit, negative = debit.
    pub amount: i64,

    /// Transaction type.
    pub transaction_type: WalletTransactionType,

    /// Short machine-friendly reason, e.g. `enrollment_approval`.
    pub reason: String,

    /// Free-form operator notes.
    pub notes: Option<String>,

    /// The business event that caused this movement, if any.
    pub reference: Option<LedgerReference>,

    /// The acting user; `None` for system-generated rows.
    pub created_by: Option<UserId>,
}

impl NewWalletTransaction {
    /// A purchase of credits.
    #[must_use]
    pub fn purchase(user_id: UserId, amount: i64, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: amount.abs(),
            transaction_type: WalletTransactionType::Purchase,
            reason: reason.into(),
            notes: None,
            reference: None,
            created_by: None,
        }
    }

    /// A bonus grant.
    #[must_use]
    pub fn bonus(user_id: UserId, amount: i64, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: amount.abs(),
            transaction_type: WalletTransactionType::Bonus,
            reason: reason.into(),
            notes: None,
            reference: None,
            created_by: None,
        }
    }

    /// A refund back to the wallet.
    #[must_use]
    pub fn refund(user_id: UserId, amount: i64, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: amount.abs(),
            transaction_type: WalletTransactionType::Refund,
            reason: reason.into(),
            notes: None,
            reference: None,
            created_by: None,
        }
    }

    /// A signed administrative adjustment.
    #[must_use]
    pub fn adjustment(user_id: UserId, amount: i64, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            amount,
            transaction_type: WalletTransactionType::Adjustment,
            reason: reason.into(),
            notes: None,
            reference: None,
            created_by: None,
        }
    }

    /// A consumption. The amount is always stored negative.
    #[must_use]
    pub fn spend(user_id: UserId, amount: i64, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: -amount.abs(),
            transaction_type: WalletTransactionType::Spend,
            reason: reason.into(),
            notes: None,
            reference: None,
            created_by: None,
        }
    }

    /// Attach operator notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Attach a business-event reference.
    #[must_use]
    pub fn with_reference(mut self, kind: ReferenceType, id: Uuid) -> Self {
        self.reference = Some(LedgerReference { kind, id });
        self
    }

    /// Record the acting user.
    #[must_use]
    pub fn by(mut self, actor: UserId) -> Self {
        self.created_by = Some(actor);
        self
    }
}

/// An append-only wallet ledger row.
///
/// Immutable once written, except for soft delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Time-ordered transaction id.
    pub id: TransactionId,

    /// The wallet owner.
    pub user_id: UserId,

    /// Signed amount applied to the wallet.
    pub amount: i64,

    /// Transaction type.
    pub transaction_type: WalletTransactionType,

    /// Short machine-friendly reason.
    pub reason: String,

    /// Free-form operator notes.
    pub notes: Option<String>,

    /// The business event that caused this movement, if any.
    pub reference: Option<LedgerReference>,

    /// Snapshot of `remaining_credits` after this transaction was applied.
    pub balance_after: i64,

    /// The acting user; `None` for system-generated rows.
    pub created_by: Option<UserId>,

    /// When the row was written.
    pub created_at: DateTime<Utc>,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WalletTransaction {
    /// Materialize a ledger row from its input and the post-apply balance.
    #[must_use]
    pub fn record(new: NewWalletTransaction, balance_after: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id: new.user_id,
            amount: new.amount,
            transaction_type: new.transaction_type,
            reason: new.reason,
            notes: new.notes,
            reference: new.reference,
            balance_after,
            created_by: new.created_by,
            created_at: now,
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with(remaining: i64) -> Wallet {
        let mut w = Wallet::new(UserId::generate(), Utc::now());
        w.apply(remaining, WalletTransactionType::Purchase, Utc::now())
            .unwrap();
        w
    }

    #[test]
    fn new_wallet_is_zeroed_and_balanced() {
        let w = Wallet::new(UserId::generate(), Utc::now());
        assert_eq!(w.total_credits, 0);
        assert_eq!(w.remaining_credits, 0);
        assert!(w.is_balanced());
    }

    #[test]
    fn credit_raises_total_and_remaining() {
        let mut w = Wallet::new(UserId::generate(), Utc::now());
        w.apply(10, WalletTransactionType::Purchase, Utc::now())
            .unwrap();
        assert_eq!(w.total_credits, 10);
        assert_eq!(w.remaining_credits, 10);
        assert_eq!(w.used_credits, 0);
        assert!(w.is_balanced());
    }

    #[test]
    fn spend_raises_used_and_keeps_identity() {
        let mut w = wallet_with(10);
        w.apply(-4, WalletTransactionType::Spend, Utc::now())
            .unwrap();
        assert_eq!(w.total_credits, 10);
        assert_eq!(w.used_credits, 4);
        assert_eq!(w.remaining_credits, 6);
        assert!(w.is_balanced());
    }

    #[test]
    fn spend_below_zero_rejected() {
        let mut w = wallet_with(3);
        let err = w
            .apply(-5, WalletTransactionType::Spend, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientCredits {
                balance: 3,
                required: 5
            }
        ));
        // Nothing applied.
        assert_eq!(w.remaining_credits, 3);
        assert!(w.is_balanced());
    }

    #[test]
    fn negative_adjustment_may_go_below_zero() {
        let mut w = wallet_with(2);
        w.apply(-5, WalletTransactionType::Adjustment, Utc::now())
            .unwrap();
        assert_eq!(w.remaining_credits, -3);
        assert_eq!(w.used_credits, 5);
        assert!(w.is_balanced());
    }

    #[test]
    fn spend_constructor_forces_negative_amount() {
        let tx = NewWalletTransaction::spend(UserId::generate(), 5, "enrollment_approval");
        assert_eq!(tx.amount, -5);
        assert_eq!(tx.transaction_type, WalletTransactionType::Spend);
    }

    #[test]
    fn record_snapshots_balance() {
        let user = UserId::generate();
        let new = NewWalletTransaction::purchase(user, 10, "topup");
        let row = WalletTransaction::record(new, 10, Utc::now());
        assert_eq!(row.balance_after, 10);
        assert!(row.created_by.is_none());
        assert!(row.deleted_at.is_none());
    }
}
