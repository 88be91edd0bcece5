//! Wallet balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tutordesk_core::{NewWalletTransaction, UserId, Wallet, WalletTransaction};

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for transaction history.
const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for transaction history.
const MAX_PAGE_SIZE: i64 = 200;

/// Get the caller's wallet, creating a zeroed one on first access.
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Wallet>, ApiError> {
    let wallet = state
        .store
        .get_or_create_wallet(auth.user_id, Utc::now())
        .await?;
    Ok(Json(wallet))
}

/// Pagination parameters for transaction history.
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    /// Page size (default 50, max 200).
    pub limit: Option<i64>,
    /// Offset into the history.
    pub offset: Option<i64>,
}

/// Transaction history response.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// The transactions, oldest first.
    pub transactions: Vec<WalletTransaction>,
}

/// List the caller's wallet transactions, oldest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let transactions = state
        .store
        .list_wallet_transactions(auth.user_id, limit, offset)
        .await?;
    Ok(Json(TransactionsResponse { transactions }))
}

/// Request to credit or adjust a wallet.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    /// The wallet owner.
    pub user_id: UserId,
    /// Signed amount. Must be positive except for adjustments.
    pub amount: i64,
    /// One of `purchase`, `bonus`, `refund`, `adjustment`.
    pub transaction_type: String,
    /// Short machine-friendly reason.
    pub reason: String,
    /// Free-form operator notes.
    pub notes: Option<String>,
}

/// Response after applying a wallet transaction.
#[derive(Debug, Serialize)]
pub struct AddCreditsResponse {
    /// The wallet after the transaction.
    pub wallet: Wallet,
    /// The recorded transaction.
    pub transaction: WalletTransaction,
}

/// Staff add credits to (or adjust) a user's wallet.
pub async fn add_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AddCreditsRequest>,
) -> Result<Json<AddCreditsResponse>, ApiError> {
    if body.amount == 0 {
        return Err(ApiError::BadRequest("amount must be non-zero".into()));
    }

    let new = match body.transaction_type.as_str() {
        "purchase" | "bonus" | "refund" if body.amount < 0 => {
            return Err(ApiError::BadRequest(format!(
                "{} amount must be positive",
                body.transaction_type
            )));
        }
        "purchase" => NewWalletTransaction::purchase(body.user_id, body.amount, body.reason),
        "bonus" => NewWalletTransaction::bonus(body.user_id, body.amount, body.reason),
        "refund" => NewWalletTransaction::refund(body.user_id, body.amount, body.reason),
        "adjustment" => NewWalletTransaction::adjustment(body.user_id, body.amount, body.reason),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown transaction type: {other}"
            )));
        }
    };
    let new = match body.notes {
        Some(notes) => new.with_notes(notes),
        None => new,
    }
    .by(admin.admin_id);

    let (wallet, transaction) = state.store.add_wallet_transaction(new, Utc::now()).await?;

    tracing::info!(
        user_id = %wallet.user_id,
        amount = transaction.amount,
        transaction_type = transaction.transaction_type.as_str(),
        balance = wallet.remaining_credits,
        admin_id = %admin.admin_id,
        "Wallet credited by staff"
    );

    Ok(Json(AddCreditsResponse {
        wallet,
        transaction,
    }))
}
