//! Wallet balance and transactions integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn get_wallet_creates_zeroed_wallet() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/wallet")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_credits"], 0);
    assert_eq!(body["used_credits"], 0);
    assert_eq!(body["remaining_credits"], 0);
}

#[tokio::test]
async fn get_wallet_without_auth_fails() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/wallet").await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Staff credits
// ============================================================================

#[tokio::test]
async fn add_credits_updates_balance_and_history() {
    let harness = TestHarness::new();
    harness.fund_wallet(50).await;

    let response = harness
        .server
        .get("/v1/wallet")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_credits"], 50);
    assert_eq!(body["remaining_credits"], 50);

    let response = harness
        .server
        .get("/v1/wallet/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["amount"], 50);
    assert_eq!(transactions[0]["balance_after"], 50);
    assert_eq!(transactions[0]["transaction_type"], "purchase");
    assert_eq!(
        transactions[0]["created_by"],
        json!(harness.admin_id.to_string())
    );
}

#[tokio::test]
async fn add_credits_without_admin_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/wallet/credits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "user_id": harness.student_id,
            "amount": 50,
            "transaction_type": "purchase",
            "reason": "sneaky"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn add_credits_with_wrong_admin_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/wallet/credits")
        .add_header("x-admin-key", "wrong-key")
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({
            "user_id": harness.student_id,
            "amount": 50,
            "transaction_type": "purchase",
            "reason": "sneaky"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn unknown_transaction_type_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/wallet/credits")
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({
            "user_id": harness.student_id,
            "amount": 50,
            "transaction_type": "jackpot",
            "reason": "nope"
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn negative_purchase_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/wallet/credits")
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({
            "user_id": harness.student_id,
            "amount": -10,
            "transaction_type": "purchase",
            "reason": "nope"
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn adjustment_may_drive_balance_negative() {
    let harness = TestHarness::new();
    harness.fund_wallet(10).await;

    let response = harness
        .server
        .post("/v1/wallet/credits")
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({
            "user_id": harness.student_id,
            "amount": -30,
            "transaction_type": "adjustment",
            "reason": "chargeback correction"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["wallet"]["remaining_credits"], -20);
    assert_eq!(body["transaction"]["balance_after"], -20);
}

#[tokio::test]
async fn transactions_are_paginated() {
    let harness = TestHarness::new();
    for _ in 0..3 {
        harness.fund_wallet(5).await;
    }

    let response = harness
        .server
        .get("/v1/wallet/transactions?limit=2&offset=1")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    // Oldest first: skipping the first leaves balances 10 and 15.
    assert_eq!(transactions[0]["balance_after"], 10);
    assert_eq!(transactions[1]["balance_after"], 15);
}

#[tokio::test]
async fn wallets_are_isolated_between_users() {
    let harness = TestHarness::new();
    harness.fund_wallet(50).await;

    let response = harness
        .server
        .get("/v1/wallet")
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["remaining_credits"], 0);
}
