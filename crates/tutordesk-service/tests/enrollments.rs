//! Enrollment and funds-gated approval integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

async fn request_enrollment(harness: &TestHarness, course_id: &str) -> serde_json::Value {
    let response = harness
        .server
        .post("/v1/enrollments")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "course_id": course_id }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json()
}

// ============================================================================
// Requesting
// ============================================================================

#[tokio::test]
async fn request_enrollment_is_pending() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;

    let booking = request_enrollment(&harness, &course_id.to_string()).await;
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["course_id"], json!(course_id.to_string()));

    let response = harness
        .server
        .get(&format!("/v1/enrollments/{}", booking["id"].as_str().unwrap()))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn request_enrollment_for_unknown_course_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/enrollments")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "course_id": uuid::Uuid::new_v4().to_string() }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn enrollment_not_visible_to_other_users() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    let booking = request_enrollment(&harness, &course_id.to_string()).await;

    let response = harness
        .server
        .get(&format!("/v1/enrollments/{}", booking["id"].as_str().unwrap()))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn list_own_enrollments() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    request_enrollment(&harness, &course_id.to_string()).await;

    let response = harness
        .server
        .get("/v1/enrollments")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["enrollments"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Approval
// ============================================================================

async fn approve(harness: &TestHarness, booking_id: &str) -> axum_test::TestResponse {
    harness
        .server
        .post(&format!("/v1/enrollments/{booking_id}/approve"))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .await
}

#[tokio::test]
async fn approval_spends_wallet_and_allocates_ledger() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    harness.fund_wallet(10).await;
    let booking = request_enrollment(&harness, &course_id.to_string()).await;

    let response = approve(&harness, booking["id"].as_str().unwrap()).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "approved");
    assert_eq!(body["booking"]["status"], "approved");
    assert_eq!(body["wallet"]["remaining_credits"], 5);
    assert_eq!(body["wallet"]["used_credits"], 5);
    assert_eq!(body["ledger"]["credits_allocated"], 5);
    assert_eq!(body["ledger"]["credits_remaining"], 5);

    // The spend shows up in the wallet history with its reference.
    let response = harness
        .server
        .get("/v1/wallet/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[1]["transaction_type"], "spend");
    assert_eq!(transactions[1]["amount"], -5);
    assert_eq!(transactions[1]["balance_after"], 5);

    // The course ledger is queryable with its allocation row.
    let response = harness
        .server
        .get(&format!("/v1/courses/{course_id}/ledger"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["ledger"]["credits_remaining"], 5);
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["entry_type"], "allocation");
}

#[tokio::test]
async fn approval_without_funds_auto_rejects() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    harness.fund_wallet(3).await;
    let booking = request_enrollment(&harness, &course_id.to_string()).await;

    let response = approve(&harness, booking["id"].as_str().unwrap()).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "auto_rejected");
    assert_eq!(body["booking"]["status"], "rejected");
    assert_eq!(body["balance"], 3);
    assert_eq!(body["required"], 5);
    // Automatic rejections carry no actor.
    assert!(body["booking"]["decision_by"].is_null());

    // Nothing was spent.
    let response = harness
        .server
        .get("/v1/wallet")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let wallet: serde_json::Value = response.json();
    assert_eq!(wallet["remaining_credits"], 3);

    // No ledger was allocated.
    let response = harness
        .server
        .get(&format!("/v1/courses/{course_id}/ledger"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn approval_is_not_repeatable() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    harness.fund_wallet(20).await;
    let booking = request_enrollment(&harness, &course_id.to_string()).await;
    let booking_id = booking["id"].as_str().unwrap();

    approve(&harness, booking_id).await.assert_status_ok();
    approve(&harness, booking_id)
        .await
        .assert_status(axum::http::StatusCode::CONFLICT);

    // Credits were spent exactly once.
    let response = harness
        .server
        .get("/v1/wallet")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let wallet: serde_json::Value = response.json();
    assert_eq!(wallet["remaining_credits"], 15);
}

#[tokio::test]
async fn double_allocation_for_same_course_conflicts() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    harness.fund_wallet(20).await;

    let first = request_enrollment(&harness, &course_id.to_string()).await;
    let second = request_enrollment(&harness, &course_id.to_string()).await;

    approve(&harness, first["id"].as_str().unwrap())
        .await
        .assert_status_ok();
    approve(&harness, second["id"].as_str().unwrap())
        .await
        .assert_status(axum::http::StatusCode::CONFLICT);

    // The conflicting approval spent nothing.
    let response = harness
        .server
        .get("/v1/wallet")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let wallet: serde_json::Value = response.json();
    assert_eq!(wallet["remaining_credits"], 15);
}

#[tokio::test]
async fn approve_requires_admin_key() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    let booking = request_enrollment(&harness, &course_id.to_string()).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/enrollments/{}/approve",
            booking["id"].as_str().unwrap()
        ))
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Rejection
// ============================================================================

#[tokio::test]
async fn reject_enrollment_records_note_and_actor() {
    let harness = TestHarness::new();
    let course_id = harness.seed_course("Algebra", 5).await;
    let booking = request_enrollment(&harness, &course_id.to_string()).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/enrollments/{}/reject",
            booking["id"].as_str().unwrap()
        ))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({ "note": "course is full" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["decision_note"], "course is full");
    assert_eq!(body["decision_by"], json!(harness.admin_id.to_string()));
}
