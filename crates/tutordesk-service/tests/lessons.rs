//! Lesson lifecycle integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestHarness;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Request a lesson whose three options sit at the given hour offsets from
/// now, with a window wide enough to hold them all.
async fn request_lesson(harness: &TestHarness, offsets_hours: [i64; 3]) -> serde_json::Value {
    let now = Utc::now();
    let course_id = harness.seed_course("Algebra", 5).await;
    let response = harness
        .server
        .post("/v1/lessons")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "course_id": course_id,
            "date_from": now,
            "date_to": now + Duration::days(14),
            "options": [
                now + Duration::hours(offsets_hours[0]),
                now + Duration::hours(offsets_hours[1]),
                now + Duration::hours(offsets_hours[2]),
            ],
            "duration_minutes": 60
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

async fn schedule(
    harness: &TestHarness,
    lesson_id: &str,
    option: u8,
) -> axum_test::TestResponse {
    harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/schedule"))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({ "option": option, "tutor_id": harness.tutor_id }))
        .await
}

/// Mount meeting provider mocks on a wiremock server.
async fn mount_meeting_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/me/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 987_654_321_u64,
            "join_url": "https://meet.example/j/987654321",
            "password": "s3cret"
        })))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/meetings/.+$"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

// ============================================================================
// Requesting
// ============================================================================

#[tokio::test]
async fn request_lesson_is_pending_with_audit_row() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    assert_eq!(lesson["status"], "pending");
    assert!(lesson["tutor_id"].is_null());
    assert!(lesson["scheduled_start"].is_null());

    let response = harness
        .server
        .get(&format!(
            "/v1/lessons/{}/history",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["action"], "requested");
}

#[tokio::test]
async fn option_outside_window_rejected() {
    let harness = TestHarness::new();
    let now = Utc::now();
    let course_id = harness.seed_course("Algebra", 5).await;

    let response = harness
        .server
        .post("/v1/lessons")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "course_id": course_id,
            "date_from": now,
            "date_to": now + Duration::days(2),
            "options": [
                now + Duration::hours(12),
                now + Duration::hours(24),
                now + Duration::days(5),
            ],
            "duration_minutes": 60
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn lesson_not_visible_to_strangers() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .get(&format!("/v1/lessons/{}", lesson["id"].as_str().unwrap()))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;

    response.assert_status_forbidden();
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test]
async fn schedule_commits_option_and_tutor() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = schedule(&harness, lesson["id"].as_str().unwrap(), 2).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["tutor_id"], json!(harness.tutor_id.to_string()));
    assert_eq!(body["scheduled_start"], lesson["option2"]);
    // No meeting provider configured: scheduled without a meeting.
    assert!(body["meeting_id"].is_null());
}

#[tokio::test]
async fn schedule_provisions_meeting_when_provider_configured() {
    let mock = MockServer::start().await;
    mount_meeting_provider(&mock).await;
    let harness = TestHarness::with_meeting_provider(&mock.uri());
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = schedule(&harness, lesson["id"].as_str().unwrap(), 1).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["meeting_id"], "987654321");
    assert_eq!(body["meeting_join_url"], "https://meet.example/j/987654321");

    // The provisioning is audited.
    let response = harness
        .server
        .get(&format!(
            "/v1/lessons/{}/history",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("authorization", harness.user_auth_header())
        .await;
    let history: serde_json::Value = response.json();
    let actions: Vec<&str> = history["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["requested", "scheduled", "meeting_provisioned"]);
}

#[tokio::test]
async fn schedule_survives_meeting_provider_failure() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/me/meetings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock)
        .await;
    let harness = TestHarness::with_meeting_provider(&mock.uri());
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = schedule(&harness, lesson["id"].as_str().unwrap(), 1).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "scheduled");
    assert!(body["meeting_id"].is_null());
}

#[tokio::test]
async fn schedule_rejects_invalid_option() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = schedule(&harness, lesson["id"].as_str().unwrap(), 4).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn schedule_rejects_non_tutor_assignee() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/schedule",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({ "option": 1, "tutor_id": harness.student_id }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn schedule_requires_admin_key() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/schedule",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "option": 1, "tutor_id": harness.tutor_id }))
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Rescheduling (24-hour cutoff)
// ============================================================================

#[tokio::test]
async fn reschedule_far_ahead_releases_schedule_and_meeting() {
    let mock = MockServer::start().await;
    mount_meeting_provider(&mock).await;
    let harness = TestHarness::with_meeting_provider(&mock.uri());
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [2, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();

    schedule(&harness, lesson_id, 2).await.assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/reschedule"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "note": "schedule conflict" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "released");
    assert_eq!(body["lesson"]["status"], "reschedule_requested");
    assert!(body["lesson"]["scheduled_start"].is_null());
    assert!(body["lesson"]["meeting_id"].is_null());
    assert_eq!(body["lesson"]["reschedule_count"], 1);
}

#[tokio::test]
async fn reschedule_inside_cutoff_is_held() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [2, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();

    schedule(&harness, lesson_id, 1).await.assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/reschedule"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "held_past_cutoff");
    assert_eq!(body["lesson"]["status"], "reschedule_requested");
    assert_eq!(body["lesson"]["scheduled_start"], lesson["option1"]);
}

#[tokio::test]
async fn rescheduling_again_lands_in_rescheduled() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [2, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();

    schedule(&harness, lesson_id, 2).await.assert_status_ok();
    harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/reschedule"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await
        .assert_status_ok();

    let response = schedule(&harness, lesson_id, 3).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "rescheduled");
    assert_eq!(body["scheduled_start"], lesson["option3"]);
}

#[tokio::test]
async fn reschedule_by_other_user_forbidden() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [2, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();

    schedule(&harness, lesson_id, 2).await.assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/reschedule"))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn reschedule_pending_lesson_conflicts() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/reschedule",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

// ============================================================================
// Cancel, reject, no-show
// ============================================================================

#[tokio::test]
async fn student_cancels_own_lesson() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/cancel",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "reason": "sick" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancel_reason"], "sick");
    assert_eq!(body["cancelled_by"], json!(harness.student_id.to_string()));
}

#[tokio::test]
async fn admin_cancels_scheduled_lesson() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();
    schedule(&harness, lesson_id, 1).await.assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/cancel"))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({ "reason": "tutor unavailable" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancelled_by"], json!(harness.admin_id.to_string()));
}

#[tokio::test]
async fn stranger_cannot_cancel() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/cancel",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn cancel_twice_conflicts() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();

    harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/cancel"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/cancel"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_rejects_pending_request() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/reject",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({ "note": "no tutor available" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["decision_note"], "no tutor available");
}

#[tokio::test]
async fn admin_marks_no_show() {
    let harness = TestHarness::new();
    harness.seed_users().await;
    let lesson = request_lesson(&harness, [24, 48, 72]).await;
    let lesson_id = lesson["id"].as_str().unwrap();
    schedule(&harness, lesson_id, 1).await.assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/lessons/{lesson_id}/no-show"))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({ "note": "nobody joined" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "no_show");
    assert_eq!(body["attendance_note"], "nobody joined");
}

#[tokio::test]
async fn no_show_on_pending_lesson_conflicts() {
    let harness = TestHarness::new();
    let lesson = request_lesson(&harness, [24, 48, 72]).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/lessons/{}/no-show",
            lesson["id"].as_str().unwrap()
        ))
        .add_header("x-admin-key", harness.admin_api_key.as_str())
        .add_header("x-admin-id", harness.admin_id.to_string())
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}
