//! Common test utilities for tutordesk integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::json;

use tutordesk_core::{CourseId, UserId};
use tutordesk_service::{create_router, AppState, ServiceConfig};
use tutordesk_store::MemStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test student ID for authenticated requests.
    pub student_id: UserId,
    /// A test tutor ID.
    pub tutor_id: UserId,
    /// A staff member ID for admin requests.
    pub admin_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key for staff requests.
    pub admin_api_key: String,
    /// The webhook secret shared with the meeting provider.
    pub webhook_secret: String,
}

impl TestHarness {
    /// Create a new test harness over a fresh in-memory store.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a harness with meeting provisioning pointed at a mock provider.
    pub fn with_meeting_provider(base_url: &str) -> Self {
        Self::build(Some(base_url.to_string()))
    }

    fn build(meeting_api_base_url: Option<String>) -> Self {
        let store = Arc::new(MemStore::new());

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();
        let webhook_secret = "test-webhook-secret".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_base_url: "http://localhost".into(),
            auth_audience: "tutordesk".into(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            meeting_api_token: meeting_api_base_url
                .as_ref()
                .map(|_| "test-meeting-token".to_string()),
            meeting_api_base_url,
            meeting_webhook_secret: Some(webhook_secret.clone()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(store, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            student_id: UserId::generate(),
            tutor_id: UserId::generate(),
            admin_id: UserId::generate(),
            service_api_key,
            admin_api_key,
            webhook_secret,
        }
    }

    /// Get the authorization header for the test student.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.student_id)
    }

    /// Get an auth header for an arbitrary user.
    pub fn auth_header_for(user_id: UserId) -> String {
        format!("Bearer test-token:{user_id}")
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        let other_user = UserId::generate();
        format!("Bearer test-token:{other_user}")
    }

    /// Sync the standard student/tutor profiles through the catalog endpoint.
    pub async fn seed_users(&self) {
        let response = self
            .server
            .put("/v1/catalog/users")
            .add_header("x-api-key", self.service_api_key.as_str())
            .add_header("x-service-name", "platform")
            .json(&json!({
                "users": [
                    {
                        "id": self.student_id,
                        "email": "student@example.com",
                        "display_name": "Student",
                        "role": "student",
                        "active": true,
                        "approved": true,
                        "timezone": "UTC"
                    },
                    {
                        "id": self.tutor_id,
                        "email": "tutor@example.com",
                        "display_name": "Tutor",
                        "role": "tutor",
                        "active": true,
                        "approved": true,
                        "timezone": "Europe/Vienna"
                    }
                ]
            }))
            .await;
        response.assert_status_ok();
    }

    /// Sync a course through the catalog endpoint and return its id.
    pub async fn seed_course(&self, name: &str, credit_cost: i64) -> CourseId {
        let course_id = CourseId::generate();
        let response = self
            .server
            .put("/v1/catalog/courses")
            .add_header("x-api-key", self.service_api_key.as_str())
            .add_header("x-service-name", "platform")
            .json(&json!({
                "courses": [
                    { "id": course_id, "name": name, "credit_cost": credit_cost }
                ]
            }))
            .await;
        response.assert_status_ok();
        course_id
    }

    /// Credit the test student's wallet through the staff endpoint.
    pub async fn fund_wallet(&self, amount: i64) {
        let response = self
            .server
            .post("/v1/wallet/credits")
            .add_header("x-admin-key", self.admin_api_key.as_str())
            .add_header("x-admin-id", self.admin_id.to_string())
            .json(&json!({
                "user_id": self.student_id,
                "amount": amount,
                "transaction_type": "purchase",
                "reason": "test funding"
            }))
            .await;
        response.assert_status_ok();
    }

    /// Post a signed webhook delivery and return the response.
    pub async fn post_webhook(&self, body: &serde_json::Value) -> axum_test::TestResponse {
        let raw = body.to_string();
        let timestamp = "1700000000";
        let signature =
            tutordesk_service::crypto::meeting_signature(&self.webhook_secret, timestamp, &raw);

        self.server
            .post("/webhooks/meetings")
            .add_header("x-mtg-request-timestamp", timestamp)
            .add_header("x-mtg-signature", signature)
            .add_header("content-type", "application/json")
            .text(raw)
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
