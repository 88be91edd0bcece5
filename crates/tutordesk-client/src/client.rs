//! Tutordesk HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, CourseSync, LessonRequestInput, LessonResponse, SyncResponse, UserSync,
    WalletResponse,
};

/// Tutordesk API client.
///
/// Provides methods for pushing catalog data with a service API key and for
/// calling user-scoped endpoints with a platform JWT.
#[derive(Debug, Clone)]
pub struct TutordeskClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl TutordeskClient {
    /// Create a new tutordesk client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the tutordesk service (e.g., `"http://tutordesk:8080"`)
    /// * `api_key` - Service API key for authentication
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new tutordesk client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with default settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    /// Push a batch of courses to the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn sync_courses(
        &self,
        courses: Vec<CourseSync>,
    ) -> Result<SyncResponse, ClientError> {
        let url = format!("{}/v1/catalog/courses", self.base_url);

        let response = self
            .client
            .put(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&serde_json::json!({ "courses": courses }))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Push a batch of user profiles to the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn sync_users(&self, users: Vec<UserSync>) -> Result<SyncResponse, ClientError> {
        let url = format!("{}/v1/catalog/users", self.base_url);

        let response = self
            .client
            .put(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&serde_json::json!({ "users": users }))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a user's wallet (requires the user's JWT, not the service key).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_wallet(&self, user_jwt: &str) -> Result<WalletResponse, ClientError> {
        let url = format!("{}/v1/wallet", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("authorization", format!("Bearer {user_jwt}"))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Submit a lesson request on a student's behalf (requires the user's JWT).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn request_lesson(
        &self,
        user_jwt: &str,
        request: LessonRequestInput,
    ) -> Result<LessonResponse, ClientError> {
        let url = format!("{}/v1/lessons", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {user_jwt}"))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;

                // Map specific error codes to typed errors
                match code {
                    "insufficient_credits" => {
                        let balance = api_error
                            .error
                            .details
                            .as_ref()
                            .and_then(|d| d.get("balance"))
                            .and_then(serde_json::Value::as_i64)
                            .unwrap_or(0);
                        let required = api_error
                            .error
                            .details
                            .as_ref()
                            .and_then(|d| d.get("required"))
                            .and_then(serde_json::Value::as_i64)
                            .unwrap_or(0);

                        Err(ClientError::InsufficientCredits { balance, required })
                    }
                    "conflict" => Err(ClientError::Conflict { message }),
                    "not_found" => Err(ClientError::NotFound { message }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use tutordesk_core::{CourseId, UserId};

    #[test]
    fn client_creation() {
        let client = TutordeskClient::new("http://localhost:8080", "test-api-key");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = TutordeskClient::new("http://localhost:8080/", "test-api-key");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_options() {
        let options = ClientOptions::with_service_name("platform");
        let client = TutordeskClient::with_options("http://localhost:8080", "key", options);
        assert_eq!(client.service_name, "platform");
    }

    #[tokio::test]
    async fn sync_courses_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/catalog/courses"))
            .and(header("x-api-key", "service-key"))
            .and(header("x-service-name", "platform"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "synced": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TutordeskClient::with_options(
            server.uri(),
            "service-key",
            ClientOptions::with_service_name("platform"),
        );
        let response = client
            .sync_courses(vec![CourseSync {
                id: CourseId::generate(),
                name: "Algebra".into(),
                credit_cost: 5,
            }])
            .await
            .unwrap();

        assert_eq!(response.synced, 1);
    }

    #[tokio::test]
    async fn get_wallet_uses_bearer_token() {
        let server = MockServer::start().await;
        let user_id = UserId::generate();
        Mock::given(method("GET"))
            .and(path("/v1/wallet"))
            .and(header("authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": user_id,
                "total_credits": 50,
                "used_credits": 10,
                "remaining_credits": 40
            })))
            .mount(&server)
            .await;

        let client = TutordeskClient::new(server.uri(), "service-key");
        let wallet = client.get_wallet("user-jwt").await.unwrap();

        assert_eq!(wallet.user_id, user_id);
        assert_eq!(wallet.remaining_credits, 40);
    }

    #[tokio::test]
    async fn insufficient_credits_mapped_to_typed_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/wallet"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {
                    "code": "insufficient_credits",
                    "message": "insufficient credits: balance=3, required=5",
                    "details": { "balance": 3, "required": 5 }
                }
            })))
            .mount(&server)
            .await;

        let client = TutordeskClient::new(server.uri(), "service-key");
        let err = client.get_wallet("user-jwt").await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::InsufficientCredits {
                balance: 3,
                required: 5
            }
        ));
    }

    #[tokio::test]
    async fn lesson_request_round_trips() {
        let server = MockServer::start().await;
        let lesson_id = tutordesk_core::LessonId::generate();
        let course_id = CourseId::generate();
        let student_id = UserId::generate();
        Mock::given(method("POST"))
            .and(path("/v1/lessons"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": lesson_id,
                "course_id": course_id,
                "student_id": student_id,
                "tutor_id": null,
                "status": "pending",
                "scheduled_start": null,
                "scheduled_end": null,
                "meeting_join_url": null
            })))
            .mount(&server)
            .await;

        let now = Utc::now();
        let client = TutordeskClient::new(server.uri(), "service-key");
        let lesson = client
            .request_lesson(
                "user-jwt",
                LessonRequestInput {
                    course_id,
                    course_booking_id: None,
                    date_from: now,
                    date_to: now + ChronoDuration::days(7),
                    options: [
                        now + ChronoDuration::days(1),
                        now + ChronoDuration::days(2),
                        now + ChronoDuration::days(3),
                    ],
                    duration_minutes: 60,
                },
            )
            .await
            .unwrap();

        assert_eq!(lesson.id, lesson_id);
        assert_eq!(lesson.status, "pending");
        assert!(lesson.tutor_id.is_none());
    }

    #[tokio::test]
    async fn unparseable_error_body_falls_back_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/wallet"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = TutordeskClient::new(server.uri(), "service-key");
        let err = client.get_wallet("user-jwt").await.unwrap_err();

        assert!(matches!(err, ClientError::Api { status: 500, .. }));
    }
}
