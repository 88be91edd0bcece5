//! Meeting provider HTTP client.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use super::types::{CreateMeetingRequest, Meeting};

/// Timeout for meeting provider requests. Provisioning happens inline with
/// scheduling, so the bound must stay short.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the meeting provider API.
#[derive(Debug, thiserror::Error)]
pub enum ZoomError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("provider returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The client could not be constructed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Meeting provider API client.
#[derive(Debug, Clone)]
pub struct ZoomClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl ZoomClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`ZoomError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self, ZoomError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ZoomError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    /// Provision a meeting for a scheduled lesson.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider rejects it.
    pub async fn create_meeting(
        &self,
        request: &CreateMeetingRequest,
    ) -> Result<Meeting, ZoomError> {
        let url = format!("{}/users/me/meetings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ZoomError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Delete a provisioned meeting.
    ///
    /// A meeting already gone on the provider side is treated as success, so
    /// release paths stay idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider rejects it.
    pub async fn delete_meeting(&self, meeting_id: &str) -> Result<(), ZoomError> {
        let url = format!("{}/meetings/{meeting_id}", self.base_url);

        let response = self.client.delete(&url).bearer_auth(&self.api_token).send().await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ZoomError::Api {
            status: status.as_u16(),
            body,
        })
    }
}
