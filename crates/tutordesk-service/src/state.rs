//! Application state.

use std::sync::Arc;

use tutordesk_store::Store;

use crate::config::ServiceConfig;
use crate::notify::Notifier;
use crate::zoom::ZoomClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Meeting provider client (optional).
    pub zoom: Option<Arc<ZoomClient>>,

    /// Lifecycle event notifier.
    pub notifier: Notifier,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let zoom = config
            .meeting_api_base_url
            .as_ref()
            .zip(config.meeting_api_token.as_ref())
            .and_then(|(url, token)| match ZoomClient::new(url, token) {
                Ok(client) => {
                    tracing::info!(meeting_api = %url, "Meeting provider integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create meeting provider client");
                    None
                }
            });

        if zoom.is_none() {
            tracing::warn!(
                "Meeting provider not configured - lessons will be scheduled without meeting links"
            );
        }

        let notifier = Notifier::new(config.notify_url.clone());

        Self {
            store,
            config,
            zoom,
            notifier,
        }
    }

    /// Check if meeting provisioning is available.
    #[must_use]
    pub fn has_meeting_provider(&self) -> bool {
        self.zoom.is_some()
    }
}
