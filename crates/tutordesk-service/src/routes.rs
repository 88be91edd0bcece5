//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{catalog, enrollments, health, lessons, wallet, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Wallet (JWT auth)
/// - `GET /v1/wallet` - Get (or lazily create) the caller's wallet
/// - `GET /v1/wallet/transactions` - List transaction history
/// - `POST /v1/wallet/credits` - Staff add credits (admin key)
///
/// ## Enrollments (JWT auth; decisions with admin key)
/// - `POST /v1/enrollments` - Request enrollment in a course
/// - `GET /v1/enrollments` - List own enrollment requests
/// - `GET /v1/enrollments/{id}` - Get one enrollment request
/// - `POST /v1/enrollments/{id}/approve` - Funds-gated approval
/// - `POST /v1/enrollments/{id}/reject` - Manual rejection
/// - `GET /v1/courses/{course_id}/ledger` - Own course credit ledger
///
/// ## Lessons (JWT auth; staff actions with admin key)
/// - `POST /v1/lessons` - Request a lesson (three candidate start times)
/// - `GET /v1/lessons/{id}` - Get a lesson
/// - `GET /v1/lessons/{id}/history` - Change log
/// - `POST /v1/lessons/{id}/schedule` - Commit to an option and tutor
/// - `POST /v1/lessons/{id}/reject` - Reject a pending request
/// - `POST /v1/lessons/{id}/reschedule` - Student reschedule request
/// - `POST /v1/lessons/{id}/cancel` - Cancel (student or staff)
/// - `POST /v1/lessons/{id}/no-show` - Mark no-show
///
/// ## Catalog sync (service API key)
/// - `PUT /v1/catalog/courses` - Upsert courses
/// - `PUT /v1/catalog/users` - Upsert user profiles
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/meetings` - Meeting provider events
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Wallet
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/wallet/credits", post(wallet::add_credits))
        // Enrollments
        .route(
            "/enrollments",
            post(enrollments::create_enrollment).get(enrollments::list_enrollments),
        )
        .route("/enrollments/:id", get(enrollments::get_enrollment))
        .route(
            "/enrollments/:id/approve",
            post(enrollments::approve_enrollment),
        )
        .route(
            "/enrollments/:id/reject",
            post(enrollments::reject_enrollment),
        )
        .route(
            "/courses/:course_id/ledger",
            get(enrollments::get_course_ledger),
        )
        // Lessons
        .route("/lessons", post(lessons::create_lesson))
        .route("/lessons/:id", get(lessons::get_lesson))
        .route("/lessons/:id/history", get(lessons::get_lesson_history))
        .route("/lessons/:id/schedule", post(lessons::schedule_lesson))
        .route("/lessons/:id/reject", post(lessons::reject_lesson))
        .route("/lessons/:id/reschedule", post(lessons::request_reschedule))
        .route("/lessons/:id/cancel", post(lessons::cancel_lesson))
        .route("/lessons/:id/no-show", post(lessons::mark_no_show))
        // Catalog sync
        .route("/catalog/courses", put(catalog::sync_courses))
        .route("/catalog/users", put(catalog::sync_users))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - delivery volume is controlled upstream)
        .route("/webhooks/meetings", post(webhooks::meetings_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
