//! Tutordesk HTTP API Service.
//!
//! This crate provides the HTTP API for the tutordesk back office, including:
//!
//! - Wallet balance and transactions
//! - Funds-gated enrollment approval
//! - The lesson lifecycle (request, schedule, reschedule, cancel, no-show)
//! - Meeting provider webhooks (session and attendance facts)
//! - Catalog sync from the main platform
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **Platform JWT tokens** - For student and tutor requests
//! 2. **Service API keys** - For service-to-service requests (catalog sync)
//! 3. **Admin API keys** - For back-office staff actions

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Webhook handlers need async for consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod routes;
pub mod state;
pub mod zoom;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use notify::Notifier;
pub use routes::create_router;
pub use state::AppState;
pub use zoom::{CreateMeetingRequest, Meeting, ZoomClient, ZoomError};
