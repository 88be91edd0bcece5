//! Tutordesk Client SDK.
//!
//! This crate provides a client library for the main platform to interact
//! with the tutordesk API: pushing catalog reference data, reading wallet
//! balances on behalf of users, and submitting lesson requests.
//!
//! # Example
//!
//! ```no_run
//! use tutordesk_client::{CourseSync, TutordeskClient};
//!
//! # async fn example() -> Result<(), tutordesk_client::ClientError> {
//! let client = TutordeskClient::new(
//!     "http://tutordesk.backoffice.svc:8080",
//!     "your-service-api-key",
//! );
//!
//! // Push the course catalog
//! let response = client.sync_courses(vec![CourseSync {
//!     id: tutordesk_core::CourseId::generate(),
//!     name: "Algebra".to_string(),
//!     credit_cost: 5,
//! }]).await?;
//!
//! println!("Synced {} courses", response.synced);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, TutordeskClient};
pub use error::ClientError;
pub use types::*;
