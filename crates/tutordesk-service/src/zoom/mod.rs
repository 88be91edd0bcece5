//! Meeting provider integration.
//!
//! Provisions and deletes online meeting rooms for scheduled lessons. The
//! integration is optional: without credentials the service still schedules
//! lessons, just without meeting links.

mod client;
mod types;

pub use client::{ZoomClient, ZoomError};
pub use types::{CreateMeetingRequest, Meeting};
