//! HTTP request handlers.

pub mod catalog;
pub mod enrollments;
pub mod health;
pub mod lessons;
pub mod wallet;
pub mod webhooks;
