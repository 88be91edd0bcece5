//! Catalog sync handlers.
//!
//! Courses and user profiles are owned by the main platform; it pushes them
//! here with a service key so enrollment and scheduling can run against local
//! reference data.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tutordesk_core::{Course, UserProfile};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Batch of courses to sync.
#[derive(Debug, Deserialize)]
pub struct SyncCoursesRequest {
    /// The courses to insert or update.
    pub courses: Vec<Course>,
}

/// Batch of user profiles to sync.
#[derive(Debug, Deserialize)]
pub struct SyncUsersRequest {
    /// The profiles to insert or update.
    pub users: Vec<UserProfile>,
}

/// Sync result.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// How many records were written.
    pub synced: usize,
}

/// Upsert a batch of catalog courses.
pub async fn sync_courses(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<SyncCoursesRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    for course in &body.courses {
        if course.credit_cost < 0 {
            return Err(ApiError::BadRequest(format!(
                "course {} has negative credit cost",
                course.id
            )));
        }
    }

    for course in &body.courses {
        state.store.upsert_course(course).await?;
    }

    tracing::info!(
        count = body.courses.len(),
        service = %service.service_name,
        "Courses synced"
    );
    Ok(Json(SyncResponse {
        synced: body.courses.len(),
    }))
}

/// Upsert a batch of user profiles.
pub async fn sync_users(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<SyncUsersRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    for user in &body.users {
        state.store.upsert_user(user).await?;
    }

    tracing::info!(
        count = body.users.len(),
        service = %service.service_name,
        "User profiles synced"
    );
    Ok(Json(SyncResponse {
        synced: body.users.len(),
    }))
}
