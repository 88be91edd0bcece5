//! Enrollment request and approval handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tutordesk_core::{
    CourseBooking, CourseBookingId, CourseCreditLedger, CourseId, CourseLedgerTransaction, Wallet,
};
use tutordesk_store::ApprovalOutcome;

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Request to enroll in a course.
#[derive(Debug, Deserialize)]
pub struct CreateEnrollmentRequest {
    /// The course to enroll in.
    pub course_id: CourseId,
}

/// Student submits an enrollment request for a course.
pub async fn create_enrollment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateEnrollmentRequest>,
) -> Result<(StatusCode, Json<CourseBooking>), ApiError> {
    if state.store.get_course(body.course_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("course: {}", body.course_id)));
    }

    let booking = CourseBooking::new(body.course_id, auth.user_id, Utc::now());
    state.store.insert_course_booking(&booking).await?;

    tracing::info!(
        booking_id = %booking.id,
        course_id = %booking.course_id,
        student_id = %booking.student_id,
        "Enrollment requested"
    );

    Ok((StatusCode::CREATED, Json(booking)))
}

/// Get one of the caller's enrollment requests.
pub async fn get_enrollment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<CourseBookingId>,
) -> Result<Json<CourseBooking>, ApiError> {
    let booking = state
        .store
        .get_course_booking(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("enrollment: {id}")))?;

    if booking.student_id != auth.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(booking))
}

/// Enrollment list response.
#[derive(Debug, Serialize)]
pub struct EnrollmentsResponse {
    /// The caller's enrollment requests, oldest first.
    pub enrollments: Vec<CourseBooking>,
}

/// List the caller's enrollment requests.
pub async fn list_enrollments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<EnrollmentsResponse>, ApiError> {
    let enrollments = state
        .store
        .list_course_bookings_for_student(auth.user_id)
        .await?;
    Ok(Json(EnrollmentsResponse { enrollments }))
}

/// Response to a funds-gated approval.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    /// `approved` or `auto_rejected`.
    pub outcome: &'static str,

    /// The decided booking.
    pub booking: CourseBooking,

    /// The allocated course ledger, when approved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<CourseCreditLedger>,

    /// The wallet after the spend, when approved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Wallet>,

    /// The wallet balance at decision time, when auto-rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,

    /// The course cost that could not be covered, when auto-rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<i64>,
}

/// Staff approve a pending enrollment. Insufficient funds auto-rejects the
/// booking instead of failing the request.
pub async fn approve_enrollment(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<CourseBookingId>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let outcome = state
        .store
        .approve_enrollment(id, admin.admin_id, Utc::now())
        .await?;

    let response = match outcome {
        ApprovalOutcome::Approved {
            booking,
            ledger,
            wallet,
        } => {
            tracing::info!(
                booking_id = %booking.id,
                student_id = %booking.student_id,
                course_id = %booking.course_id,
                admin_id = %admin.admin_id,
                "Enrollment approved"
            );
            ApprovalResponse {
                outcome: "approved",
                booking,
                ledger: Some(ledger),
                wallet: Some(wallet),
                balance: None,
                required: None,
            }
        }
        ApprovalOutcome::AutoRejected {
            booking,
            balance,
            required,
        } => ApprovalResponse {
            outcome: "auto_rejected",
            booking,
            ledger: None,
            wallet: None,
            balance: Some(balance),
            required: Some(required),
        },
    };

    Ok(Json(response))
}

/// Request to reject an enrollment.
#[derive(Debug, Deserialize)]
pub struct RejectEnrollmentRequest {
    /// Why the enrollment was rejected.
    pub note: String,
}

/// Staff reject a pending enrollment.
pub async fn reject_enrollment(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<CourseBookingId>,
    Json(body): Json<RejectEnrollmentRequest>,
) -> Result<Json<CourseBooking>, ApiError> {
    let booking = state
        .store
        .reject_enrollment(id, admin.admin_id, body.note, Utc::now())
        .await?;

    tracing::info!(
        booking_id = %booking.id,
        admin_id = %admin.admin_id,
        "Enrollment rejected"
    );

    Ok(Json(booking))
}

/// A course ledger with its transaction history.
#[derive(Debug, Serialize)]
pub struct CourseLedgerResponse {
    /// The ledger identity row.
    pub ledger: CourseCreditLedger,
    /// Its transactions, oldest first.
    pub transactions: Vec<CourseLedgerTransaction>,
}

/// Get the caller's course credit ledger for a course.
pub async fn get_course_ledger(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(course_id): Path<CourseId>,
) -> Result<Json<CourseLedgerResponse>, ApiError> {
    let ledger = state
        .store
        .get_course_ledger(auth.user_id, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("course ledger: {course_id}")))?;
    let transactions = state
        .store
        .list_course_ledger_transactions(auth.user_id, course_id)
        .await?;
    Ok(Json(CourseLedgerResponse {
        ledger,
        transactions,
    }))
}
