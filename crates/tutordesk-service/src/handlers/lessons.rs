//! Lesson lifecycle handlers.
//!
//! Every transition loads the lesson, mutates it in memory through the domain
//! state machine, and persists it guarded by the optimistic `revision` token.
//! A revision conflict reloads and retries a bounded number of times, so
//! user-driven and webhook-driven transitions on the same lesson race safely.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutordesk_core::{
    CourseBookingId, CourseId, LessonAction, LessonBooking, LessonChangeLogEntry, LessonId,
    LessonRequest, RescheduleOutcome, ScheduleOption, UserId,
};
use tutordesk_store::{Store, StoreError};

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;
use crate::zoom::CreateMeetingRequest;

/// How many times a transition is retried after a revision conflict before
/// giving up and asking the caller to retry.
const MAX_REVISION_RETRIES: u32 = 3;

/// Load, mutate, and persist a lesson under its optimistic revision token.
///
/// The closure receives the freshly loaded lesson and `now`, applies a domain
/// transition, and returns the change-log row to append plus a caller value.
/// On `StoreError::Conflict` the lesson is reloaded and the closure re-run.
pub(crate) async fn apply_transition<T, F>(
    store: &Arc<dyn Store>,
    id: LessonId,
    mut mutate: F,
) -> Result<(LessonBooking, T), ApiError>
where
    F: FnMut(
        &mut LessonBooking,
        DateTime<Utc>,
    ) -> Result<(Option<LessonChangeLogEntry>, T), ApiError>,
{
    for _ in 0..MAX_REVISION_RETRIES {
        let Some(mut lesson) = store.get_lesson(id).await? else {
            return Err(ApiError::NotFound(format!("lesson: {id}")));
        };
        let expected_revision = lesson.revision;
        let now = Utc::now();
        let (log, value) = mutate(&mut lesson, now)?;

        match store
            .update_lesson(&lesson, expected_revision, log.as_ref())
            .await
        {
            Ok(()) => {
                lesson.revision = expected_revision + 1;
                return Ok((lesson, value));
            }
            Err(StoreError::Conflict) => {
                tracing::debug!(
                    lesson_id = %id,
                    "Lesson revision conflict, reloading and retrying"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Conflict(
        "lesson is being modified concurrently, retry the request".into(),
    ))
}

/// Request to create a lesson.
#[derive(Debug, Deserialize)]
pub struct CreateLessonRequest {
    /// The course to be taught.
    pub course_id: CourseId,
    /// The approved enrollment funding this lesson, if linked.
    pub course_booking_id: Option<CourseBookingId>,
    /// Start of the acceptable window.
    pub date_from: DateTime<Utc>,
    /// End of the acceptable window.
    pub date_to: DateTime<Utc>,
    /// Exactly three candidate start times inside the window.
    pub options: [DateTime<Utc>; 3],
    /// Lesson length in minutes.
    pub duration_minutes: i32,
}

/// Student submits a lesson request with three candidate start times.
pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateLessonRequest>,
) -> Result<(StatusCode, Json<LessonBooking>), ApiError> {
    if state.store.get_course(body.course_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("course: {}", body.course_id)));
    }
    if let Some(booking_id) = body.course_booking_id {
        let Some(booking) = state.store.get_course_booking(booking_id).await? else {
            return Err(ApiError::NotFound(format!("enrollment: {booking_id}")));
        };
        if booking.student_id != auth.user_id {
            return Err(ApiError::Forbidden);
        }
        if booking.status != tutordesk_core::BookingStatus::Approved {
            return Err(ApiError::Conflict(format!(
                "enrollment {booking_id} is not approved"
            )));
        }
    }

    let now = Utc::now();
    let lesson = LessonBooking::new_request(
        LessonRequest {
            course_booking_id: body.course_booking_id,
            course_id: body.course_id,
            student_id: auth.user_id,
            date_from: body.date_from,
            date_to: body.date_to,
            options: body.options,
            duration_minutes: body.duration_minutes,
        },
        now,
    )?;
    let log = LessonChangeLogEntry::new(
        lesson.id,
        LessonAction::Requested,
        Some(auth.user_id),
        now,
    );
    state.store.insert_lesson(&lesson, &log).await?;

    tracing::info!(
        lesson_id = %lesson.id,
        course_id = %lesson.course_id,
        student_id = %lesson.student_id,
        "Lesson requested"
    );

    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn load_lesson_for(
    state: &AppState,
    id: LessonId,
    user_id: UserId,
) -> Result<LessonBooking, ApiError> {
    let lesson = state
        .store
        .get_lesson(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lesson: {id}")))?;
    if lesson.student_id != user_id && lesson.tutor_id != Some(user_id) {
        return Err(ApiError::Forbidden);
    }
    Ok(lesson)
}

/// Get a lesson. Only its student or tutor may read it.
pub async fn get_lesson(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<LessonId>,
) -> Result<Json<LessonBooking>, ApiError> {
    let lesson = load_lesson_for(&state, id, auth.user_id).await?;
    Ok(Json(lesson))
}

/// Change-log response.
#[derive(Debug, Serialize)]
pub struct LessonHistoryResponse {
    /// Audit rows, oldest first.
    pub history: Vec<LessonChangeLogEntry>,
}

/// Get a lesson's change log. Only its student or tutor may read it.
pub async fn get_lesson_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<LessonId>,
) -> Result<Json<LessonHistoryResponse>, ApiError> {
    load_lesson_for(&state, id, auth.user_id).await?;
    let history = state.store.list_lesson_history(id).await?;
    Ok(Json(LessonHistoryResponse { history }))
}

/// Request to schedule a lesson.
#[derive(Debug, Deserialize)]
pub struct ScheduleLessonRequest {
    /// Which of the three proposed options to commit to (1-based).
    pub option: u8,
    /// The tutor to assign.
    pub tutor_id: UserId,
    /// Staff note for the decision.
    pub note: Option<String>,
}

/// Staff schedule a lesson: commit to one proposed option and a tutor, then
/// provision a meeting best-effort.
pub async fn schedule_lesson(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<LessonId>,
    Json(body): Json<ScheduleLessonRequest>,
) -> Result<Json<LessonBooking>, ApiError> {
    let Some(option) = ScheduleOption::from_index(body.option) else {
        return Err(ApiError::BadRequest(format!(
            "option must be 1, 2, or 3, got {}",
            body.option
        )));
    };

    let tutor_id = body.tutor_id;
    let admin_id = admin.admin_id;

    let tutor = state
        .store
        .get_user(tutor_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tutor: {tutor_id}")))?;
    tutor.ensure_assignable_tutor()?;

    let note = body.note;
    let (lesson, ()) = apply_transition(&state.store, id, move |lesson, now| {
        let old_start = lesson.scheduled_start;
        let old_end = lesson.scheduled_end;
        lesson.schedule(option, tutor_id, admin_id, note.clone(), now)?;
        let log = LessonChangeLogEntry::new(lesson.id, LessonAction::Scheduled, Some(admin_id), now)
            .with_times(old_start, old_end, lesson.scheduled_start, lesson.scheduled_end);
        Ok((Some(log), ()))
    })
    .await?;

    tracing::info!(
        lesson_id = %lesson.id,
        tutor_id = %tutor_id,
        option = option.index(),
        start = ?lesson.scheduled_start,
        admin_id = %admin_id,
        "Lesson scheduled"
    );

    let lesson = provision_meeting(&state, lesson, &tutor.timezone, admin_id).await?;

    state.notifier.send(
        "lesson.scheduled",
        serde_json::json!({
            "lesson_id": lesson.id,
            "student_id": lesson.student_id,
            "tutor_id": lesson.tutor_id,
            "scheduled_start": lesson.scheduled_start,
            "scheduled_end": lesson.scheduled_end,
            "meeting_join_url": lesson.meeting_join_url,
        }),
    );

    Ok(Json(lesson))
}

/// Create an external meeting for a freshly scheduled lesson and patch its
/// coordinates in. Failures leave the lesson scheduled without a meeting.
async fn provision_meeting(
    state: &AppState,
    lesson: LessonBooking,
    tutor_timezone: &str,
    admin_id: UserId,
) -> Result<LessonBooking, ApiError> {
    let Some(zoom) = state.zoom.as_ref() else {
        return Ok(lesson);
    };
    let Some(start) = lesson.scheduled_start else {
        return Ok(lesson);
    };

    let topic = match state.store.get_course(lesson.course_id).await? {
        Some(course) => format!("{} lesson", course.name),
        None => "Lesson".to_string(),
    };

    let meeting = match zoom
        .create_meeting(&CreateMeetingRequest {
            topic,
            start_time: start,
            duration: lesson.duration_minutes,
            timezone: tutor_timezone.to_string(),
        })
        .await
    {
        Ok(meeting) => meeting,
        Err(e) => {
            tracing::warn!(
                lesson_id = %lesson.id,
                error = %e,
                "Meeting provisioning failed, lesson stays scheduled without a meeting"
            );
            return Ok(lesson);
        }
    };

    let meeting_id = meeting.id.clone();
    let (lesson, ()) = apply_transition(&state.store, lesson.id, move |lesson, now| {
        lesson.attach_meeting(
            meeting.id.clone(),
            meeting.join_url.clone(),
            meeting.password.clone(),
            now,
        );
        let log = LessonChangeLogEntry::new(
            lesson.id,
            LessonAction::MeetingProvisioned,
            Some(admin_id),
            now,
        )
        .with_note(format!("meeting {}", meeting.id));
        Ok((Some(log), ()))
    })
    .await?;

    tracing::info!(lesson_id = %lesson.id, meeting_id = %meeting_id, "Meeting provisioned");
    Ok(lesson)
}

/// Request to reject a lesson request.
#[derive(Debug, Deserialize)]
pub struct RejectLessonRequest {
    /// Staff note for the decision.
    pub note: Option<String>,
}

/// Staff reject a pending lesson request.
pub async fn reject_lesson(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<LessonId>,
    Json(body): Json<RejectLessonRequest>,
) -> Result<Json<LessonBooking>, ApiError> {
    let admin_id = admin.admin_id;
    let (lesson, ()) = apply_transition(&state.store, id, move |lesson, now| {
        lesson.reject(admin_id, body.note.clone(), now)?;
        let mut log =
            LessonChangeLogEntry::new(lesson.id, LessonAction::Rejected, Some(admin_id), now);
        if let Some(note) = &body.note {
            log = log.with_note(note.clone());
        }
        Ok((Some(log), ()))
    })
    .await?;

    tracing::info!(lesson_id = %lesson.id, admin_id = %admin_id, "Lesson rejected");
    Ok(Json(lesson))
}

/// Request to move a scheduled lesson.
#[derive(Debug, Deserialize)]
pub struct RescheduleLessonRequest {
    /// Why the student wants to move the lesson.
    pub note: Option<String>,
}

/// Reschedule response.
#[derive(Debug, Serialize)]
pub struct RescheduleResponse {
    /// The lesson after the request.
    pub lesson: LessonBooking,
    /// `released` or `held_past_cutoff`.
    pub outcome: &'static str,
}

/// Student asks to move a scheduled lesson. Outside the 24-hour cutoff the
/// schedule and meeting are released; inside it staff must decide manually.
pub async fn request_reschedule(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<LessonId>,
    Json(body): Json<RescheduleLessonRequest>,
) -> Result<Json<RescheduleResponse>, ApiError> {
    let (lesson, (outcome, released_meeting)) =
        apply_transition(&state.store, id, move |lesson, now| {
            if lesson.student_id != auth.user_id {
                return Err(ApiError::Forbidden);
            }
            let old_start = lesson.scheduled_start;
            let old_end = lesson.scheduled_end;
            let meeting_id = lesson.meeting_id.clone();
            let outcome = lesson.request_reschedule(body.note.clone(), now)?;

            let mut log = LessonChangeLogEntry::new(
                lesson.id,
                LessonAction::RescheduleRequested,
                Some(auth.user_id),
                now,
            )
            .with_times(old_start, old_end, lesson.scheduled_start, lesson.scheduled_end);
            if let Some(note) = &body.note {
                log = log.with_note(note.clone());
            }

            let released = match outcome {
                RescheduleOutcome::Released => meeting_id,
                RescheduleOutcome::HeldPastCutoff => None,
            };
            Ok((Some(log), (outcome, released)))
        })
        .await?;

    if let Some(meeting_id) = released_meeting {
        release_meeting(&state, &meeting_id, lesson.id).await;
    }

    state.notifier.send(
        "lesson.reschedule_requested",
        serde_json::json!({
            "lesson_id": lesson.id,
            "student_id": lesson.student_id,
            "tutor_id": lesson.tutor_id,
            "held": outcome == RescheduleOutcome::HeldPastCutoff,
        }),
    );

    Ok(Json(RescheduleResponse {
        lesson,
        outcome: match outcome {
            RescheduleOutcome::Released => "released",
            RescheduleOutcome::HeldPastCutoff => "held_past_cutoff",
        },
    }))
}

/// Delete an external meeting best-effort; the lesson row is already updated.
async fn release_meeting(state: &AppState, meeting_id: &str, lesson_id: LessonId) {
    let Some(zoom) = state.zoom.as_ref() else {
        return;
    };
    if let Err(e) = zoom.delete_meeting(meeting_id).await {
        tracing::warn!(
            lesson_id = %lesson_id,
            meeting_id = %meeting_id,
            error = %e,
            "Failed to delete external meeting"
        );
    }
}

/// Request to cancel a lesson.
#[derive(Debug, Deserialize)]
pub struct CancelLessonRequest {
    /// Why the lesson was cancelled.
    pub reason: Option<String>,
}

/// Cancel a non-terminal lesson. Allowed for the lesson's student or staff.
pub async fn cancel_lesson(
    State(state): State<Arc<AppState>>,
    admin: Option<AdminAuth>,
    auth: Option<AuthUser>,
    Path(id): Path<LessonId>,
    Json(body): Json<CancelLessonRequest>,
) -> Result<Json<LessonBooking>, ApiError> {
    let (actor, is_staff) = match (&admin, &auth) {
        (Some(admin), _) => (admin.admin_id, true),
        (None, Some(user)) => (user.user_id, false),
        (None, None) => return Err(ApiError::Unauthorized),
    };

    let (lesson, meeting_id) = apply_transition(&state.store, id, move |lesson, now| {
        if !is_staff && lesson.student_id != actor {
            return Err(ApiError::Forbidden);
        }
        let meeting_id = lesson.meeting_id.clone();
        lesson.cancel(actor, body.reason.clone(), now)?;
        let mut log =
            LessonChangeLogEntry::new(lesson.id, LessonAction::Cancelled, Some(actor), now);
        if let Some(reason) = &body.reason {
            log = log.with_note(reason.clone());
        }
        Ok((Some(log), meeting_id))
    })
    .await?;

    if let Some(meeting_id) = meeting_id {
        release_meeting(&state, &meeting_id, lesson.id).await;
    }

    tracing::info!(lesson_id = %lesson.id, actor = %actor, staff = is_staff, "Lesson cancelled");

    state.notifier.send(
        "lesson.cancelled",
        serde_json::json!({
            "lesson_id": lesson.id,
            "student_id": lesson.student_id,
            "tutor_id": lesson.tutor_id,
            "cancelled_by": actor,
        }),
    );

    Ok(Json(lesson))
}

/// Request to mark a no-show.
#[derive(Debug, Deserialize)]
pub struct NoShowRequest {
    /// Staff note about who failed to attend.
    pub note: Option<String>,
}

/// Staff mark a scheduled lesson as a no-show.
pub async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<LessonId>,
    Json(body): Json<NoShowRequest>,
) -> Result<Json<LessonBooking>, ApiError> {
    let admin_id = admin.admin_id;
    let (lesson, ()) = apply_transition(&state.store, id, move |lesson, now| {
        lesson.mark_no_show(admin_id, body.note.clone(), now)?;
        let mut log =
            LessonChangeLogEntry::new(lesson.id, LessonAction::NoShow, Some(admin_id), now);
        if let Some(note) = &body.note {
            log = log.with_note(note.clone());
        }
        Ok((Some(log), ()))
    })
    .await?;

    tracing::info!(lesson_id = %lesson.id, admin_id = %admin_id, "Lesson marked no-show");
    Ok(Json(lesson))
}
