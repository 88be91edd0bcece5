//! Meeting provider webhook handler.
//!
//! Deliveries are HMAC-signed and at-least-once. Every business event is
//! verified, deduplicated by `{event}:{meeting_id}:{event_ts}`, matched to a
//! lesson by meeting id, and folded into the lesson state machine. Unknown
//! meetings and duplicates are acknowledged without effect; malformed business
//! payloads get a 4xx and change nothing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use tutordesk_core::{
    LessonAction, LessonChangeLogEntry, LessonId, Participant, SessionEndOutcome,
};

use crate::crypto;
use crate::error::ApiError;
use crate::handlers::lessons::apply_transition;
use crate::state::AppState;

/// Header carrying the delivery signature.
const SIGNATURE_HEADER: &str = "x-mtg-signature";

/// Header carrying the delivery timestamp the signature covers.
const TIMESTAMP_HEADER: &str = "x-mtg-request-timestamp";

/// Webhook envelope sent by the meeting provider.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    event_ts: i64,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    plain_token: Option<String>,
    #[serde(default)]
    object: Option<Value>,
}

fn ack() -> Json<Value> {
    Json(json!({ "received": true }))
}

/// Receive a meeting provider webhook delivery.
pub async fn meetings_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    if let Some(secret) = state.config.meeting_webhook_secret.as_deref() {
        verify_signature(secret, &headers, &body)?;
    } else {
        tracing::warn!("Webhook secret not configured, skipping signature verification");
    }

    let envelope: WebhookEnvelope = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid webhook payload: {e}")))?;

    if envelope.event == "endpoint.url_validation" {
        return url_validation(&state, &envelope);
    }

    let Some(object) = envelope.payload.object.as_ref() else {
        return Err(ApiError::BadRequest(
            "webhook payload missing object".into(),
        ));
    };
    let Some(meeting_id) = object_meeting_id(object) else {
        return Err(ApiError::BadRequest(
            "webhook payload missing meeting id".into(),
        ));
    };

    let dedup_key = format!("{}:{}:{}", envelope.event, meeting_id, envelope.event_ts);
    if state.store.webhook_event_seen(&dedup_key).await? {
        tracing::debug!(key = %dedup_key, "Duplicate webhook delivery acknowledged");
        return Ok(ack());
    }

    let Some(lesson) = state.store.find_lesson_by_meeting_id(&meeting_id).await? else {
        tracing::info!(
            event = %envelope.event,
            meeting_id = %meeting_id,
            "Webhook for unknown meeting acknowledged"
        );
        return Ok(ack());
    };

    let event_time = DateTime::from_timestamp(envelope.event_ts, 0).unwrap_or_else(Utc::now);

    match envelope.event.as_str() {
        "meeting.started" => {
            let at = object_time(object, "start_time", event_time);
            handle_session_started(&state, lesson.id, at).await?;
        }
        "meeting.ended" => {
            let at = object_time(object, "end_time", event_time);
            handle_session_ended(&state, lesson.id, at).await?;
        }
        "meeting.participant_joined" => {
            let at = object
                .get("participant")
                .map_or(event_time, |p| object_time(p, "join_time", event_time));
            handle_participant_event(&state, &lesson, object, Some(at)).await?;
        }
        "meeting.participant_left" => {
            handle_participant_event(&state, &lesson, object, None).await?;
        }
        "meeting.deleted" => {
            handle_meeting_deleted(&state, lesson.id).await?;
        }
        other => {
            tracing::debug!(event = %other, "Unhandled webhook event acknowledged");
        }
    }

    // Recorded only after the fold succeeds: a failed fold stays unrecorded,
    // so the provider's redelivery gets applied instead of being acknowledged
    // as a duplicate. The folds themselves are idempotent, so a concurrent
    // duplicate that races past the check above changes nothing.
    state.store.record_webhook_event(&dedup_key, Utc::now()).await?;

    Ok(ack())
}

/// Check the delivery signature against the shared secret.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &str) -> Result<(), ApiError> {
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let expected = crypto::meeting_signature(secret, timestamp, body);
    if !crypto::constant_time_eq(signature, &expected) {
        tracing::warn!("Webhook signature mismatch");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Answer the provider's URL-validation handshake.
fn url_validation(state: &AppState, envelope: &WebhookEnvelope) -> Result<Json<Value>, ApiError> {
    let Some(plain_token) = envelope.payload.plain_token.as_deref() else {
        return Err(ApiError::BadRequest(
            "url_validation payload missing plain_token".into(),
        ));
    };
    let Some(secret) = state.config.meeting_webhook_secret.as_deref() else {
        return Err(ApiError::BadRequest(
            "webhook secret not configured".into(),
        ));
    };

    Ok(Json(json!({
        "plain_token": plain_token,
        "encrypted_token": crypto::hmac_sha256_hex(secret, plain_token),
    })))
}

/// The provider sends meeting ids as numbers or strings depending on the
/// event; normalize to a string.
fn object_meeting_id(object: &Value) -> Option<String> {
    match object.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Pull an RFC 3339 timestamp off the event object, falling back to the
/// envelope's event time.
fn object_time(object: &Value, key: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    object
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(fallback, |t| t.with_timezone(&Utc))
}

async fn handle_session_started(
    state: &AppState,
    lesson_id: LessonId,
    at: DateTime<Utc>,
) -> Result<(), ApiError> {
    let (lesson, changed) = apply_transition(&state.store, lesson_id, move |lesson, now| {
        let changed = lesson.record_session_started(at, now);
        let log = changed.then(|| {
            LessonChangeLogEntry::new(lesson.id, LessonAction::SessionStarted, None, now)
        });
        Ok((log, changed))
    })
    .await?;

    if changed {
        tracing::info!(lesson_id = %lesson.id, at = %at, "Session started");
    }
    Ok(())
}

async fn handle_session_ended(
    state: &AppState,
    lesson_id: LessonId,
    at: DateTime<Utc>,
) -> Result<(), ApiError> {
    let (lesson, outcome) = apply_transition(&state.store, lesson_id, move |lesson, now| {
        let outcome = lesson.record_session_ended(at, now);
        let log = (outcome != SessionEndOutcome::NoChange).then(|| {
            LessonChangeLogEntry::new(lesson.id, LessonAction::SessionEnded, None, now)
        });
        Ok((log, outcome))
    })
    .await?;

    if outcome == SessionEndOutcome::CompletedNow {
        tracing::info!(lesson_id = %lesson.id, "Lesson completed");

        // One course credit per completed lesson, best-effort: a thin or
        // missing ledger must never fail the ack.
        if let Err(e) = state
            .store
            .consume_course_credits(
                lesson.student_id,
                lesson.course_id,
                1,
                Some(*lesson.id.as_uuid()),
                Utc::now(),
            )
            .await
        {
            tracing::warn!(
                lesson_id = %lesson.id,
                student_id = %lesson.student_id,
                course_id = %lesson.course_id,
                error = %e,
                "Could not consume course credit for completed lesson"
            );
        }

        state.notifier.send(
            "lesson.completed",
            json!({
                "lesson_id": lesson.id,
                "student_id": lesson.student_id,
                "tutor_id": lesson.tutor_id,
                "session_ended_at": lesson.session_ended_at,
            }),
        );
    }
    Ok(())
}

/// Fold a `participant_joined` or `participant_left` event into attendance.
/// Either event proves the participant was in the meeting; only a join
/// carries a timestamp.
async fn handle_participant_event(
    state: &AppState,
    lesson: &tutordesk_core::LessonBooking,
    object: &Value,
    joined: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    let Some(email) = object
        .get("participant")
        .and_then(|p| p.get("email"))
        .and_then(Value::as_str)
    else {
        return Err(ApiError::BadRequest(
            "participant event payload missing participant email".into(),
        ));
    };

    let Some(participant) = match_participant(state, lesson, email).await? else {
        tracing::info!(
            lesson_id = %lesson.id,
            email = %email,
            "Participant email matches neither student nor tutor, ignored"
        );
        return Ok(());
    };

    let side = match participant {
        Participant::Student => "student",
        Participant::Tutor => "tutor",
    };
    let verb = if joined.is_some() { "joined" } else { "left" };
    let (_, changed) = apply_transition(&state.store, lesson.id, move |lesson, now| {
        let changed = lesson.record_attendance(participant, joined, now);
        let log = changed.then(|| {
            LessonChangeLogEntry::new(lesson.id, LessonAction::AttendanceRecorded, None, now)
                .with_note(format!("{side} {verb}"))
        });
        Ok((log, changed))
    })
    .await?;

    if changed {
        tracing::info!(lesson_id = %lesson.id, side, "Attendance recorded");
    }
    Ok(())
}

/// Match a webhook participant email against the lesson's student and tutor
/// profiles, case-insensitively.
async fn match_participant(
    state: &AppState,
    lesson: &tutordesk_core::LessonBooking,
    email: &str,
) -> Result<Option<Participant>, ApiError> {
    if let Some(student) = state.store.get_user(lesson.student_id).await? {
        if student.email.eq_ignore_ascii_case(email) {
            return Ok(Some(Participant::Student));
        }
    }
    if let Some(tutor_id) = lesson.tutor_id {
        if let Some(tutor) = state.store.get_user(tutor_id).await? {
            if tutor.email.eq_ignore_ascii_case(email) {
                return Ok(Some(Participant::Tutor));
            }
        }
    }
    Ok(None)
}

async fn handle_meeting_deleted(state: &AppState, lesson_id: LessonId) -> Result<(), ApiError> {
    let (lesson, changed) = apply_transition(&state.store, lesson_id, move |lesson, now| {
        let changed = lesson.clear_meeting(now);
        let log = changed.then(|| {
            LessonChangeLogEntry::new(lesson.id, LessonAction::MeetingCleared, None, now)
        });
        Ok((log, changed))
    })
    .await?;

    if changed {
        tracing::info!(lesson_id = %lesson.id, "Meeting deleted upstream, fields cleared");
    }
    Ok(())
}
