//! Lesson bookings and their lifecycle state machine.
//!
//! A lesson starts as a student request carrying three candidate start times
//! inside an acceptable window. Staff commit to one option and a tutor, a
//! meeting is provisioned best-effort, and asynchronous provider webhooks fold
//! session and attendance facts back in until the lesson reaches a terminal
//! state.
//!
//! All transitions take `now` explicitly so the 24-hour reschedule rule and
//! every audit timestamp are deterministic under test.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ids::{CourseBookingId, CourseId, LessonId, UserId};

/// Students may freely request a reschedule only this far ahead of the
/// scheduled start; inside the cutoff staff must decide manually.
pub const RESCHEDULE_CUTOFF_HOURS: i64 = 24;

/// Lifecycle state of a lesson booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    /// Requested by the student, awaiting staff scheduling.
    Pending,

    /// Staff committed to an option and a tutor.
    Scheduled,

    /// The student asked to move a scheduled lesson.
    RescheduleRequested,

    /// Re-scheduled after at least one reschedule request.
    Rescheduled,

    /// The session took place.
    Completed,

    /// Cancelled by a student or staff.
    Cancelled,

    /// Rejected by staff without ever being scheduled.
    Rejected,

    /// Scheduled but nobody (or not everybody) showed up.
    NoShow,
}

impl LessonStatus {
    /// Terminal states admit no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Rejected | Self::NoShow
        )
    }

    /// States in which the lesson has a committed schedule.
    #[must_use]
    pub const fn is_scheduled_like(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Rescheduled)
    }

    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::RescheduleRequested => "reschedule_requested",
            Self::Rescheduled => "rescheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::NoShow => "no_show",
        }
    }
}

/// One of the three candidate start times offered by the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOption {
    /// `option1`.
    First,
    /// `option2`.
    Second,
    /// `option3`.
    Third,
}

impl ScheduleOption {
    /// Parse a 1-based option index as sent over the API.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            3 => Some(Self::Third),
            _ => None,
        }
    }

    /// The 1-based index of this option.
    #[must_use]
    pub const fn index(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }
}

/// Outcome of a student reschedule request, decided by the 24-hour cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleOutcome {
    /// Start was far enough away: schedule and meeting were released and the
    /// external meeting resource should be deleted by the caller.
    Released,

    /// Start is inside the cutoff: schedule and meeting are kept; staff must
    /// decide manually.
    HeldPastCutoff,
}

/// Outcome of folding a `meeting.ended` event into a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndOutcome {
    /// The end timestamp was recorded and the lesson moved to `Completed`.
    CompletedNow,

    /// The end timestamp was recorded but the lesson was not in a
    /// scheduled-like state.
    RecordedOnly,

    /// The event was a duplicate; nothing changed.
    NoChange,
}

/// Which side of the lesson a webhook participant matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    /// The enrolled student.
    Student,
    /// The assigned tutor.
    Tutor,
}

/// Input for creating a lesson request.
#[derive(Debug, Clone)]
pub struct LessonRequest {
    /// The approved enrollment funding this lesson, if linked.
    pub course_booking_id: Option<CourseBookingId>,

    /// The course being taught.
    pub course_id: CourseId,

    /// The requesting student.
    pub student_id: UserId,

    /// Start of the acceptable window.
    pub date_from: DateTime<Utc>,

    /// End of the acceptable window.
    pub date_to: DateTime<Utc>,

    /// The three candidate start times.
    pub options: [DateTime<Utc>; 3],

    /// Lesson length in minutes.
    pub duration_minutes: i32,
}

/// A single tutoring session instance, proposed or scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonBooking {
    /// The lesson id.
    pub id: LessonId,

    /// The enrollment that funded this lesson, if linked.
    pub course_booking_id: Option<CourseBookingId>,

    /// The course being taught.
    pub course_id: CourseId,

    /// The student.
    pub student_id: UserId,

    /// The assigned tutor; `None` until scheduled.
    pub tutor_id: Option<UserId>,

    /// Start of the acceptable window. Immutable after creation.
    pub date_from: DateTime<Utc>,

    /// End of the acceptable window. Immutable after creation.
    pub date_to: DateTime<Utc>,

    /// Candidate start time 1. Immutable after creation.
    pub option1: DateTime<Utc>,

    /// Candidate start time 2. Immutable after creation.
    pub option2: DateTime<Utc>,

    /// Candidate start time 3. Immutable after creation.
    pub option3: DateTime<Utc>,

    /// Lesson length in minutes.
    pub duration_minutes: i32,

    /// Committed start; `None` until staff schedule.
    pub scheduled_start: Option<DateTime<Utc>>,

    /// Committed end; `None` until staff schedule.
    pub scheduled_end: Option<DateTime<Utc>>,

    /// External meeting id; `None` unless provisioning succeeded.
    pub meeting_id: Option<String>,

    /// External meeting join URL.
    pub meeting_join_url: Option<String>,

    /// External meeting password.
    pub meeting_password: Option<String>,

    /// When the provider reported the session started.
    pub session_started_at: Option<DateTime<Utc>>,

    /// When the provider reported the session ended.
    pub session_ended_at: Option<DateTime<Utc>>,

    /// When the student first joined.
    pub student_joined_at: Option<DateTime<Utc>>,

    /// When the tutor first joined.
    pub tutor_joined_at: Option<DateTime<Utc>>,

    /// The student attended. Once true, never reset.
    pub student_attended: bool,

    /// The tutor attended. Once true, never reset.
    pub tutor_attended: bool,

    /// Staff note about attendance.
    pub attendance_note: Option<String>,

    /// A reschedule request is open.
    pub reschedule_requested: bool,

    /// When the reschedule was requested.
    pub reschedule_requested_at: Option<DateTime<Utc>>,

    /// Student's note on the reschedule request.
    pub reschedule_note: Option<String>,

    /// How many times a reschedule has been requested.
    pub reschedule_count: i32,

    /// A cancellation request was recorded.
    pub cancellation_requested: bool,

    /// When the cancellation was requested.
    pub cancellation_requested_at: Option<DateTime<Utc>>,

    /// Who requested the cancellation.
    pub cancellation_requested_by: Option<UserId>,

    /// When the lesson was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Who cancelled the lesson.
    pub cancelled_by: Option<UserId>,

    /// Reason given for the cancellation.
    pub cancel_reason: Option<String>,

    /// When the last staff decision was made.
    pub decision_at: Option<DateTime<Utc>>,

    /// Who made the last staff decision.
    pub decision_by: Option<UserId>,

    /// Note attached to the last staff decision.
    pub decision_note: Option<String>,

    /// Lifecycle state.
    pub status: LessonStatus,

    /// Optimistic-concurrency token, incremented on every persisted update.
    pub revision: i64,

    /// When the lesson was created.
    pub created_at: DateTime<Utc>,

    /// When the lesson was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LessonBooking {
    /// Validate a student request and create a `Pending` lesson.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidProposal`] for a malformed window or duration.
    /// - [`CoreError::OptionOutOfRange`] if any candidate start falls outside
    ///   `[date_from, date_to]`.
    pub fn new_request(request: LessonRequest, now: DateTime<Utc>) -> Result<Self> {
        if request.date_to < request.date_from {
            return Err(CoreError::InvalidProposal {
                reason: "date_to precedes date_from".into(),
            });
        }
        if request.duration_minutes <= 0 {
            return Err(CoreError::InvalidProposal {
                reason: format!("duration must be positive, got {}", request.duration_minutes),
            });
        }
        for (i, option) in request.options.iter().enumerate() {
            if *option < request.date_from || *option > request.date_to {
                return Err(CoreError::OptionOutOfRange {
                    option: u8::try_from(i + 1).unwrap_or(u8::MAX),
                });
            }
        }

        Ok(Self {
            id: LessonId::generate(),
            course_booking_id: request.course_booking_id,
            course_id: request.course_id,
            student_id: request.student_id,
            tutor_id: None,
            date_from: request.date_from,
            date_to: request.date_to,
            option1: request.options[0],
            option2: request.options[1],
            option3: request.options[2],
            duration_minutes: request.duration_minutes,
            scheduled_start: None,
            scheduled_end: None,
            meeting_id: None,
            meeting_join_url: None,
            meeting_password: None,
            session_started_at: None,
            session_ended_at: None,
            student_joined_at: None,
            tutor_joined_at: None,
            student_attended: false,
            tutor_attended: false,
            attendance_note: None,
            reschedule_requested: false,
            reschedule_requested_at: None,
            reschedule_note: None,
            reschedule_count: 0,
            cancellation_requested: false,
            cancellation_requested_at: None,
            cancellation_requested_by: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            decision_at: None,
            decision_by: None,
            decision_note: None,
            status: LessonStatus::Pending,
            revision: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// The start time carried by one of the three proposal slots.
    #[must_use]
    pub const fn option_start(&self, option: ScheduleOption) -> DateTime<Utc> {
        match option {
            ScheduleOption::First => self.option1,
            ScheduleOption::Second => self.option2,
            ScheduleOption::Third => self.option3,
        }
    }

    /// Staff commit to one of the proposed options and a tutor.
    ///
    /// Ad hoc times are not permitted: the committed start is always one of
    /// the three student-proposed options. Meeting provisioning happens
    /// outside this transition; its result is patched in afterwards via
    /// [`LessonBooking::attach_meeting`].
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransition`] unless the lesson is `Pending` or
    /// `RescheduleRequested`.
    pub fn schedule(
        &mut self,
        option: ScheduleOption,
        tutor_id: UserId,
        actor: UserId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !matches!(
            self.status,
            LessonStatus::Pending | LessonStatus::RescheduleRequested
        ) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                action: "schedule",
            });
        }

        let start = self.option_start(option);
        self.tutor_id = Some(tutor_id);
        self.scheduled_start = Some(start);
        self.scheduled_end = Some(start + Duration::minutes(i64::from(self.duration_minutes)));
        self.reschedule_requested = false;
        self.reschedule_requested_at = None;
        self.reschedule_note = None;
        self.decision_at = Some(now);
        self.decision_by = Some(actor);
        self.decision_note = note;
        self.status = if self.reschedule_count > 0 {
            LessonStatus::Rescheduled
        } else {
            LessonStatus::Scheduled
        };
        self.touch(now);
        Ok(())
    }

    /// Staff reject a pending request outright.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransition`] unless the lesson is `Pending` or
    /// `RescheduleRequested`.
    pub fn reject(&mut self, actor: UserId, note: Option<String>, now: DateTime<Utc>) -> Result<()> {
        if !matches!(
            self.status,
            LessonStatus::Pending | LessonStatus::RescheduleRequested
        ) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                action: "reject",
            });
        }
        self.decision_at = Some(now);
        self.decision_by = Some(actor);
        self.decision_note = note;
        self.status = LessonStatus::Rejected;
        self.touch(now);
        Ok(())
    }

    /// Student asks to move a scheduled lesson.
    ///
    /// The cutoff is evaluated against `scheduled_start` at the moment of the
    /// request. Outside the cutoff the committed schedule and meeting fields
    /// are released (the caller deletes the external meeting best-effort);
    /// inside it everything is kept for staff to decide manually.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransition`] unless the lesson is in a
    /// scheduled-like state with a committed start.
    pub fn request_reschedule(
        &mut self,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RescheduleOutcome> {
        if !self.status.is_scheduled_like() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                action: "request a reschedule for",
            });
        }
        let Some(start) = self.scheduled_start else {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                action: "request a reschedule for",
            });
        };

        self.reschedule_requested = true;
        self.reschedule_requested_at = Some(now);
        self.reschedule_note = note;
        self.reschedule_count += 1;
        self.status = LessonStatus::RescheduleRequested;

        let outcome = if start - now > Duration::hours(RESCHEDULE_CUTOFF_HOURS) {
            self.scheduled_start = None;
            self.scheduled_end = None;
            self.clear_meeting_fields();
            RescheduleOutcome::Released
        } else {
            RescheduleOutcome::HeldPastCutoff
        };
        self.touch(now);
        Ok(outcome)
    }

    /// Cancel a non-terminal lesson.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransition`] if the lesson is already terminal.
    pub fn cancel(
        &mut self,
        actor: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                action: "cancel",
            });
        }
        self.cancellation_requested = true;
        self.cancellation_requested_at = Some(now);
        self.cancellation_requested_by = Some(actor);
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(actor);
        self.cancel_reason = reason;
        self.status = LessonStatus::Cancelled;
        self.touch(now);
        Ok(())
    }

    /// Staff mark a scheduled lesson as a no-show.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransition`] unless the lesson is scheduled-like.
    pub fn mark_no_show(
        &mut self,
        actor: UserId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.is_scheduled_like() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                action: "mark no-show",
            });
        }
        self.attendance_note = note.clone();
        self.decision_at = Some(now);
        self.decision_by = Some(actor);
        self.decision_note = note;
        self.status = LessonStatus::NoShow;
        self.touch(now);
        Ok(())
    }

    /// Patch in a successfully provisioned meeting resource.
    pub fn attach_meeting(
        &mut self,
        meeting_id: impl Into<String>,
        join_url: impl Into<String>,
        password: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.meeting_id = Some(meeting_id.into());
        self.meeting_join_url = Some(join_url.into());
        self.meeting_password = password;
        self.touch(now);
    }

    /// Fold in a `meeting.started` event. Idempotent: an existing timestamp
    /// is never overwritten. Returns whether anything changed.
    pub fn record_session_started(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.session_started_at.is_some() {
            return false;
        }
        self.session_started_at = Some(at);
        self.touch(now);
        true
    }

    /// Fold in a `meeting.ended` event. Idempotent; completes the lesson if
    /// it is still scheduled-like.
    pub fn record_session_ended(
        &mut self,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SessionEndOutcome {
        if self.session_ended_at.is_some() {
            return SessionEndOutcome::NoChange;
        }
        self.session_ended_at = Some(at);
        let outcome = if self.status.is_scheduled_like() {
            self.status = LessonStatus::Completed;
            SessionEndOutcome::CompletedNow
        } else {
            SessionEndOutcome::RecordedOnly
        };
        self.touch(now);
        outcome
    }

    /// Fold in a participant join or leave. Either event proves attendance;
    /// once true it stays true. The first join timestamp is kept, and a leave
    /// event carries none. Returns whether anything changed.
    pub fn record_attendance(
        &mut self,
        participant: Participant,
        joined: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let (attended, joined_at) = match participant {
            Participant::Student => (&mut self.student_attended, &mut self.student_joined_at),
            Participant::Tutor => (&mut self.tutor_attended, &mut self.tutor_joined_at),
        };
        let mut changed = false;
        if !*attended {
            *attended = true;
            changed = true;
        }
        if joined_at.is_none() && joined.is_some() {
            *joined_at = joined;
            changed = true;
        }
        if changed {
            self.touch(now);
        }
        changed
    }

    /// Fold in a `meeting.deleted` event: clear meeting fields, keep status.
    /// Returns whether anything changed.
    pub fn clear_meeting(&mut self, now: DateTime<Utc>) -> bool {
        if self.meeting_id.is_none()
            && self.meeting_join_url.is_none()
            && self.meeting_password.is_none()
        {
            return false;
        }
        self.clear_meeting_fields();
        self.touch(now);
        true
    }

    fn clear_meeting_fields(&mut self) {
        self.meeting_id = None;
        self.meeting_join_url = None;
        self.meeting_password = None;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// The mutating action recorded by a change-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonAction {
    /// Student submitted the request.
    Requested,
    /// Staff committed to an option and tutor.
    Scheduled,
    /// Student asked to move the lesson.
    RescheduleRequested,
    /// The lesson was cancelled.
    Cancelled,
    /// Staff rejected the request.
    Rejected,
    /// Staff marked a no-show.
    NoShow,
    /// A meeting resource was attached.
    MeetingProvisioned,
    /// Meeting fields were cleared.
    MeetingCleared,
    /// The provider reported the session started.
    SessionStarted,
    /// The provider reported the session ended.
    SessionEnded,
    /// Attendance was recorded from a participant event.
    AttendanceRecorded,
}

impl LessonAction {
    /// Stable string form used in storage and the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Scheduled => "scheduled",
            Self::RescheduleRequested => "reschedule_requested",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::NoShow => "no_show",
            Self::MeetingProvisioned => "meeting_provisioned",
            Self::MeetingCleared => "meeting_cleared",
            Self::SessionStarted => "session_started",
            Self::SessionEnded => "session_ended",
            Self::AttendanceRecorded => "attendance_recorded",
        }
    }
}

/// One append-only audit row per mutating action on a lesson.
///
/// Makes the state machine's history reconstructable independent of the
/// mutable lesson row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonChangeLogEntry {
    /// The row id.
    pub id: Uuid,

    /// The lesson this row belongs to.
    pub lesson_id: LessonId,

    /// What happened.
    pub action: LessonAction,

    /// Free-form note.
    pub note: Option<String>,

    /// Committed start before the action.
    pub old_start: Option<DateTime<Utc>>,

    /// Committed end before the action.
    pub old_end: Option<DateTime<Utc>>,

    /// Committed start after the action.
    pub new_start: Option<DateTime<Utc>>,

    /// Committed end after the action.
    pub new_end: Option<DateTime<Utc>>,

    /// Acting user; `None` for webhook-driven actions.
    pub actor: Option<UserId>,

    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl LessonChangeLogEntry {
    /// Create a change-log row for an action.
    #[must_use]
    pub fn new(
        lesson_id: LessonId,
        action: LessonAction,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lesson_id,
            action,
            note: None,
            old_start: None,
            old_end: None,
            new_start: None,
            new_end: None,
            actor,
            created_at: now,
        }
    }

    /// Attach a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Record the schedule before and after the action.
    #[must_use]
    pub const fn with_times(
        mut self,
        old_start: Option<DateTime<Utc>>,
        old_end: Option<DateTime<Utc>>,
        new_start: Option<DateTime<Utc>>,
        new_end: Option<DateTime<Utc>>,
    ) -> Self {
        self.old_start = old_start;
        self.old_end = old_end;
        self.new_start = new_start;
        self.new_end = new_end;
        self
    }
}
