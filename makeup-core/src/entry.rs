//! Waitlist entry model: one student waiting for a replacement lesson.
//!
//! Entries are append-mostly audit records. Cancellation and expiry are
//! terminal *statuses*, never row removals, so the history of who waited
//! and what happened to them survives.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Why the original lesson was missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceReason {
    Illness,
    Emergency,
    NoShow,
    TeacherCancelled,
    Other,
}

/// Lifecycle status. `Booked` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Waiting,
    Matched,
    Offered,
    Accepted,
    Booked,
    Expired,
    Cancelled,
}

impl WaitlistStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Booked | Self::Cancelled | Self::Expired)
    }

    /// Open entries are the ones still eligible to progress toward a booking.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Whether this status is allowed to carry a `matched_lesson_id`.
    pub fn carries_match(self) -> bool {
        matches!(self, Self::Matched | Self::Offered | Self::Accepted | Self::Booked)
    }

    pub fn all() -> [WaitlistStatus; 7] {
        [
            Self::Waiting,
            Self::Matched,
            Self::Offered,
            Self::Accepted,
            Self::Booked,
            Self::Expired,
            Self::Cancelled,
        ]
    }
}

impl std::fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Matched => "matched",
            Self::Offered => "offered",
            Self::Accepted => "accepted",
            Self::Booked => "booked",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        f.pad(s)
    }
}

/// The missed lesson a waitlist entry is created from. This is the fact
/// record the caller holds; create validates the student actually belongs
/// to it before opening an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedLesson {
    pub lesson_id: String,
    pub org_id: String,
    pub student_id: String,
    pub student_name: String,
    pub title: String,
    pub date: NaiveDate,
    /// Org-local wall time the lesson started at, when known.
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: i32,
    pub teacher_id: Option<String>,
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: String,
    pub org_id: String,
    pub student_id: String,
    pub student_name: String,

    pub missed_lesson_id: String,
    pub missed_lesson_title: String,
    pub missed_lesson_date: NaiveDate,
    /// Org-local time-of-day of the missed lesson; drives the preferred-slot
    /// flag and the same-time match tiers.
    pub missed_lesson_start: Option<NaiveTime>,
    /// Who taught the missed lesson. A ranking fact, not a constraint.
    pub missed_teacher_id: Option<String>,
    pub lesson_duration_minutes: i32,
    pub reason: AbsenceReason,

    /// Hard constraint: only consider this teacher's slots when set.
    pub preferred_teacher_id: Option<String>,
    pub location_id: Option<String>,
    pub guardian_id: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_email: Option<String>,

    pub preferred_days: Vec<Weekday>,
    pub earliest_time: Option<NaiveTime>,
    pub latest_time: Option<NaiveTime>,

    pub status: WaitlistStatus,
    pub matched_lesson_id: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
    pub offered_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Set exactly once, by booking confirmation. Immutable afterwards.
    pub booked_lesson_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,

    /// Make-up credit to redeem inside the booking confirmation, if any.
    pub credit_id: Option<String>,
    /// Attendance/absence record that produced this entry, if tracked.
    pub attendance_id: Option<String>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn new(
        id: impl Into<String>,
        lesson: &MissedLesson,
        reason: AbsenceReason,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            org_id: lesson.org_id.clone(),
            student_id: lesson.student_id.clone(),
            student_name: lesson.student_name.clone(),
            missed_lesson_id: lesson.lesson_id.clone(),
            missed_lesson_title: lesson.title.clone(),
            missed_lesson_date: lesson.date,
            missed_lesson_start: lesson.start_time,
            missed_teacher_id: lesson.teacher_id.clone(),
            lesson_duration_minutes: lesson.duration_minutes,
            reason,
            preferred_teacher_id: None,
            location_id: lesson.location_id.clone(),
            guardian_id: None,
            guardian_name: None,
            guardian_email: None,
            preferred_days: Vec::new(),
            earliest_time: None,
            latest_time: None,
            status: WaitlistStatus::Waiting,
            matched_lesson_id: None,
            matched_at: None,
            offered_at: None,
            responded_at: None,
            booked_lesson_id: None,
            expires_at: None,
            credit_id: None,
            attendance_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_preferred_teacher(mut self, teacher_id: impl Into<String>) -> Self {
        self.preferred_teacher_id = Some(teacher_id.into());
        self
    }

    pub fn with_guardian(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.guardian_id = Some(id.into());
        self.guardian_name = Some(name.into());
        self.guardian_email = Some(email.into());
        self
    }

    pub fn with_preferred_days(mut self, days: Vec<Weekday>) -> Self {
        self.preferred_days = days;
        self
    }

    pub fn with_time_window(mut self, earliest: NaiveTime, latest: NaiveTime) -> Self {
        self.earliest_time = Some(earliest);
        self.latest_time = Some(latest);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_credit(mut self, credit_id: impl Into<String>) -> Self {
        self.credit_id = Some(credit_id.into());
        self
    }

    pub fn with_attendance(mut self, attendance_id: impl Into<String>) -> Self {
        self.attendance_id = Some(attendance_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Deadline check for the expiry sweep.
    pub fn is_due_to_expire(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open()
            && self.status != WaitlistStatus::Accepted
            && self.expires_at.is_some_and(|at| at <= now)
    }
}
