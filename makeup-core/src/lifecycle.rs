//! Waitlist lifecycle: every legal transition, guarded against stale reads.
//!
//! waiting → matched → offered → accepted → booked, with dismiss/decline
//! returning to waiting and expiry/cancellation closing any non-terminal
//! entry. Each function re-reads the persisted entry, guards on its current
//! status, and commits through the store's conditional update, so a
//! transition against a stale in-memory status is rejected rather than
//! silently overwriting someone else's work.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use tracing::info;
use uuid::Uuid;

use crate::entry::{AbsenceReason, MissedLesson, WaitlistEntry, WaitlistStatus};
use crate::error::{EngineError, Result};
use crate::store::WaitlistStore;

/// Sends the offer communication to a guardian. Fire-and-forget; delivery
/// retries are the dispatcher's problem, not the engine's.
pub trait NotificationDispatcher {
    fn dispatch_offer(&self, entry: &WaitlistEntry);
}

/// Optional knobs captured at create time.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub preferred_teacher_id: Option<String>,
    pub preferred_days: Vec<Weekday>,
    pub earliest_time: Option<NaiveTime>,
    pub latest_time: Option<NaiveTime>,
    pub expires_at: Option<DateTime<Utc>>,
    pub guardian_id: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_email: Option<String>,
    pub credit_id: Option<String>,
    pub attendance_id: Option<String>,
    pub notes: Option<String>,
}

const FROM_WAITING: &[WaitlistStatus] = &[WaitlistStatus::Waiting];
const FROM_MATCHED_OR_OFFERED: &[WaitlistStatus] =
    &[WaitlistStatus::Matched, WaitlistStatus::Offered];
const FROM_OFFERED: &[WaitlistStatus] = &[WaitlistStatus::Offered];
const FROM_EXPIRABLE: &[WaitlistStatus] = &[
    WaitlistStatus::Waiting,
    WaitlistStatus::Matched,
    WaitlistStatus::Offered,
];
const FROM_OPEN: &[WaitlistStatus] = &[
    WaitlistStatus::Waiting,
    WaitlistStatus::Matched,
    WaitlistStatus::Offered,
    WaitlistStatus::Accepted,
];

fn guard(entry: &WaitlistEntry, expected: &'static [WaitlistStatus]) -> Result<()> {
    if expected.contains(&entry.status) {
        Ok(())
    } else {
        Err(EngineError::State {
            expected,
            actual: entry.status,
        })
    }
}

/// Open a waitlist entry for a missed lesson.
///
/// Idempotent: if an open entry already exists for this student + lesson
/// pair, it is returned as-is instead of duplicating. The student must
/// actually belong to the missed lesson.
pub fn create_entry(
    store: &dyn WaitlistStore,
    lesson: &MissedLesson,
    student_id: &str,
    reason: AbsenceReason,
    options: EntryOptions,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    if lesson.student_id != student_id {
        return Err(EngineError::validation(format!(
            "lesson {} does not belong to student {student_id}",
            lesson.lesson_id
        )));
    }
    if lesson.duration_minutes <= 0 {
        return Err(EngineError::validation(
            "missed lesson duration must be positive",
        ));
    }

    if let Some(existing) = store.find_open(student_id, &lesson.lesson_id) {
        info!(entry = %existing.id, "create re-issued, returning open entry");
        return Ok(existing);
    }

    let mut entry = WaitlistEntry::new(format!("wl-{}", Uuid::new_v4()), lesson, reason, now);
    entry.preferred_teacher_id = options.preferred_teacher_id;
    entry.preferred_days = options.preferred_days;
    entry.earliest_time = options.earliest_time;
    entry.latest_time = options.latest_time;
    entry.expires_at = options.expires_at;
    entry.guardian_id = options.guardian_id;
    entry.guardian_name = options.guardian_name;
    entry.guardian_email = options.guardian_email;
    entry.credit_id = options.credit_id;
    entry.attendance_id = options.attendance_id;
    entry.notes = options.notes;

    let entry = store.insert(entry)?;
    info!(entry = %entry.id, student = %student_id, "waitlist entry created");
    Ok(entry)
}

/// waiting → matched. Records the candidate lesson the operator picked.
pub fn mark_matched(
    store: &dyn WaitlistStore,
    entry_id: &str,
    matched_lesson_id: &str,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let entry = store.get(entry_id)?;
    guard(&entry, FROM_WAITING)?;

    let mut updated = entry;
    updated.status = WaitlistStatus::Matched;
    updated.matched_lesson_id = Some(matched_lesson_id.to_string());
    updated.matched_at = Some(now);
    updated.updated_at = now;
    let updated = store.update_where_status(entry_id, WaitlistStatus::Waiting, updated)?;
    info!(entry = %entry_id, lesson = %matched_lesson_id, "entry matched");
    Ok(updated)
}

/// matched|offered → waiting. The operator's "this match is wrong" action;
/// returns the entry to the open pool without destroying it.
pub fn dismiss_match(
    store: &dyn WaitlistStore,
    entry_id: &str,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let entry = store.get(entry_id)?;
    guard(&entry, FROM_MATCHED_OR_OFFERED)?;

    let previous = entry.status;
    let mut updated = entry;
    updated.status = WaitlistStatus::Waiting;
    updated.matched_lesson_id = None;
    updated.matched_at = None;
    updated.offered_at = None;
    updated.updated_at = now;
    let updated = store.update_where_status(entry_id, previous, updated)?;
    info!(entry = %entry_id, "match dismissed, entry back in pool");
    Ok(updated)
}

/// matched → offered, dispatching the offer notification. Calling again
/// from `offered` is a resend: the notification goes out again but
/// `offered_at` keeps its original value.
///
/// The state write commits before dispatch: a half-sent notification is
/// acceptable, a half-applied transition is not.
pub fn offer(
    store: &dyn WaitlistStore,
    dispatcher: &dyn NotificationDispatcher,
    entry_id: &str,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let entry = store.get(entry_id)?;
    guard(&entry, FROM_MATCHED_OR_OFFERED)?;

    let updated = if entry.status == WaitlistStatus::Matched {
        let mut updated = entry;
        updated.status = WaitlistStatus::Offered;
        updated.offered_at = Some(now);
        updated.updated_at = now;
        store.update_where_status(entry_id, WaitlistStatus::Matched, updated)?
    } else {
        entry
    };

    dispatcher.dispatch_offer(&updated);
    info!(entry = %entry_id, "offer dispatched");
    Ok(updated)
}

/// offered → accepted, or offered → waiting on decline. A decline keeps
/// `responded_at` so the history shows the guardian answered.
pub fn record_response(
    store: &dyn WaitlistStore,
    entry_id: &str,
    accepted: bool,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let entry = store.get(entry_id)?;
    guard(&entry, FROM_OFFERED)?;

    let mut updated = entry;
    updated.responded_at = Some(now);
    updated.updated_at = now;
    if accepted {
        updated.status = WaitlistStatus::Accepted;
    } else {
        updated.status = WaitlistStatus::Waiting;
        updated.matched_lesson_id = None;
        updated.matched_at = None;
        updated.offered_at = None;
    }
    let updated = store.update_where_status(entry_id, WaitlistStatus::Offered, updated)?;
    info!(entry = %entry_id, accepted, "offer response recorded");
    Ok(updated)
}

/// waiting|matched|offered → expired. Driven by the sweep, not operators.
pub fn expire(
    store: &dyn WaitlistStore,
    entry_id: &str,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let entry = store.get(entry_id)?;
    guard(&entry, FROM_EXPIRABLE)?;

    let previous = entry.status;
    let mut updated = entry;
    updated.status = WaitlistStatus::Expired;
    updated.matched_lesson_id = None;
    updated.matched_at = None;
    updated.offered_at = None;
    updated.updated_at = now;
    let updated = store.update_where_status(entry_id, previous, updated)?;
    info!(entry = %entry_id, "entry expired");
    Ok(updated)
}

/// Background sweep: expire every open entry whose deadline has passed.
/// An entry that moves under the sweep (lost conditional update) is simply
/// skipped; another operator got there first.
pub fn sweep_expired(
    store: &dyn WaitlistStore,
    org_id: &str,
    now: DateTime<Utc>,
) -> Vec<WaitlistEntry> {
    let due: Vec<WaitlistEntry> = store
        .query(&crate::store::WaitlistFilter {
            org_id: Some(org_id.to_string()),
            ..Default::default()
        })
        .into_iter()
        .filter(|e| e.is_due_to_expire(now))
        .collect();

    let mut expired = Vec::new();
    for e in due {
        match expire(store, &e.id, now) {
            Ok(updated) => expired.push(updated),
            Err(EngineError::Conflict { .. }) | Err(EngineError::State { .. }) => continue,
            Err(_) => continue,
        }
    }
    expired
}

/// Any non-terminal state → cancelled. Explicit operator or guardian
/// withdrawal; terminal itself.
pub fn cancel(
    store: &dyn WaitlistStore,
    entry_id: &str,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let entry = store.get(entry_id)?;
    guard(&entry, FROM_OPEN)?;

    let previous = entry.status;
    let mut updated = entry;
    updated.status = WaitlistStatus::Cancelled;
    // Cancelled entries carry no match; only booked ones keep a lesson link.
    updated.matched_lesson_id = None;
    updated.matched_at = None;
    updated.offered_at = None;
    updated.updated_at = now;
    let updated = store.update_where_status(entry_id, previous, updated)?;
    info!(entry = %entry_id, "entry cancelled");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryWaitlistStore;
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::sync::Mutex;

    fn lesson() -> MissedLesson {
        MissedLesson {
            lesson_id: "les-1".into(),
            org_id: "org-1".into(),
            student_id: "stu-1".into(),
            student_name: "Mia Park".into(),
            title: "Piano 30".into(),
            date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0),
            duration_minutes: 30,
            teacher_id: Some("tea-1".into()),
            location_id: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct CountingDispatcher {
        sent: Mutex<Vec<String>>,
    }

    impl CountingDispatcher {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl NotificationDispatcher for CountingDispatcher {
        fn dispatch_offer(&self, entry: &WaitlistEntry) {
            self.sent.lock().unwrap().push(entry.id.clone());
        }
    }

    fn created(store: &MemoryWaitlistStore) -> WaitlistEntry {
        create_entry(
            store,
            &lesson(),
            "stu-1",
            AbsenceReason::Illness,
            EntryOptions::default(),
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_is_idempotent_for_open_pair() {
        let store = MemoryWaitlistStore::new();
        let first = created(&store);
        let second = created(&store);
        assert_eq!(first.id, second.id);
        assert_eq!(store.query(&Default::default()).len(), 1);
    }

    #[test]
    fn test_create_rejects_wrong_student() {
        let store = MemoryWaitlistStore::new();
        let err = create_entry(
            &store,
            &lesson(),
            "stu-other",
            AbsenceReason::Illness,
            EntryOptions::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_create_allows_new_entry_after_terminal() {
        let store = MemoryWaitlistStore::new();
        let first = created(&store);
        cancel(&store, &first.id, now()).unwrap();
        let second = created(&store);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_full_happy_path() {
        let store = MemoryWaitlistStore::new();
        let dispatcher = CountingDispatcher::default();
        let e = created(&store);

        let e = mark_matched(&store, &e.id, "les-new", now()).unwrap();
        assert_eq!(e.status, WaitlistStatus::Matched);
        assert_eq!(e.matched_lesson_id.as_deref(), Some("les-new"));

        let e = offer(&store, &dispatcher, &e.id, now()).unwrap();
        assert_eq!(e.status, WaitlistStatus::Offered);
        assert_eq!(dispatcher.count(), 1);

        let e = record_response(&store, &e.id, true, now()).unwrap();
        assert_eq!(e.status, WaitlistStatus::Accepted);
        assert!(e.responded_at.is_some());
    }

    #[test]
    fn test_mark_matched_requires_waiting() {
        let store = MemoryWaitlistStore::new();
        let e = created(&store);
        mark_matched(&store, &e.id, "les-new", now()).unwrap();

        let err = mark_matched(&store, &e.id, "les-other", now()).unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
        // Entry unchanged by the failed attempt.
        let current = store.get(&e.id).unwrap();
        assert_eq!(current.matched_lesson_id.as_deref(), Some("les-new"));
    }

    #[test]
    fn test_dismiss_returns_entry_to_pool() {
        let store = MemoryWaitlistStore::new();
        let e = created(&store);
        mark_matched(&store, &e.id, "les-new", now()).unwrap();

        let e = dismiss_match(&store, &e.id, now()).unwrap();
        assert_eq!(e.status, WaitlistStatus::Waiting);
        assert!(e.matched_lesson_id.is_none());
        assert!(e.matched_at.is_none());

        // Immediately matchable again.
        let e = mark_matched(&store, &e.id, "les-other", now()).unwrap();
        assert_eq!(e.matched_lesson_id.as_deref(), Some("les-other"));
    }

    #[test]
    fn test_reoffer_dispatches_again_without_touching_offered_at() {
        let store = MemoryWaitlistStore::new();
        let dispatcher = CountingDispatcher::default();
        let e = created(&store);
        mark_matched(&store, &e.id, "les-new", now()).unwrap();

        let first = offer(&store, &dispatcher, &e.id, now()).unwrap();
        let later = now() + Duration::hours(2);
        let second = offer(&store, &dispatcher, &e.id, later).unwrap();

        assert_eq!(dispatcher.count(), 2);
        assert_eq!(first.offered_at, second.offered_at);
        assert_eq!(second.offered_at, Some(now()));
    }

    #[test]
    fn test_offer_requires_matched_or_offered() {
        let store = MemoryWaitlistStore::new();
        let dispatcher = CountingDispatcher::default();
        let e = created(&store);
        let err = offer(&store, &dispatcher, &e.id, now()).unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
        assert_eq!(dispatcher.count(), 0);
    }

    #[test]
    fn test_decline_returns_to_waiting_with_history() {
        let store = MemoryWaitlistStore::new();
        let dispatcher = CountingDispatcher::default();
        let e = created(&store);
        mark_matched(&store, &e.id, "les-new", now()).unwrap();
        offer(&store, &dispatcher, &e.id, now()).unwrap();

        let e = record_response(&store, &e.id, false, now()).unwrap();
        assert_eq!(e.status, WaitlistStatus::Waiting);
        assert!(e.matched_lesson_id.is_none());
        assert!(e.responded_at.is_some());
    }

    #[test]
    fn test_sweep_expires_only_due_open_entries() {
        let store = MemoryWaitlistStore::new();
        let deadline = now() + Duration::days(7);

        let due = create_entry(
            &store,
            &lesson(),
            "stu-1",
            AbsenceReason::Illness,
            EntryOptions {
                expires_at: Some(deadline),
                ..Default::default()
            },
            now(),
        )
        .unwrap();

        let mut other = lesson();
        other.lesson_id = "les-2".into();
        other.student_id = "stu-2".into();
        let fresh = create_entry(
            &store,
            &other,
            "stu-2",
            AbsenceReason::NoShow,
            EntryOptions::default(),
            now(),
        )
        .unwrap();

        let expired = sweep_expired(&store, "org-1", deadline + Duration::hours(1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, due.id);
        assert_eq!(store.get(&due.id).unwrap().status, WaitlistStatus::Expired);
        assert_eq!(store.get(&fresh.id).unwrap().status, WaitlistStatus::Waiting);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let store = MemoryWaitlistStore::new();
        let e = created(&store);
        cancel(&store, &e.id, now()).unwrap();

        let err = cancel(&store, &e.id, now()).unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
        let err = mark_matched(&store, &e.id, "les-new", now()).unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
    }

    #[test]
    fn test_cancel_from_matched_clears_match_fields() {
        let store = MemoryWaitlistStore::new();
        let e = created(&store);
        mark_matched(&store, &e.id, "les-new", now()).unwrap();

        let e = cancel(&store, &e.id, now()).unwrap();
        assert_eq!(e.status, WaitlistStatus::Cancelled);
        assert!(e.matched_lesson_id.is_none());
        assert!(e.matched_at.is_none());
    }

    #[test]
    fn test_expire_not_allowed_from_accepted() {
        let store = MemoryWaitlistStore::new();
        let dispatcher = CountingDispatcher::default();
        let e = created(&store);
        mark_matched(&store, &e.id, "les-new", now()).unwrap();
        offer(&store, &dispatcher, &e.id, now()).unwrap();
        record_response(&store, &e.id, true, now()).unwrap();

        let err = expire(&store, &e.id, now()).unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
    }
}
