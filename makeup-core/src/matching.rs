//! Match finder: ranks waiting entries against a freed lesson or a set of
//! generated candidate slots.
//!
//! Proposal only. Nothing here mutates the waitlist; committing a proposal
//! goes through the lifecycle transitions, which re-check state against the
//! store. Results are plain computed values, recomputed on every query.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::entry::{WaitlistEntry, WaitlistStatus};
use crate::slots::CandidateSlot;
use crate::time::local_time_of_day;

/// Quality tiers, best first. Variant order is the ranking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    /// Same teacher as the missed lesson, and the time fits the entry's
    /// stated window or reproduces the original wall time.
    ExactTeacherAndTime,
    SameTeacher,
    SameTimeDifferentTeacher,
    /// Meets the duration and teacher constraints, nothing more.
    AnyAvailable,
}

/// A lesson slot that just opened up, e.g. through a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreedLesson {
    pub lesson_id: String,
    pub teacher_id: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: i32,
}

/// One ranked proposal. Display fields are denormalised from the entry so
/// operator screens need no extra lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub entry_id: String,
    pub quality: MatchQuality,
    pub student_id: String,
    pub student_name: String,
    pub guardian_name: Option<String>,
    pub guardian_email: Option<String>,
    pub missed_lesson_title: String,
    pub missed_lesson_date: NaiveDate,
    pub waiting_since: DateTime<Utc>,
}

/// Matches for one candidate slot out of a generated set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMatch {
    pub slot: CandidateSlot,
    pub matches: Vec<MatchResult>,
}

/// Rank the waiting pool against a specific freed lesson, best match first.
/// Ties within a tier go to the longest-waiting entry.
pub fn find_matches(lesson: &FreedLesson, pool: &[WaitlistEntry], tz: Tz) -> Vec<MatchResult> {
    let mut out: Vec<MatchResult> = pool
        .iter()
        .filter_map(|e| {
            grade(&lesson.teacher_id, lesson.start, lesson.duration_minutes, e, tz)
                .map(|q| to_result(e, q))
        })
        .collect();
    out.sort_by(|a, b| {
        a.quality
            .cmp(&b.quality)
            .then_with(|| a.waiting_since.cmp(&b.waiting_since))
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });
    out
}

/// Rank the waiting pool against each slot of a generated candidate set.
pub fn find_slot_matches(
    slots: &[CandidateSlot],
    pool: &[WaitlistEntry],
    tz: Tz,
) -> Vec<SlotMatch> {
    slots
        .iter()
        .map(|slot| {
            let duration = ((slot.end - slot.start).num_minutes()) as i32;
            let freed = FreedLesson {
                lesson_id: String::new(),
                teacher_id: slot.teacher_id.clone(),
                start: slot.start,
                duration_minutes: duration,
            };
            SlotMatch {
                slot: slot.clone(),
                matches: find_matches(&freed, pool, tz),
            }
        })
        .collect()
}

/// Eligibility + tier for one entry, `None` when ineligible.
fn grade(
    teacher_id: &str,
    start: DateTime<Utc>,
    duration_minutes: i32,
    entry: &WaitlistEntry,
    tz: Tz,
) -> Option<MatchQuality> {
    if entry.status != WaitlistStatus::Waiting {
        return None;
    }
    // Exact duration fit; no partial-fit bookings.
    if entry.lesson_duration_minutes != duration_minutes {
        return None;
    }
    if let Some(preferred) = &entry.preferred_teacher_id {
        if preferred != teacher_id {
            return None;
        }
    }

    let local = start.with_timezone(&tz);
    let wall = local_time_of_day(start, tz);
    let same_teacher = entry.missed_teacher_id.as_deref() == Some(teacher_id);
    let same_wall_time = entry.missed_lesson_start == Some(wall);

    let day_ok = entry.preferred_days.is_empty() || entry.preferred_days.contains(&local.weekday());
    let after_earliest = entry.earliest_time.is_none_or(|t| wall >= t);
    let before_latest = entry.latest_time.is_none_or(|t| wall <= t);
    let has_window =
        !entry.preferred_days.is_empty() || entry.earliest_time.is_some() || entry.latest_time.is_some();
    let in_window = has_window && day_ok && after_earliest && before_latest;

    Some(if same_teacher && (in_window || same_wall_time) {
        MatchQuality::ExactTeacherAndTime
    } else if same_teacher {
        MatchQuality::SameTeacher
    } else if same_wall_time {
        MatchQuality::SameTimeDifferentTeacher
    } else {
        MatchQuality::AnyAvailable
    })
}

fn to_result(entry: &WaitlistEntry, quality: MatchQuality) -> MatchResult {
    MatchResult {
        entry_id: entry.id.clone(),
        quality,
        student_id: entry.student_id.clone(),
        student_name: entry.student_name.clone(),
        guardian_name: entry.guardian_name.clone(),
        guardian_email: entry.guardian_email.clone(),
        missed_lesson_title: entry.missed_lesson_title.clone(),
        missed_lesson_date: entry.missed_lesson_date,
        waiting_since: entry.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AbsenceReason, MissedLesson};
    use chrono::{NaiveTime, TimeZone};

    fn tz() -> Tz {
        "Europe/Berlin".parse().unwrap()
    }

    fn entry(id: &str, teacher: Option<&str>, created_minute: u32) -> WaitlistEntry {
        let lesson = MissedLesson {
            lesson_id: format!("les-{id}"),
            org_id: "org-1".into(),
            student_id: format!("stu-{id}"),
            student_name: format!("Student {id}"),
            title: "Piano 30".into(),
            date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0),
            duration_minutes: 30,
            teacher_id: teacher.map(String::from),
            location_id: None,
        };
        let created = Utc
            .with_ymd_and_hms(2026, 2, 2, 12, created_minute, 0)
            .unwrap();
        WaitlistEntry::new(id, &lesson, AbsenceReason::Illness, created)
    }

    fn freed_at(teacher: &str, hour: u32) -> FreedLesson {
        // Local Berlin wall times, Feb (CET, UTC+1).
        FreedLesson {
            lesson_id: "les-free".into(),
            teacher_id: teacher.into(),
            start: Utc.with_ymd_and_hms(2026, 2, 9, hour - 1, 0, 0).unwrap(),
            duration_minutes: 30,
        }
    }

    #[test]
    fn test_same_teacher_same_time_is_top_tier() {
        let pool = vec![entry("a", Some("tea-1"), 0)];
        let out = find_matches(&freed_at("tea-1", 10), &pool, tz());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].quality, MatchQuality::ExactTeacherAndTime);
    }

    #[test]
    fn test_different_teacher_off_time_is_bottom_tier() {
        let pool = vec![entry("a", Some("tea-1"), 0)];
        let out = find_matches(&freed_at("tea-2", 14), &pool, tz());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].quality, MatchQuality::AnyAvailable);
    }

    #[test]
    fn test_same_teacher_off_time_and_same_time_other_teacher() {
        let pool = vec![entry("a", Some("tea-1"), 0)];
        let same_teacher = find_matches(&freed_at("tea-1", 14), &pool, tz());
        assert_eq!(same_teacher[0].quality, MatchQuality::SameTeacher);

        let same_time = find_matches(&freed_at("tea-2", 10), &pool, tz());
        assert_eq!(same_time[0].quality, MatchQuality::SameTimeDifferentTeacher);
    }

    #[test]
    fn test_preferred_window_grants_top_tier_with_same_teacher() {
        let mut e = entry("a", Some("tea-1"), 0).with_time_window(
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        );
        e.missed_lesson_start = NaiveTime::from_hms_opt(10, 0, 0);
        let out = find_matches(&freed_at("tea-1", 14), &[e], tz());
        assert_eq!(out[0].quality, MatchQuality::ExactTeacherAndTime);
    }

    #[test]
    fn test_duration_mismatch_is_ineligible() {
        let mut e = entry("a", Some("tea-1"), 0);
        e.lesson_duration_minutes = 45;
        let out = find_matches(&freed_at("tea-1", 10), &[e], tz());
        assert!(out.is_empty());
    }

    #[test]
    fn test_hard_teacher_preference_filters() {
        let e = entry("a", Some("tea-1"), 0).with_preferred_teacher("tea-1");
        let out = find_matches(&freed_at("tea-2", 10), &[e], tz());
        assert!(out.is_empty());
    }

    #[test]
    fn test_non_waiting_entries_are_skipped() {
        let mut e = entry("a", Some("tea-1"), 0);
        e.status = WaitlistStatus::Offered;
        let out = find_matches(&freed_at("tea-1", 10), &[e], tz());
        assert!(out.is_empty());
    }

    #[test]
    fn test_ties_break_by_waiting_since() {
        let pool = vec![
            entry("late", Some("tea-1"), 30),
            entry("early", Some("tea-1"), 5),
        ];
        let out = find_matches(&freed_at("tea-1", 10), &pool, tz());
        assert_eq!(out[0].entry_id, "early");
        assert_eq!(out[1].entry_id, "late");
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let pool = vec![
            entry("a", Some("tea-1"), 3),
            entry("b", Some("tea-2"), 1),
            entry("c", None, 2),
        ];
        let lesson = freed_at("tea-1", 10);
        let first = find_matches(&lesson, &pool, tz());
        let second = find_matches(&lesson, &pool, tz());
        assert_eq!(first, second);
    }

    #[test]
    fn test_slot_matches_carry_duration_through() {
        // 13:00 UTC = 14:00 Berlin, off the original 10:00 wall time.
        let slot = CandidateSlot {
            teacher_id: "tea-1".into(),
            start: Utc.with_ymd_and_hms(2026, 2, 9, 13, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 2, 9, 13, 30, 0).unwrap(),
            is_preferred: false,
        };
        let pool = vec![entry("a", Some("tea-1"), 0)];
        let out = find_slot_matches(&[slot], &pool, tz());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].matches.len(), 1);
        assert_eq!(out[0].matches[0].quality, MatchQuality::SameTeacher);
    }
}
