//! Slot availability generator: which start times are actually bookable
//! for a teacher on a given day.
//!
//! Pure and deterministic. Callers pass `now` and the org timezone in; the
//! generator never reads a clock. "Nothing available" is an empty list,
//! never an error.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::{AvailabilityBlock, BookedInterval, CalendarFacts};
use crate::time::local_to_utc;

/// Start times snap to this grid.
pub const SLOT_GRANULARITY_MINUTES: i32 = 15;

/// Orgs with no configured availability still get slots out of a default
/// working day. Deliberate policy, not a fallback-of-last-resort.
pub const DEFAULT_DAY_START: NaiveTime = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
pub const DEFAULT_DAY_END: NaiveTime = NaiveTime::from_hms_opt(18, 0, 0).unwrap();

/// A computed, not-yet-booked open window. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub teacher_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True when this slot reproduces the missed lesson's wall time.
    pub is_preferred: bool,
}

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub teacher_id: String,
    pub date: NaiveDate,
    pub duration_minutes: i32,
    /// Wall time of the original missed lesson, if known; marks matching
    /// candidates as preferred.
    pub preferred_time: Option<NaiveTime>,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

/// Generate the ordered bookable start times for one teacher-day.
pub fn generate_slots(
    query: &SlotQuery,
    blocks: &[AvailabilityBlock],
    booked: &[BookedInterval],
    closures: &[NaiveDate],
) -> Vec<CandidateSlot> {
    if query.duration_minutes <= 0 {
        return Vec::new();
    }
    if closures.contains(&query.date) {
        return Vec::new();
    }

    let weekday = query.date.weekday();
    let mut day_blocks: Vec<(NaiveTime, NaiveTime)> = blocks
        .iter()
        .filter(|b| b.teacher_id == query.teacher_id && b.weekday == weekday)
        .map(|b| (b.start, b.end))
        .collect();
    if day_blocks.is_empty() {
        day_blocks.push((DEFAULT_DAY_START, DEFAULT_DAY_END));
    }

    let conflicts: Vec<&BookedInterval> = booked
        .iter()
        .filter(|b| b.teacher_id == query.teacher_id)
        .collect();

    // Consecutive starts are one lesson apart, snapped up to the grid.
    let step = round_up_to_granularity(query.duration_minutes);

    let mut out: Vec<CandidateSlot> = Vec::new();
    for (block_start, block_end) in day_blocks {
        walk_block(query, block_start, block_end, step, &conflicts, &mut out);
    }

    // Blocks arrive unsorted and may overlap; order the merged list and drop
    // duplicate starts, first generating block wins.
    out.sort_by_key(|s| s.start);
    out.dedup_by_key(|s| s.start);
    out
}

/// Trait-backed convenience over `generate_slots`, pulling facts from a
/// calendar source for the local day around `query.date`.
pub fn generate_slots_from(calendar: &dyn CalendarFacts, query: &SlotQuery) -> Vec<CandidateSlot> {
    let blocks = calendar.availability_blocks(&query.teacher_id);
    let day_start = local_to_utc(query.date, NaiveTime::MIN, query.timezone)
        .unwrap_or_else(|| query.date.and_time(NaiveTime::MIN).and_utc());
    let booked = calendar.booked_intervals(
        &query.teacher_id,
        day_start - Duration::hours(12),
        day_start + Duration::hours(36),
    );
    let closures = calendar.closure_dates();
    generate_slots(query, &blocks, &booked, &closures)
}

fn walk_block(
    query: &SlotQuery,
    block_start: NaiveTime,
    block_end: NaiveTime,
    step: i32,
    conflicts: &[&BookedInterval],
    out: &mut Vec<CandidateSlot>,
) {
    let start_min = minutes_from_midnight(block_start);
    let end_min = minutes_from_midnight(block_end);
    // Zero-length or inverted blocks yield nothing.
    if end_min <= start_min {
        return;
    }

    let mut m = start_min;
    // Inclusive of blockEnd - duration.
    while m + query.duration_minutes <= end_min {
        if let Some(local) = NaiveTime::from_hms_opt((m / 60) as u32, (m % 60) as u32, 0) {
            // Local times inside a DST gap do not exist; skip them.
            if let Some(start) = local_to_utc(query.date, local, query.timezone) {
                let end = start + Duration::minutes(query.duration_minutes as i64);
                let past = start < query.now;
                let conflicted = conflicts.iter().any(|b| b.overlaps(start, end));
                if !past && !conflicted {
                    out.push(CandidateSlot {
                        teacher_id: query.teacher_id.clone(),
                        start,
                        end,
                        is_preferred: query.preferred_time == Some(local),
                    });
                }
            }
        }
        m += step;
    }
}

fn round_up_to_granularity(minutes: i32) -> i32 {
    let g = SLOT_GRANULARITY_MINUTES;
    ((minutes + g - 1) / g) * g
}

fn minutes_from_midnight(t: NaiveTime) -> i32 {
    (t.num_seconds_from_midnight() / 60) as i32
}
