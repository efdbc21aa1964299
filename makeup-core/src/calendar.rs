//! Calendar fact source: the read-only view of teacher availability,
//! closures, and existing bookings that slot generation runs against.
//!
//! Real deployments back this with the scheduling database; tests and the
//! CLI use `StaticCalendar`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A recurring weekly open window for a teacher.
///
/// Blocks arrive unsorted and may overlap; consumers must not assume
/// anything beyond "this weekday, these wall times".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub teacher_id: String,
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// An existing commitment on a teacher's calendar, used purely for
/// conflict exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedInterval {
    pub lesson_id: String,
    pub teacher_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookedInterval {
    /// Half-open overlap test against [start, end).
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

/// Queryable external collaborator. The engine only reads from it.
pub trait CalendarFacts {
    fn availability_blocks(&self, teacher_id: &str) -> Vec<AvailabilityBlock>;

    fn booked_intervals(
        &self,
        teacher_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Vec<BookedInterval>;

    /// Org-wide dates on which no slots may be generated.
    fn closure_dates(&self) -> Vec<NaiveDate>;
}

/// In-memory fact source for tests and fixture-driven runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCalendar {
    pub blocks: Vec<AvailabilityBlock>,
    pub bookings: Vec<BookedInterval>,
    pub closures: Vec<NaiveDate>,
}

impl CalendarFacts for StaticCalendar {
    fn availability_blocks(&self, teacher_id: &str) -> Vec<AvailabilityBlock> {
        self.blocks
            .iter()
            .filter(|b| b.teacher_id == teacher_id)
            .cloned()
            .collect()
    }

    fn booked_intervals(
        &self,
        teacher_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Vec<BookedInterval> {
        self.bookings
            .iter()
            .filter(|b| b.teacher_id == teacher_id)
            .filter(|b| b.start < range_end && b.end > range_start)
            .cloned()
            .collect()
    }

    fn closure_dates(&self) -> Vec<NaiveDate> {
        self.closures.clone()
    }
}
