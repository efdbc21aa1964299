//! makeup-core: waitlist and slot-matching engine for make-up lessons

pub mod booking;
pub mod calendar;
pub mod entry;
pub mod error;
pub mod lifecycle;
pub mod matching;
pub mod slots;
pub mod store;
pub mod time;

pub use booking::{BookingHooks, BookingTarget, MemoryBookingLedger, confirm_booking};
pub use calendar::{AvailabilityBlock, BookedInterval, CalendarFacts, StaticCalendar};
pub use entry::{AbsenceReason, MissedLesson, WaitlistEntry, WaitlistStatus};
pub use error::{EngineError, Result};
pub use lifecycle::{
    EntryOptions, NotificationDispatcher, cancel, create_entry, dismiss_match, expire,
    mark_matched, offer, record_response, sweep_expired,
};
pub use matching::{FreedLesson, MatchQuality, MatchResult, SlotMatch, find_matches, find_slot_matches};
pub use slots::{CandidateSlot, SlotQuery, generate_slots, generate_slots_from};
pub use store::{MemoryWaitlistStore, WaitlistFilter, WaitlistStore};
pub use time::{local_date, local_time_of_day, local_to_utc, parse_timezone};
