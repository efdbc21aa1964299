//! Booking confirmation: the only code path that moves an entry to
//! `booked`, and the only place `booked_lesson_id` is ever set.
//!
//! At most one confirmation succeeds per entry, however many operators
//! race. The loser gets `Conflict` and must re-fetch; a second confirm
//! after success is also `Conflict` (explicit-failure idempotence, so no
//! caller can silently assume success twice).

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::entry::WaitlistEntry;
use crate::error::{EngineError, Result};
use crate::store::WaitlistStore;

/// The concrete lesson an accepted entry books into; either a freshly
/// created lesson or a freed slot that was re-opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingTarget {
    pub lesson_id: String,
}

impl BookingTarget {
    pub fn new(lesson_id: impl Into<String>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
        }
    }
}

/// Collaborators touched only from inside the confirmation transaction.
/// Implementations share its transactional scope: the store invokes these
/// before the status flip and commits nothing on failure.
pub trait BookingHooks {
    /// Attach the student as a participant on the target lesson.
    fn attach_participant(&self, lesson_id: &str, student_id: &str) -> Result<()>;

    /// Mark a make-up credit redeemed.
    fn redeem_credit(&self, credit_id: &str) -> Result<()>;

    /// Record the originating attendance/absence link.
    fn link_attendance(&self, attendance_id: &str, lesson_id: &str) -> Result<()>;
}

/// Convert an accepted entry into a permanent booking.
pub fn confirm_booking(
    store: &dyn WaitlistStore,
    entry_id: &str,
    target: &BookingTarget,
    hooks: &dyn BookingHooks,
    now: DateTime<Utc>,
) -> Result<WaitlistEntry> {
    let booked = store.confirm_booking(entry_id, target, hooks, now)?;
    info!(entry = %entry_id, lesson = %target.lesson_id, "booking confirmed");
    Ok(booked)
}

/// In-memory ledger for tests and fixture runs. Records every hook call so
/// tests can assert on exactly what the transaction wrote.
#[derive(Debug, Default)]
pub struct MemoryBookingLedger {
    state: Mutex<LedgerState>,
    /// When set, `attach_participant` fails; simulates a collaborator
    /// refusing the write mid-transaction.
    pub fail_attach: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    participants: Vec<(String, String)>,
    redeemed_credits: Vec<String>,
    attendance_links: Vec<(String, String)>,
}

impl MemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_attach() -> Self {
        Self {
            fail_attach: true,
            ..Self::default()
        }
    }

    pub fn participants(&self) -> Vec<(String, String)> {
        self.state.lock().expect("ledger lock poisoned").participants.clone()
    }

    pub fn redeemed_credits(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("ledger lock poisoned")
            .redeemed_credits
            .clone()
    }

    pub fn attendance_links(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .expect("ledger lock poisoned")
            .attendance_links
            .clone()
    }
}

impl BookingHooks for MemoryBookingLedger {
    fn attach_participant(&self, lesson_id: &str, student_id: &str) -> Result<()> {
        if self.fail_attach {
            return Err(EngineError::conflict("participant write refused"));
        }
        self.state
            .lock()
            .expect("ledger lock poisoned")
            .participants
            .push((lesson_id.to_string(), student_id.to_string()));
        Ok(())
    }

    fn redeem_credit(&self, credit_id: &str) -> Result<()> {
        self.state
            .lock()
            .expect("ledger lock poisoned")
            .redeemed_credits
            .push(credit_id.to_string());
        Ok(())
    }

    fn link_attendance(&self, attendance_id: &str, lesson_id: &str) -> Result<()> {
        self.state
            .lock()
            .expect("ledger lock poisoned")
            .attendance_links
            .push((attendance_id.to_string(), lesson_id.to_string()));
        Ok(())
    }
}
