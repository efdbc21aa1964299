//! Waitlist store: the durable collection of entries.
//!
//! Concurrency discipline: there is no shared in-memory cache of status.
//! Every transition re-reads the persisted entry and commits through
//! `update_where_status`, a conditional update that rejects when the
//! persisted status no longer matches what the caller saw. A SQL-backed
//! implementation would express the same thing as `WHERE status = :expected`
//! plus a single transaction for `confirm_booking`.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::booking::{BookingHooks, BookingTarget};
use crate::entry::{WaitlistEntry, WaitlistStatus};
use crate::error::{EngineError, Result};

/// Query surface for operator screens.
#[derive(Debug, Clone, Default)]
pub struct WaitlistFilter {
    pub org_id: Option<String>,
    pub status: Option<WaitlistStatus>,
    /// Matches either the missed lesson's teacher or a stated preference.
    pub teacher_id: Option<String>,
    pub student_id: Option<String>,
}

impl WaitlistFilter {
    pub fn matches(&self, entry: &WaitlistEntry) -> bool {
        if let Some(org) = &self.org_id {
            if &entry.org_id != org {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(teacher) = &self.teacher_id {
            let hit = entry.missed_teacher_id.as_ref() == Some(teacher)
                || entry.preferred_teacher_id.as_ref() == Some(teacher);
            if !hit {
                return false;
            }
        }
        if let Some(student) = &self.student_id {
            if &entry.student_id != student {
                return false;
            }
        }
        true
    }
}

pub trait WaitlistStore: Send + Sync {
    fn insert(&self, entry: WaitlistEntry) -> Result<WaitlistEntry>;

    fn get(&self, id: &str) -> Result<WaitlistEntry>;

    /// Conditional update: commits `updated` only if the persisted status
    /// still equals `expected`. The sole write path for transitions.
    fn update_where_status(
        &self,
        id: &str,
        expected: WaitlistStatus,
        updated: WaitlistEntry,
    ) -> Result<WaitlistEntry>;

    /// The open (non-terminal) entry for a student + missed-lesson pair,
    /// if one exists. Backs idempotent create.
    fn find_open(&self, student_id: &str, missed_lesson_id: &str) -> Option<WaitlistEntry>;

    fn query(&self, filter: &WaitlistFilter) -> Vec<WaitlistEntry>;

    /// Dashboard aggregate: entry count per status for one org.
    fn status_counts(&self, org_id: &str) -> Vec<(WaitlistStatus, usize)>;

    /// The booking confirmation transaction (the one multi-write unit).
    /// Precondition, hooks, and the status flip commit together or not at
    /// all; the precondition failure mode is `Conflict`, never a partial
    /// write. Lives on the store so atomicity is owned by whatever backs it.
    fn confirm_booking(
        &self,
        id: &str,
        target: &BookingTarget,
        hooks: &dyn BookingHooks,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<WaitlistEntry>;
}

/// Reference implementation over a mutex-guarded map. Entries are never
/// removed; terminal statuses keep the audit trail queryable.
#[derive(Debug, Default)]
pub struct MemoryWaitlistStore {
    inner: Mutex<HashMap<String, WaitlistEntry>>,
}

impl MemoryWaitlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<WaitlistEntry>) -> Self {
        let store = Self::new();
        {
            let mut map = store.lock();
            for e in entries {
                map.insert(e.id.clone(), e);
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WaitlistEntry>> {
        self.inner.lock().expect("waitlist store lock poisoned")
    }
}

impl WaitlistStore for MemoryWaitlistStore {
    fn insert(&self, entry: WaitlistEntry) -> Result<WaitlistEntry> {
        let mut map = self.lock();
        if map.contains_key(&entry.id) {
            return Err(EngineError::conflict(format!(
                "entry {} already exists",
                entry.id
            )));
        }
        map.insert(entry.id.clone(), entry.clone());
        debug!(entry = %entry.id, "waitlist entry inserted");
        Ok(entry)
    }

    fn get(&self, id: &str) -> Result<WaitlistEntry> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(id))
    }

    fn update_where_status(
        &self,
        id: &str,
        expected: WaitlistStatus,
        updated: WaitlistEntry,
    ) -> Result<WaitlistEntry> {
        let mut map = self.lock();
        let current = map.get(id).ok_or_else(|| EngineError::not_found(id))?;
        if current.status != expected {
            warn!(
                entry = %id,
                expected = %expected,
                actual = %current.status,
                "conditional update rejected"
            );
            return Err(EngineError::conflict(format!(
                "entry {id} is {}, expected {expected}",
                current.status
            )));
        }
        map.insert(id.to_string(), updated.clone());
        debug!(entry = %id, from = %expected, to = %updated.status, "entry updated");
        Ok(updated)
    }

    fn find_open(&self, student_id: &str, missed_lesson_id: &str) -> Option<WaitlistEntry> {
        self.lock()
            .values()
            .find(|e| {
                e.student_id == student_id
                    && e.missed_lesson_id == missed_lesson_id
                    && e.status.is_open()
            })
            .cloned()
    }

    fn query(&self, filter: &WaitlistFilter) -> Vec<WaitlistEntry> {
        let mut out: Vec<WaitlistEntry> = self
            .lock()
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    fn status_counts(&self, org_id: &str) -> Vec<(WaitlistStatus, usize)> {
        let map = self.lock();
        WaitlistStatus::all()
            .into_iter()
            .map(|status| {
                let n = map
                    .values()
                    .filter(|e| e.org_id == org_id && e.status == status)
                    .count();
                (status, n)
            })
            .collect()
    }

    fn confirm_booking(
        &self,
        id: &str,
        target: &BookingTarget,
        hooks: &dyn BookingHooks,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<WaitlistEntry> {
        // One critical section for the whole unit: fresh precondition check,
        // collaborator writes, status flip. A racing confirm serialises here
        // and finds the entry already booked.
        let mut map = self.lock();
        let entry = map.get(id).ok_or_else(|| EngineError::not_found(id))?;
        if entry.status != WaitlistStatus::Accepted {
            warn!(entry = %id, status = %entry.status, "booking confirm rejected");
            return Err(EngineError::conflict(format!(
                "entry {id} is {}, expected accepted",
                entry.status
            )));
        }

        // Hooks run before any entry write; a hook failure leaves the store
        // untouched.
        hooks.attach_participant(&target.lesson_id, &entry.student_id)?;
        if let Some(credit_id) = &entry.credit_id {
            hooks.redeem_credit(credit_id)?;
        }
        if let Some(attendance_id) = &entry.attendance_id {
            hooks.link_attendance(attendance_id, &target.lesson_id)?;
        }

        let mut updated = entry.clone();
        updated.status = WaitlistStatus::Booked;
        updated.booked_lesson_id = Some(target.lesson_id.clone());
        updated.updated_at = now;
        map.insert(id.to_string(), updated.clone());
        Ok(updated)
    }
}
