//! Typed failures for waitlist operations.
//!
//! The split matters to callers: `Validation` is the caller's input,
//! `State` means the entry moved since the caller last read it (refresh and
//! retry by hand), `Conflict` means an optimistic write lost a race (safe to
//! re-fetch and retry), `NotFound` is a dangling reference.

use thiserror::Error;

use crate::entry::WaitlistStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or duplicate input at creation time. Not retried.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A transition was attempted from an incompatible status.
    #[error("entry is {actual:?}, transition requires {expected:?}")]
    State {
        expected: &'static [WaitlistStatus],
        actual: WaitlistStatus,
    },

    /// An optimistic precondition failed at commit time; someone else acted
    /// on this entry first.
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("not found: {id}")]
    NotFound { id: String },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
