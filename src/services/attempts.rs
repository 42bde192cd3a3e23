//! Failed PIN attempt accounting.
//!
//! Counts only move forward and a message is never reset: reaching the
//! threshold is terminal. Callers must hold the per-message lock (or row
//! lock) while calling in here, so the increment and the threshold check
//! happen as one step.

use crate::models::message::MessageRecord;

/// Result of recording one failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Failed attempts including this one.
    pub new_count: u32,
    /// Whether the message must now be destroyed.
    pub threshold_reached: bool,
}

impl FailureOutcome {
    /// Builds the outcome for a count already incremented by the store.
    pub fn from_counts(new_count: u32, max_failed_attempts: u32) -> Self {
        Self {
            new_count,
            threshold_reached: new_count >= max_failed_attempts,
        }
    }

    pub fn attempts_remaining(&self, max_failed_attempts: u32) -> u32 {
        max_failed_attempts.saturating_sub(self.new_count)
    }
}

/// Adds exactly one failed attempt to `record`.
pub fn record_failure(record: &mut MessageRecord) -> FailureOutcome {
    record.failed_attempts = record.failed_attempts.saturating_add(1);
    FailureOutcome::from_counts(record.failed_attempts, record.max_failed_attempts)
}
