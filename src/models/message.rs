use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::pin::Pin;
use crate::crypto::pin_cipher::SealedPayload;

/// Where a message is in its lifecycle.
///
/// Only `Active` messages exist in a store. The terminal states are never
/// persisted; `AttemptOutcome::state` reports which one an attempt led to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageState {
    Active,
    Consumed,
    Destroyed,
}

/// A stored secret message.
#[derive(Clone, Debug)]
pub struct MessageRecord {
    /// Unguessable identifier embedded in the shareable link.
    pub id: Uuid,
    /// Username of the creator.
    pub owner: String,
    /// Encrypted payload and PIN verifier material.
    pub sealed: SealedPayload,
    /// Failed PIN attempts so far.
    pub failed_attempts: u32,
    /// Failed attempts at which the message is destroyed.
    pub max_failed_attempts: u32,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Builds a fresh `Active` record with a random v4 id.
    pub fn new(owner: &str, sealed: SealedPayload, max_failed_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            sealed,
            failed_attempts: 0,
            max_failed_attempts,
            created_at: Utc::now(),
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_failed_attempts.saturating_sub(self.failed_attempts)
    }

    /// The view of this record that is safe to hand out.
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            id: self.id,
            owner: self.owner.clone(),
            created_at: self.created_at,
            attempts_remaining: self.attempts_remaining(),
        }
    }
}

/// Message metadata without ciphertext or PIN material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub id: Uuid,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

/// Result of a decryption attempt against the store.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The PIN was right; the record is gone and this is its only plaintext.
    Decrypted(Zeroizing<Vec<u8>>),
    /// The PIN was wrong. `state` is `Destroyed` when this attempt used up the budget.
    WrongPin { state: MessageState, attempts_remaining: u32 },
    /// No such message.
    NotFound,
}

impl AttemptOutcome {
    /// State of the message after this attempt, `None` if it never existed.
    pub fn state(&self) -> Option<MessageState> {
        match self {
            AttemptOutcome::Decrypted(_) => Some(MessageState::Consumed),
            AttemptOutcome::WrongPin { state, .. } => Some(*state),
            AttemptOutcome::NotFound => None,
        }
    }
}

/// What the creator gets back, once.
#[derive(Debug)]
pub struct CreatedMessage {
    pub id: Uuid,
    pub link: String,
    pub pin: Pin,
    pub created_at: DateTime<Utc>,
}

/// What a redeem call reports to the transport layer.
#[derive(Debug)]
pub enum RedeemOutcome {
    /// One-time plaintext.
    Revealed(Zeroizing<String>),
    /// Wrong PIN, destroyed, never existed or internal failure; deliberately indistinguishable.
    Failed,
}
