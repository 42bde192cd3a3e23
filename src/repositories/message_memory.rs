use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    crypto::{
        pin::Pin,
        pin_cipher::{PinCipher, SealedPayload},
    },
    error::{AppError, Result},
    models::message::{AttemptOutcome, MessageRecord, MessageState, MessageSummary},
    repositories::message::MessageStore,
    services::attempts,
};

/// One message behind its own lock. `None` means the message was
/// destroyed while someone else still held a handle to the slot.
type Slot = Arc<Mutex<Option<MessageRecord>>>;

/// In-memory message store.
///
/// Lock order is always slot first, then the map. The map sits behind a
/// blocking lock that is only taken to look up, insert or remove a slot,
/// so removal never spans an `.await` and cannot be cancelled halfway.
pub struct MemMessageStore {
    slots: RwLock<HashMap<Uuid, Slot>>,
    cipher: PinCipher,
}

impl MemMessageStore {
    pub fn new(cipher: PinCipher) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            cipher,
        }
    }

    fn slot(&self, id: Uuid) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Empties the slot and forgets it. Caller holds the slot lock.
    fn destroy(&self, id: Uuid, record: &mut Option<MessageRecord>) {
        record.take();
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn all_slots(&self) -> Vec<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemMessageStore {
    async fn create(
        &self,
        owner: &str,
        sealed: SealedPayload,
        max_failed_attempts: u32,
    ) -> Result<MessageSummary> {
        let record = MessageRecord::new(owner, sealed, max_failed_attempts);
        let summary = record.summary();
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, Arc::new(Mutex::new(Some(record))));
        Ok(summary)
    }

    async fn fetch_for_decrypt(&self, id: Uuid) -> Result<Option<MessageSummary>> {
        let Some(slot) = self.slot(id) else {
            return Ok(None);
        };
        let record = slot.lock().await;
        Ok(record.as_ref().map(MessageRecord::summary))
    }

    async fn attempt_decrypt(&self, id: Uuid, candidate: Pin) -> Result<AttemptOutcome> {
        let Some(slot) = self.slot(id) else {
            return Ok(AttemptOutcome::NotFound);
        };
        let mut guard = slot.lock().await;
        let Some(record) = guard.as_mut() else {
            return Ok(AttemptOutcome::NotFound);
        };

        match self.cipher.decrypt(&record.sealed, candidate).await {
            Ok(payload) => {
                self.destroy(id, &mut guard);
                Ok(AttemptOutcome::Decrypted(payload))
            }
            Err(AppError::Decryption) => {
                let outcome = attempts::record_failure(record);
                let attempts_remaining = outcome.attempts_remaining(record.max_failed_attempts);
                let state = if outcome.threshold_reached {
                    self.destroy(id, &mut guard);
                    MessageState::Destroyed
                } else {
                    MessageState::Active
                };
                Ok(AttemptOutcome::WrongPin { state, attempts_remaining })
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        if let Some(slot) = self.slot(id) {
            let mut guard = slot.lock().await;
            self.destroy(id, &mut guard);
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<MessageSummary>> {
        let mut summaries = Vec::new();
        for slot in self.all_slots() {
            if let Some(record) = slot.lock().await.as_ref() {
                if record.owner == owner {
                    summaries.push(record.summary());
                }
            }
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn count(&self) -> Result<i64> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.len() as i64)
    }
}
