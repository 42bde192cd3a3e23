//! Message lifecycle: create, show the PIN prompt, redeem once.
//!
//! Every way a redeem can go wrong ends in the same `RedeemOutcome::Failed`.
//! Wrong PIN, destroyed on this very attempt, consumed earlier and never
//! existed all look alike from outside. Only the logs tell them apart.

use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    crypto::{
        pin::{Pin, PinPolicy},
        pin_cipher::PinCipher,
    },
    error::{AppError, Result},
    models::{
        message::{AttemptOutcome, CreatedMessage, MessageState, MessageSummary, RedeemOutcome},
        user::CurrentUser,
    },
    repositories::message::MessageStore,
};

/// The only failure text a redeem ever produces.
pub const REDEEM_FAILED: &str = "failed to get a message";

/// Route prefix under which messages are reachable.
pub const MESSAGES_PATH: &str = "/api/messages";

/// Parses the id segment of a link. Anything that is not a UUID is
/// treated like an id that does not exist.
pub fn parse_message_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

pub struct MessageService {
    store: Arc<dyn MessageStore>,
    cipher: PinCipher,
    pin_policy: PinPolicy,
    max_failed_attempts: u32,
    max_payload_bytes: usize,
    public_base_url: String,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        cipher: PinCipher,
        pin_policy: PinPolicy,
        max_failed_attempts: u32,
        max_payload_bytes: usize,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            cipher,
            pin_policy,
            max_failed_attempts,
            max_payload_bytes,
            public_base_url,
        }
    }

    /// The shareable link for a message.
    pub fn link_for(&self, id: Uuid) -> String {
        format!("{}{}/{}", self.public_base_url, MESSAGES_PATH, id)
    }

    /// Encrypts `payload` under a fresh PIN and stores it.
    ///
    /// The returned `CreatedMessage` is the only place the PIN ever leaves
    /// the service in the clear.
    ///
    /// # Arguments
    ///
    /// * `payload` - The secret text.
    /// * `creator` - The logged-in user, if any.
    ///
    /// # Returns
    ///
    /// A `Result` containing the link and PIN, or `LoginRequired` for
    /// anonymous callers.
    pub async fn create_message(
        &self,
        payload: &str,
        creator: Option<&CurrentUser>,
    ) -> Result<CreatedMessage> {
        let creator = creator.ok_or_else(|| AppError::LoginRequired {
            failed_path: MESSAGES_PATH.to_string(),
        })?;

        if payload.trim().is_empty() {
            return Err(AppError::Validation("payload is empty".to_string()));
        }
        if payload.len() > self.max_payload_bytes {
            return Err(AppError::Validation(format!(
                "payload is larger than {} bytes",
                self.max_payload_bytes
            )));
        }

        let pin = self.pin_policy.generate();
        let sealed = self.cipher.encrypt(payload.as_bytes(), pin).await?;
        let summary = self
            .store
            .create(&creator.username, sealed, self.max_failed_attempts)
            .await?;

        tracing::info!(message_id = %summary.id, owner = %creator.username, "✅ Message created");

        Ok(CreatedMessage {
            id: summary.id,
            link: self.link_for(summary.id),
            pin,
            created_at: summary.created_at,
        })
    }

    /// Looks a message up for the PIN prompt. Never counts as an attempt.
    pub async fn view_pin_prompt(&self, id: Uuid) -> Result<Option<MessageSummary>> {
        self.store.fetch_for_decrypt(id).await
    }

    /// Tries `candidate` against message `id`.
    ///
    /// A candidate that is not a number is turned away before it reaches
    /// the store and does not use up an attempt.
    pub async fn redeem(&self, id: Uuid, candidate: &str) -> RedeemOutcome {
        let Some(pin) = Pin::parse(candidate) else {
            tracing::warn!(message_id = %id, "Rejected non-numeric PIN candidate");
            return RedeemOutcome::Failed;
        };

        let outcome = self.store.attempt_decrypt(id, pin).await;
        if let Ok(state) = outcome.as_ref().map(AttemptOutcome::state) {
            tracing::debug!(message_id = %id, ?state, "Attempt settled");
        }

        match outcome {
            Ok(AttemptOutcome::Decrypted(mut bytes)) => {
                tracing::info!(message_id = %id, "🔓 Message consumed");
                match String::from_utf8(std::mem::take(&mut *bytes)) {
                    Ok(text) => RedeemOutcome::Revealed(Zeroizing::new(text)),
                    Err(e) => {
                        drop(Zeroizing::new(e.into_bytes()));
                        tracing::error!(message_id = %id, "Decrypted payload is not UTF-8");
                        RedeemOutcome::Failed
                    }
                }
            }
            Ok(AttemptOutcome::WrongPin { state: MessageState::Destroyed, .. }) => {
                tracing::info!(message_id = %id, "🗑️ Message destroyed after failed attempts");
                RedeemOutcome::Failed
            }
            Ok(AttemptOutcome::WrongPin { attempts_remaining, .. }) => {
                tracing::warn!(message_id = %id, attempts_remaining, "❌ Wrong PIN");
                RedeemOutcome::Failed
            }
            Ok(AttemptOutcome::NotFound) => {
                tracing::debug!(message_id = %id, "Redeem for unknown message");
                RedeemOutcome::Failed
            }
            Err(e) => {
                tracing::error!(message_id = %id, "Redeem failed: {}", e);
                RedeemOutcome::Failed
            }
        }
    }

    /// Active messages created by `owner`.
    pub async fn list_messages(&self, owner: &CurrentUser) -> Result<Vec<MessageSummary>> {
        self.store.list_by_owner(&owner.username).await
    }

    /// Number of messages that can still be redeemed.
    pub async fn active_count(&self) -> Result<i64> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::KdfParams;
    use crate::repositories::message_memory::MemMessageStore;

    fn service() -> MessageService {
        let cipher = PinCipher::new(&[7u8; 32], KdfParams::fast(), 4);
        let store = Arc::new(MemMessageStore::new(cipher.clone()));
        MessageService::new(
            store,
            cipher,
            PinPolicy::default(),
            5,
            1024,
            "http://localhost:8080".to_string(),
        )
    }

    fn joe() -> CurrentUser {
        CurrentUser {
            username: "joe".to_string(),
            roles: vec![],
        }
    }

    /// A syntactically valid PIN that is not `pin`.
    fn wrong(pin: Pin) -> String {
        (if pin.value() == 0 { 1 } else { 0 }).to_string()
    }

    #[tokio::test]
    async fn anonymous_creation_requires_login() {
        let err = service().create_message("foobar", None).await.unwrap_err();
        assert!(matches!(err, AppError::LoginRequired { .. }));
    }

    #[tokio::test]
    async fn empty_and_oversized_payloads_are_rejected() {
        let service = service();
        let err = service.create_message("   ", Some(&joe())).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "payload is empty"));

        let big = "x".repeat(1025);
        assert!(matches!(
            service.create_message(&big, Some(&joe())).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(service.active_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_then_redeem_once() {
        let service = service();
        let created = service.create_message("foobar", Some(&joe())).await.unwrap();
        assert!(created.pin.value() >= 100);
        assert_eq!(
            created.link,
            format!("http://localhost:8080/api/messages/{}", created.id)
        );
        assert!(service.view_pin_prompt(created.id).await.unwrap().is_some());

        match service.redeem(created.id, &created.pin.to_string()).await {
            RedeemOutcome::Revealed(text) => assert_eq!(text.as_str(), "foobar"),
            RedeemOutcome::Failed => panic!("correct PIN was rejected"),
        }
        assert!(service.view_pin_prompt(created.id).await.unwrap().is_none());
        assert!(matches!(
            service.redeem(created.id, &created.pin.to_string()).await,
            RedeemOutcome::Failed
        ));
    }

    #[tokio::test]
    async fn five_wrong_pins_destroy() {
        let service = service();
        let created = service.create_message("foobar", Some(&joe())).await.unwrap();
        let wrong = wrong(created.pin);

        for _ in 0..5 {
            assert!(matches!(
                service.redeem(created.id, &wrong).await,
                RedeemOutcome::Failed
            ));
        }
        assert!(service.view_pin_prompt(created.id).await.unwrap().is_none());
        assert!(matches!(
            service.redeem(created.id, &created.pin.to_string()).await,
            RedeemOutcome::Failed
        ));
    }

    #[tokio::test]
    async fn garbage_candidates_do_not_use_attempts() {
        let service = service();
        let created = service.create_message("foobar", Some(&joe())).await.unwrap();

        for candidate in ["", "   ", "abc", "12a4", "-5", "1".repeat(40).as_str()] {
            assert!(matches!(
                service.redeem(created.id, candidate).await,
                RedeemOutcome::Failed
            ));
        }
        let summary = service.view_pin_prompt(created.id).await.unwrap().unwrap();
        assert_eq!(summary.attempts_remaining, 5);
    }

    #[tokio::test]
    async fn padded_pin_is_accepted() {
        let service = service();
        let created = service.create_message("foobar", Some(&joe())).await.unwrap();
        let padded = format!("  0{}\n", created.pin);
        assert!(matches!(
            service.redeem(created.id, &padded).await,
            RedeemOutcome::Revealed(_)
        ));
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let service = service();
        let alice = CurrentUser {
            username: "alice".to_string(),
            roles: vec![],
        };
        service.create_message("a", Some(&joe())).await.unwrap();
        service.create_message("b", Some(&alice)).await.unwrap();

        let mine = service.list_messages(&joe()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].owner, "joe");
        assert_eq!(service.active_count().await.unwrap(), 2);
    }

    #[test]
    fn message_ids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_message_id(&id.to_string()), Some(id));
        assert_eq!(parse_message_id("42"), None);
        assert_eq!(parse_message_id("../etc/passwd"), None);
    }
}
