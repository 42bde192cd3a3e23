use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    crypto::{
        pin::Pin,
        pin_cipher::{PinCipher, SealedPayload, SALT_SIZE},
    },
    error::{AppError, Result},
    models::message::{AttemptOutcome, MessageRecord, MessageState, MessageSummary},
    services::attempts::FailureOutcome,
};

/// Persistence for secret messages.
///
/// Implementations own the PIN check: `attempt_decrypt` verifies the
/// candidate, counts the failure or destroys the record, all serialized
/// per message id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a new `Active` message and returns its metadata.
    async fn create(
        &self,
        owner: &str,
        sealed: SealedPayload,
        max_failed_attempts: u32,
    ) -> Result<MessageSummary>;

    /// Read-only lookup used to render the PIN prompt. Not an attempt.
    async fn fetch_for_decrypt(&self, id: Uuid) -> Result<Option<MessageSummary>>;

    /// Tries `candidate` against the message. A correct PIN removes the
    /// record and returns its payload; a wrong one counts as a failure and
    /// removes the record when the budget is used up.
    async fn attempt_decrypt(&self, id: Uuid, candidate: Pin) -> Result<AttemptOutcome>;

    /// Removes the message. Absent ids are not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Active messages created by `owner`, newest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<MessageSummary>>;

    /// Number of active messages.
    async fn count(&self) -> Result<i64>;
}

/// A helper function to map a `tokio_postgres::Row` to a `MessageRecord`.
fn row_to_record(row: &Row) -> Result<MessageRecord> {
    let pin_salt: Vec<u8> = row
        .try_get("pin_salt")
        .map_err(|_| AppError::MissingData("pin_salt".to_string()))?;
    let pin_salt: [u8; SALT_SIZE] = pin_salt
        .try_into()
        .map_err(|_| AppError::MissingData("pin_salt".to_string()))?;

    Ok(MessageRecord {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        owner: row.try_get("owner").map_err(|_| AppError::MissingData("owner".to_string()))?,
        sealed: SealedPayload {
            ciphertext: row
                .try_get("ciphertext")
                .map_err(|_| AppError::MissingData("ciphertext".to_string()))?,
            pin_salt,
        },
        failed_attempts: get_count(row, "failed_attempts")?,
        max_failed_attempts: get_count(row, "max_failed_attempts")?,
        created_at: row
            .try_get("created_at")
            .map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

fn row_to_summary(row: &Row) -> Result<MessageSummary> {
    let failed_attempts = get_count(row, "failed_attempts")?;
    let max_failed_attempts = get_count(row, "max_failed_attempts")?;
    Ok(MessageSummary {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        owner: row.try_get("owner").map_err(|_| AppError::MissingData("owner".to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|_| AppError::MissingData("created_at".to_string()))?,
        attempts_remaining: max_failed_attempts.saturating_sub(failed_attempts),
    })
}

fn get_count(row: &Row, column: &str) -> Result<u32> {
    let value: i32 = row
        .try_get(column)
        .map_err(|_| AppError::MissingData(column.to_string()))?;
    u32::try_from(value).map_err(|_| AppError::MissingData(column.to_string()))
}

fn to_db_count(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| AppError::Validation("attempt budget too large".to_string()))
}

/// Postgres-backed message store.
///
/// `attempt_decrypt` holds a row lock (`SELECT ... FOR UPDATE`) for the
/// duration of the PIN check, so concurrent attempts on one id queue up
/// behind each other while other ids proceed in parallel.
pub struct PgMessageStore {
    pool: Pool,
    cipher: PinCipher,
}

impl PgMessageStore {
    pub fn new(pool: Pool, cipher: PinCipher) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(
        &self,
        owner: &str,
        sealed: SealedPayload,
        max_failed_attempts: u32,
    ) -> Result<MessageSummary> {
        let record = MessageRecord::new(owner, sealed, max_failed_attempts);
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO messages (id, owner, ciphertext, pin_salt, failed_attempts, max_failed_attempts, created_at)
                VALUES ($1, $2, $3, $4, 0, $5, $6)
                "#,
            )
            .await?;
        client
            .execute(
                &statement,
                &[
                    &record.id,
                    &record.owner,
                    &record.sealed.ciphertext,
                    &record.sealed.pin_salt.to_vec(),
                    &to_db_count(record.max_failed_attempts)?,
                    &record.created_at,
                ],
            )
            .await?;
        Ok(record.summary())
    }

    async fn fetch_for_decrypt(&self, id: Uuid) -> Result<Option<MessageSummary>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT id, owner, failed_attempts, max_failed_attempts, created_at
                FROM messages
                WHERE id = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&id]).await?;
        row.map(|r| row_to_summary(&r)).transpose()
    }

    async fn attempt_decrypt(&self, id: Uuid, candidate: Pin) -> Result<AttemptOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                r#"
                SELECT id, owner, ciphertext, pin_salt, failed_attempts, max_failed_attempts, created_at
                FROM messages
                WHERE id = $1
                FOR UPDATE
                "#,
                &[&id],
            )
            .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(AttemptOutcome::NotFound);
        };
        let record = row_to_record(&row)?;

        match self.cipher.decrypt(&record.sealed, candidate).await {
            Ok(payload) => {
                tx.execute("DELETE FROM messages WHERE id = $1", &[&id]).await?;
                tx.commit().await?;
                Ok(AttemptOutcome::Decrypted(payload))
            }
            Err(AppError::Decryption) => {
                let counts = tx
                    .query_one(
                        r#"
                        UPDATE messages
                        SET failed_attempts = failed_attempts + 1
                        WHERE id = $1
                        RETURNING failed_attempts, max_failed_attempts
                        "#,
                        &[&id],
                    )
                    .await?;
                let max_failed_attempts = get_count(&counts, "max_failed_attempts")?;
                let outcome = FailureOutcome::from_counts(
                    get_count(&counts, "failed_attempts")?,
                    max_failed_attempts,
                );

                let state = if outcome.threshold_reached {
                    tx.execute("DELETE FROM messages WHERE id = $1", &[&id]).await?;
                    MessageState::Destroyed
                } else {
                    MessageState::Active
                };
                tx.commit().await?;

                Ok(AttemptOutcome::WrongPin {
                    state,
                    attempts_remaining: outcome.attempts_remaining(max_failed_attempts),
                })
            }
            // Dropping the transaction rolls it back.
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM messages WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<MessageSummary>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT id, owner, failed_attempts, max_failed_attempts, created_at
                FROM messages
                WHERE owner = $1
                ORDER BY created_at DESC
                "#,
            )
            .await?;
        let rows = client.query(&statement, &[&owner]).await?;
        rows.iter().map(row_to_summary).collect()
    }

    async fn count(&self) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS total FROM messages", &[])
            .await?;
        row.try_get("total")
            .map_err(|_| AppError::MissingData("total".to_string()))
    }
}
