use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::config::{Config, StorageBackend};
use crate::crypto::pin_cipher::PinCipher;
use crate::error::{AppError, Result};
use crate::models::user::CurrentUser;
use crate::repositories::{
    message::{MessageStore, PgMessageStore},
    message_memory::MemMessageStore,
    session::{MemSessionStore, RedisSessionStore, SessionStore},
    user::{PgUserStore, UserStore},
    user_memory::MemUserStore,
};
use crate::services::{auth as auth_service, messages::MessageService};

/// Payload of the demo message created for `joe`.
const DEMO_MESSAGE: &str = "This is a demo secret. It disappears once read.";

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Account storage.
    pub users: Arc<dyn UserStore>,
    /// Sessions and CSRF tokens.
    pub sessions: Arc<dyn SessionStore>,
    /// The message lifecycle.
    pub messages: Arc<MessageService>,
}

impl AppState {
    /// Creates a new `AppState`, connecting to whatever the configured
    /// backend needs and seeding demo data when enabled.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let cipher = PinCipher::new(&config.master_key, config.kdf, config.kdf_max_concurrency);
        tracing::info!(
            "✅ PIN cipher initialized (max {} concurrent key derivations)",
            config.kdf_max_concurrency
        );

        let (messages, users, sessions): (
            Arc<dyn MessageStore>,
            Arc<dyn UserStore>,
            Arc<dyn SessionStore>,
        ) = match config.storage {
            StorageBackend::Memory => {
                tracing::info!("✅ Using in-memory storage");
                (
                    Arc::new(MemMessageStore::new(cipher.clone())),
                    Arc::new(MemUserStore::new()),
                    Arc::new(MemSessionStore::new()),
                )
            }
            StorageBackend::Postgres => {
                let database_url = config.database_url.as_deref().ok_or_else(|| {
                    AppError::Internal("DATABASE_URL is required for postgres".to_string())
                })?;
                let db = crate::db::create_pool(database_url)?;
                crate::db::run_migrations(&db).await?;
                tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

                let redis_client = redis::Client::open(config.redis_url.as_str())?;
                let redis = ConnectionManager::new(redis_client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (pooled)");

                (
                    Arc::new(PgMessageStore::new(db.clone(), cipher.clone())),
                    Arc::new(PgUserStore::new(db)),
                    Arc::new(RedisSessionStore::new(redis)),
                )
            }
        };

        let state = Self::with_stores(config, messages, users, sessions, cipher);

        if config.seed_demo_data {
            state.seed_demo_data().await?;
        }

        Ok(state)
    }

    /// Assembles a state from already built stores.
    pub fn with_stores(
        config: &Config,
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        cipher: PinCipher,
    ) -> Self {
        let service = MessageService::new(
            messages,
            cipher,
            config.pin_policy,
            config.max_pin_attempts,
            config.max_payload_bytes,
            config.public_base_url.clone(),
        );

        AppState {
            config: config.clone(),
            users,
            sessions,
            messages: Arc::new(service),
        }
    }

    /// Creates the demo accounts and, if `joe` has none yet, one message.
    async fn seed_demo_data(&self) -> Result<()> {
        auth_service::seed_demo_accounts(self.users.as_ref(), self.config.kdf).await?;

        let joe = CurrentUser {
            username: "joe".to_string(),
            roles: Vec::new(),
        };
        if self.messages.list_messages(&joe).await?.is_empty() {
            let created = self.messages.create_message(DEMO_MESSAGE, Some(&joe)).await?;
            if self.config.is_production() {
                tracing::info!("🌱 Demo message created: {}", created.link);
            } else {
                tracing::info!("🌱 Demo message created: {} (PIN {})", created.link, created.pin);
            }
        }

        tracing::info!("🌱 Demo data ready");
        Ok(())
    }
}
