use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::kdf::KdfParams;
use crate::crypto::pin::PinPolicy;

/// Master key used outside production when `MASTER_KEY` is not set.
const DEVELOPMENT_MASTER_KEY: [u8; 32] = *b"12345678123456781234567812345678";

/// Default request body and payload limit (3 MiB).
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 3 << 20;

/// Upper bound for `SESSION_DURATION_DAYS`.
const MAX_SESSION_DURATION_DAYS: i64 = 365;

/// The environment the server runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Production,
    Development,
    Test,
}

impl AppEnv {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "production" => Ok(AppEnv::Production),
            "development" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            other => anyhow::bail!("APP_ENV must be production, development or test (got {other})"),
        }
    }
}

/// Where messages, users and sessions are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local maps; data is lost on restart.
    Memory,
    /// Postgres for messages and users, Redis for sessions.
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("STORAGE_BACKEND must be memory or postgres (got {other})"),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The deployment environment.
    pub app_env: AppEnv,
    /// The storage backend.
    pub storage: StorageBackend,
    /// The URL of the PostgreSQL database.
    pub database_url: Option<String>,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the server binds to.
    pub listen_addr: SocketAddr,
    /// Prefix for shareable message links.
    pub public_base_url: String,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// The master key mixed into every PIN key derivation.
    pub master_key: Zeroizing<Vec<u8>>,
    /// Failed PIN attempts after which a message is destroyed.
    pub max_pin_attempts: u32,
    /// PIN generation policy.
    pub pin_policy: PinPolicy,
    /// Largest accepted payload in bytes.
    pub max_payload_bytes: usize,
    /// Argon2 cost for PIN keys and password hashes.
    pub kdf: KdfParams,
    /// Upper bound on concurrently running key derivations.
    pub kdf_max_concurrency: usize,
    /// Whether login, register and redeem are throttled per client IP.
    pub rate_limit_enabled: bool,
    /// Whether demo accounts and a demo message are created at startup.
    pub seed_demo_data: bool,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let app_env = AppEnv::parse(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        )?;
        let is_production = app_env == AppEnv::Production;

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) if is_production => StorageBackend::Postgres,
            Err(_) => StorageBackend::Memory,
        };

        let master_key = match env::var("MASTER_KEY") {
            Ok(value) => parse_master_key(value)?,
            Err(_) if is_production => {
                anyhow::bail!("MASTER_KEY must be set (generate with: openssl rand -hex 32)")
            }
            Err(_) => Zeroizing::new(DEVELOPMENT_MASTER_KEY.to_vec()),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set for the postgres backend");
        }

        let listen_addr: SocketAddr = match env::var("LISTEN_ADDR") {
            Ok(addr) => addr.parse().context("Invalid LISTEN_ADDR")?,
            Err(_) => {
                let port = env::var("FUNCTIONS_CUSTOMHANDLER_PORT")
                    .or_else(|_| env::var("PORT"))
                    .unwrap_or_else(|_| "8080".to_string());
                format!("127.0.0.1:{port}").parse().context("Invalid PORT")?
            }
        };

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{listen_addr}"))
            .trim_end_matches('/')
            .to_string();

        let session_duration_days =
            check_session_duration_days(parse_var("SESSION_DURATION_DAYS", 7)?)?;

        let max_pin_attempts: u32 = parse_var("MAX_PIN_ATTEMPTS", 5)?;
        if max_pin_attempts == 0 {
            anyhow::bail!("MAX_PIN_ATTEMPTS must be at least 1");
        }

        let pin_policy = PinPolicy::new(parse_var("PIN_DIGITS", 6)?)
            .context("PIN_DIGITS must be between 3 and 9")?;

        let kdf = KdfParams {
            memory_kib: parse_var("KDF_MEMORY_KIB", KdfParams::default().memory_kib)?,
            iterations: parse_var("KDF_ITERATIONS", KdfParams::default().iterations)?,
            parallelism: parse_var("KDF_PARALLELISM", KdfParams::default().parallelism)?,
        };
        kdf.validate().context("Invalid KDF_* settings")?;

        let default_concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Ok(Self {
            app_env,
            storage,
            database_url,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            listen_addr,
            public_base_url,
            session_duration_days,
            master_key,
            max_pin_attempts,
            pin_policy,
            max_payload_bytes: parse_var("MAX_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD_BYTES)?,
            kdf,
            kdf_max_concurrency: parse_var("KDF_MAX_CONCURRENCY", default_concurrency)?.max(1),
            rate_limit_enabled: parse_var("RATE_LIMIT_ENABLED", true)?,
            seed_demo_data: parse_var("SEED_DEMO_DATA", !is_production)?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// A self-contained configuration with in-memory storage, cheap key
    /// derivation and no rate limiting. Used by tests and local tooling.
    pub fn local() -> Self {
        let listen_addr = SocketAddr::from(([127, 0, 0, 1], 8080));
        Self {
            app_env: AppEnv::Test,
            storage: StorageBackend::Memory,
            database_url: None,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            listen_addr,
            public_base_url: format!("http://{listen_addr}"),
            session_duration_days: 1,
            master_key: Zeroizing::new(DEVELOPMENT_MASTER_KEY.to_vec()),
            max_pin_attempts: 5,
            pin_policy: PinPolicy::default(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            kdf: KdfParams::fast(),
            kdf_max_concurrency: 4,
            rate_limit_enabled: false,
            seed_demo_data: true,
            cors_origins: Vec::new(),
        }
    }

    /// Whether the server runs in production.
    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }
}

fn parse_master_key(mut master_key_hex: String) -> Result<Zeroizing<Vec<u8>>> {
    let master_key_bytes = hex::decode(master_key_hex.trim())
        .context("MASTER_KEY must be valid hexadecimal")?;

    master_key_hex.zeroize();

    if master_key_bytes.len() != 32 {
        anyhow::bail!("MASTER_KEY must be exactly 32 bytes (64 hex characters)");
    }

    Ok(Zeroizing::new(master_key_bytes))
}

/// Rejects session lifetimes outside `1..=MAX_SESSION_DURATION_DAYS`.
fn check_session_duration_days(days: i64) -> Result<i64> {
    if !(1..=MAX_SESSION_DURATION_DAYS).contains(&days) {
        anyhow::bail!("SESSION_DURATION_DAYS must be between 1 and {MAX_SESSION_DURATION_DAYS}");
    }
    Ok(days)
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}
