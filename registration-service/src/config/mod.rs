use secrecy::Secret;
use service_core::config::{self as core_config, get_env, get_env_parsed};
use service_core::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub common: core_config::Config,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub event: EventConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Clone, Debug)]
pub struct RazorpayConfig {
    /// Public key id, handed to the checkout frontend.
    pub key_id: String,
    /// Shared secret; signs checkout callbacks and authenticates API calls.
    pub key_secret: Secret<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EventConfig {
    pub id: String,
    pub token_prefix: String,
    pub currency: String,
    /// Order amount (major units) used when the caller sends none.
    pub default_amount: f64,
    /// Amount recorded on each registration.
    pub registration_amount: f64,
    pub convenience_fee: f64,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StorageBackend::MongoDb),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        // Handles .env and the APP__ prefix
        let common = core_config::Config::load()?;
        let is_prod = common.is_prod();

        let backend = get_env("STORAGE_BACKEND", Some("mongodb"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mongodb_required = is_prod && backend == StorageBackend::MongoDb;

        Ok(Config {
            storage: StorageConfig { backend },
            database: DatabaseConfig {
                url: Secret::new(get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017"),
                    mongodb_required,
                )?),
                db_name: get_env("MONGODB_DATABASE", Some("registration_db"), mongodb_required)?,
            },
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                api_base_url: get_env(
                    "RAZORPAY_API_BASE_URL",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
                timeout_secs: get_env_parsed("RAZORPAY_TIMEOUT_SECS", Some("10"), false)?,
            },
            event: EventConfig {
                id: get_env("EVENT_ID", Some("api-maze-2025"), is_prod)?,
                token_prefix: get_env("EVENT_TOKEN_PREFIX", Some("API25"), false)?,
                currency: get_env("EVENT_CURRENCY", Some("INR"), false)?,
                default_amount: get_env_parsed("EVENT_DEFAULT_AMOUNT", Some("100"), false)?,
                registration_amount: get_env_parsed(
                    "EVENT_REGISTRATION_AMOUNT",
                    Some("100"),
                    false,
                )?,
                convenience_fee: get_env_parsed("EVENT_CONVENIENCE_FEE", Some("2.5"), false)?,
            },
            service_name: "registration-service".to_string(),
            common,
        })
    }
}
