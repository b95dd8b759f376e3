use crate::schema::asset::default_history_symbols;
use crate::source::{ChangeFallback, Provider};
use crate::store::WriteMode;
use dotenv::var;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key for the quote provider; polling is disabled, serving is not.
    #[error("FINANCIAL_API_KEY is not set")]
    MissingApiKey,

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    /// The HTTP client for the quote provider could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The asset list file could not be read or parsed.
    #[error("failed to load assets file {path}: {reason}")]
    AssetsFile { path: PathBuf, reason: String },
}

/// Which [`ObservationStore`](crate::store::ObservationStore) backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub pool_size: usize,
}

/// Everything read from the environment (and `.env`) at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db: DbSettings,
    pub store: StoreKind,
    pub bind_addr: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub provider: Provider,
    pub write_mode: WriteMode,
    pub change_fallback: ChangeFallback,
    pub poll_interval: Duration,
    pub poll_delay: Duration,
    pub http_timeout: Duration,
    pub history_symbols: Vec<String>,
    pub history_limit: usize,
    pub assets_file: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db: DbSettings {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: None,
                name: "globalpulse".to_string(),
                pool_size: 10,
            },
            store: StoreKind::Postgres,
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
            api_key: None,
            provider: Provider::AlphaVantage,
            write_mode: WriteMode::Append,
            change_fallback: ChangeFallback::Omit,
            poll_interval: Duration::from_secs(600),
            poll_delay: Duration::from_secs(15),
            http_timeout: Duration::from_secs(10),
            history_symbols: vec!["IBM".to_string(), "BTC".to_string()],
            history_limit: 20,
            assets_file: None,
            static_dir: None,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read the process environment over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = get("DB_HOST") {
            settings.db.host = host;
        }
        if let Some(port) = get("DB_PORT") {
            settings.db.port = parse("DB_PORT", port)?;
        }
        if let Some(user) = get("DB_USER") {
            settings.db.user = user;
        }
        settings.db.password = get("DB_PASSWORD");
        if let Some(name) = get("DB_NAME") {
            settings.db.name = name;
        }
        if let Some(size) = get("DB_POOL_SIZE") {
            settings.db.pool_size = parse("DB_POOL_SIZE", size)?;
            if settings.db.pool_size == 0 {
                return Err(invalid("DB_POOL_SIZE", "0"));
            }
        }
        if let Some(store) = get("STORE") {
            settings.store = parse("STORE", store)?;
        }
        if let Some(addr) = get("BIND_ADDR") {
            settings.bind_addr = addr;
        }
        if let Some(port) = get("PORT") {
            settings.port = parse("PORT", port)?;
        }
        settings.api_key = get("FINANCIAL_API_KEY");
        if let Some(provider) = get("QUOTE_PROVIDER") {
            settings.provider = parse("QUOTE_PROVIDER", provider)?;
        }
        if let Some(mode) = get("WRITE_MODE") {
            settings.write_mode = parse("WRITE_MODE", mode)?;
        }
        if let Some(fallback) = get("CHANGE_FALLBACK") {
            settings.change_fallback = parse("CHANGE_FALLBACK", fallback)?;
        }
        if let Some(secs) = get("POLL_INTERVAL_SECS") {
            settings.poll_interval = seconds("POLL_INTERVAL_SECS", secs)?;
            if settings.poll_interval.is_zero() {
                return Err(invalid("POLL_INTERVAL_SECS", "0"));
            }
        }
        if let Some(secs) = get("POLL_DELAY_SECS") {
            settings.poll_delay = seconds("POLL_DELAY_SECS", secs)?;
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS") {
            settings.http_timeout = seconds("HTTP_TIMEOUT_SECS", secs)?;
            if settings.http_timeout.is_zero() {
                return Err(invalid("HTTP_TIMEOUT_SECS", "0"));
            }
        }
        settings.history_symbols = match get("HISTORY_SYMBOLS") {
            Some(symbols) => split_symbols(&symbols),
            None => default_history_symbols(settings.provider),
        };
        if let Some(limit) = get("HISTORY_LIMIT") {
            settings.history_limit = parse("HISTORY_LIMIT", limit)?;
        }
        settings.assets_file = get("ASSETS_FILE").map(PathBuf::from);
        settings.static_dir = get("STATIC_DIR").map(PathBuf::from);

        Ok(settings)
    }

    /// The API key, or the error that disables polling.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

/// Split a comma separated symbol list, dropping blanks.
pub fn split_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { var, value })
}

fn seconds(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    parse::<u64>(var, value).map(Duration::from_secs)
}

fn invalid(var: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
    }
}
