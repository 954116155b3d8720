use std::{env, fmt::Display, str::FromStr, time::Duration};

use shared::validate_table_name;
use tracing::{info, warn};

use crate::{
    error::{HarnessError, Result},
    waiter::WaitPolicy,
};

pub const DEFAULT_HOST: &str = "localhost";
pub const APP_PORT: u16 = 8080;
pub const REDIS_PORT: u16 = 8081;
pub const PSQL_PORT: u16 = 8082;
/// Longest wait a single pending change may block for.
pub const MAX_WAIT_TIMEOUT_SECS: u64 = 86_400;

/// Vote web API endpoint (submission channel A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Name of the cookie carrying the voter id.
    pub session_cookie: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: APP_PORT,
            session_cookie: "voter_id".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Redis work queue (submission channel B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub key: String,
    /// Fail a push unless the queue holds exactly the pushed message afterwards.
    pub expect_drained: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: REDIS_PORT,
            key: "votes".to_string(),
            expect_drained: true,
        }
    }
}

impl QueueConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Postgres store the worker writes votes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub table: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: PSQL_PORT,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            table: "votes".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    pub api: ApiConfig,
    pub queue: QueueConfig,
    pub db: DbConfig,
    pub wait: WaitPolicy,
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for absent keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api = ApiConfig {
            host: try_load(&lookup, "VOTE_API_HOST", defaults.api.host)?,
            port: try_load(&lookup, "VOTE_API_PORT", defaults.api.port)?,
            session_cookie: try_load(&lookup, "VOTE_API_COOKIE", defaults.api.session_cookie)?,
            request_timeout: defaults.api.request_timeout,
        };

        let queue = QueueConfig {
            host: try_load(&lookup, "VOTE_REDIS_HOST", defaults.queue.host)?,
            port: try_load(&lookup, "VOTE_REDIS_PORT", defaults.queue.port)?,
            key: try_load(&lookup, "VOTE_QUEUE_KEY", defaults.queue.key)?,
            expect_drained: try_load(&lookup, "VOTE_QUEUE_EXPECT_DRAINED", defaults.queue.expect_drained)?,
        };

        let table: String = try_load(&lookup, "VOTE_DB_TABLE", defaults.db.table)?;
        validate_table_name(&table).map_err(|e| invalid("VOTE_DB_TABLE", e))?;

        let db = DbConfig {
            host: try_load(&lookup, "VOTE_DB_HOST", defaults.db.host)?,
            port: try_load(&lookup, "VOTE_DB_PORT", defaults.db.port)?,
            database: try_load(&lookup, "VOTE_DB_NAME", defaults.db.database)?,
            user: try_load(&lookup, "VOTE_DB_USER", defaults.db.user)?,
            password: lookup("VOTE_DB_PASSWORD"),
            table,
        };

        let timeout_secs = try_load(&lookup, "VOTE_WAIT_TIMEOUT_SECS", defaults.wait.timeout.as_secs())?;
        if timeout_secs > MAX_WAIT_TIMEOUT_SECS {
            return Err(invalid(
                "VOTE_WAIT_TIMEOUT_SECS",
                format!("must be at most {MAX_WAIT_TIMEOUT_SECS}"),
            ));
        }
        let interval_ms: u64 = try_load(
            &lookup,
            "VOTE_POLL_INTERVAL_MS",
            defaults.wait.poll_interval.as_millis() as u64,
        )?;
        if interval_ms == 0 {
            return Err(invalid("VOTE_POLL_INTERVAL_MS", "must be greater than zero"));
        }

        let wait = WaitPolicy {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(interval_ms),
        };

        Ok(Self { api, queue, db, wait })
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            invalid(key, e)
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn invalid(key: &str, message: impl Display) -> HarnessError {
    HarnessError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}
