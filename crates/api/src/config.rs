//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use dispatch::DispatcherConfig;
use domain::LifecycleConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres connection string; the in-memory store is used
///   when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `LOCK_TIMEOUT_MS`: per-transaction row lock timeout (default: none)
/// - `DISPATCH_WORKERS`: side-effect workers (default: `4`)
/// - `DISPATCH_QUEUE_CAPACITY`: queued side effects before dropping (default: `1024`)
/// - `ORDER_TRANSITIONS`: `permissive` or `forward-only` (default: `permissive`)
/// - `RESTOCK_ON_CANCEL`: return stock on cancellation (default: `false`)
/// - `CACHE_TTL_SECS`: order summary cache lifetime (default: `30`)
///
/// Unparseable values fall back to their default and are listed in
/// [`Config::rejected`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub lock_timeout: Option<Duration>,
    pub dispatch: DispatcherConfig,
    pub lifecycle: LifecycleConfig,
    pub cache_ttl: Duration,
    /// Variables that were set but unparseable, as `(key, value)`.
    pub rejected: Vec<(String, String)>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut vars = Vars {
            lookup: &lookup,
            rejected: Vec::new(),
        };

        let log_format = match vars.raw("LOG_FORMAT") {
            None => defaults.log_format,
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(f) if f.eq_ignore_ascii_case("text") => LogFormat::Text,
            Some(f) => {
                vars.reject("LOG_FORMAT", &f);
                defaults.log_format
            }
        };

        Self {
            host: vars.raw("HOST").unwrap_or(defaults.host),
            port: vars.parse("PORT").unwrap_or(defaults.port),
            log_level: vars.raw("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: vars.raw("DATABASE_URL"),
            database_max_connections: vars
                .parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            lock_timeout: vars.parse("LOCK_TIMEOUT_MS").map(Duration::from_millis),
            dispatch: DispatcherConfig {
                workers: vars.parse("DISPATCH_WORKERS").unwrap_or(defaults.dispatch.workers),
                queue_capacity: vars
                    .parse("DISPATCH_QUEUE_CAPACITY")
                    .unwrap_or(defaults.dispatch.queue_capacity),
            },
            lifecycle: LifecycleConfig {
                policy: vars.parse("ORDER_TRANSITIONS").unwrap_or_default(),
                restock_on_cancel: vars
                    .parse("RESTOCK_ON_CANCEL")
                    .unwrap_or(defaults.lifecycle.restock_on_cancel),
            },
            cache_ttl: vars
                .parse("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            rejected: vars.rejected,
        }
    }

    /// Logs every variable that was set but could not be parsed.
    ///
    /// Call once tracing is initialized.
    pub fn warn_rejected(&self) {
        for (key, value) in &self.rejected {
            tracing::warn!(%key, %value, "ignoring unparseable environment variable, using default");
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Environment reader that remembers rejected values.
struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
    rejected: Vec<(String, String)>,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Returns the trimmed value, treating blank as unset.
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let value = self.raw(key)?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.reject(key, &value);
                None
            }
        }
    }

    fn reject(&mut self, key: &str, value: &str) {
        self.rejected.push((key.to_string(), value.to_string()));
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            lock_timeout: None,
            dispatch: DispatcherConfig::default(),
            lifecycle: LifecycleConfig::default(),
            cache_ttl: Duration::from_secs(30),
            rejected: Vec::new(),
        }
    }
}
