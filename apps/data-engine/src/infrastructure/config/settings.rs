//! Engine Configuration Settings
//!
//! Configuration types for the ingestion engine, loaded from environment
//! variables. Values that fail to parse are errors rather than silent
//! fallbacks so a typo in a deployment never runs with defaults.

use std::time::Duration;

use crate::domain::observation::Symbol;

/// Exchange API credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Check whether both halves are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// What to ingest and how often.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Symbols swept every cycle.
    pub symbols: Vec<Symbol>,
    /// Source names swept for every symbol.
    pub sources: Vec<String>,
    /// Upper bound on the number of symbols.
    pub max_symbols: usize,
    /// Time between ticks.
    pub interval: Duration,
    /// Grace period for draining on shutdown.
    pub shutdown_grace: Duration,
    /// Dispatcher concurrency bound.
    pub max_concurrent_pairs: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            symbols: ["BTCUSDT", "ETHUSDT", "BNBUSDT"]
                .into_iter()
                .map(Symbol::new)
                .collect(),
            sources: vec!["binance".to_string(), "okx".to_string()],
            max_symbols: 10,
            interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            max_concurrent_pairs: 1,
        }
    }
}

/// Upstream source settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Per-fetch timeout.
    pub timeout: Duration,
    /// Venue credentials.
    pub credentials: Credentials,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            credentials: Credentials::default(),
        }
    }
}

/// Store settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Database file path; `:memory:` for an ephemeral store.
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "market_data.db".to_string(),
        }
    }
}

/// Bus settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Topic stamped on every envelope.
    pub topic: String,
    /// Broadcast channel capacity.
    pub capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            topic: "quant_data".to_string(),
            capacity: 10_000,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health and metrics HTTP port.
    pub api_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { api_port: 8080 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Ingestion settings.
    pub ingest: IngestSettings,
    /// Upstream source settings.
    pub source: SourceSettings,
    /// Store settings.
    pub storage: StorageSettings,
    /// Bus settings.
    pub bus: BusSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or a constraint fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or a constraint fails.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let symbols = match env.get("INGEST_SYMBOLS") {
            Some(raw) => parse_list("INGEST_SYMBOLS", &raw)?
                .into_iter()
                .map(Symbol::new)
                .collect(),
            None => defaults.ingest.symbols,
        };
        let sources = match env.get("INGEST_SOURCES") {
            Some(raw) => parse_list("INGEST_SOURCES", &raw)?,
            None => defaults.ingest.sources,
        };

        let max_symbols = env.parse("MAX_SYMBOLS", defaults.ingest.max_symbols)?;
        if symbols.len() > max_symbols {
            return Err(ConfigError::TooManySymbols {
                count: symbols.len(),
                max: max_symbols,
            });
        }

        let ingest = IngestSettings {
            symbols,
            sources,
            max_symbols,
            interval: env.duration_secs("PROCESSING_INTERVAL", defaults.ingest.interval)?,
            shutdown_grace: env
                .duration_secs("INGEST_SHUTDOWN_GRACE_SECS", defaults.ingest.shutdown_grace)?,
            max_concurrent_pairs: env.parse(
                "INGEST_MAX_CONCURRENT_PAIRS",
                defaults.ingest.max_concurrent_pairs,
            )?,
        };
        require_positive("PROCESSING_INTERVAL", ingest.interval.as_secs())?;
        require_positive("INGEST_MAX_CONCURRENT_PAIRS", ingest.max_concurrent_pairs as u64)?;

        let source = SourceSettings {
            timeout: env.duration_secs("DATA_SOURCE_TIMEOUT", defaults.source.timeout)?,
            credentials: Credentials::new(
                env.get("EXCHANGE_API_KEY").unwrap_or_default(),
                env.get("EXCHANGE_API_SECRET").unwrap_or_default(),
            ),
        };
        require_positive("DATA_SOURCE_TIMEOUT", source.timeout.as_secs())?;

        let storage = StorageSettings {
            database_path: env.non_empty("DATABASE_PATH", defaults.storage.database_path)?,
        };

        let bus = BusSettings {
            topic: env.non_empty("BUS_TOPIC", defaults.bus.topic)?,
            capacity: env.parse("BUS_CAPACITY", defaults.bus.capacity)?,
        };
        require_positive("BUS_CAPACITY", bus.capacity as u64)?;

        let server = ServerSettings {
            api_port: env.parse("API_PORT", defaults.server.api_port)?,
        };

        Ok(Self {
            ingest,
            source,
            storage,
            bus,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed or is out of range.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// More symbols configured than allowed.
    #[error("{count} symbols configured, at most {max} allowed")]
    TooManySymbols {
        /// Configured symbol count.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse::<u64>(key, default.as_secs())
            .map(Duration::from_secs)
    }

    fn non_empty(&self, key: &str, default: String) -> Result<String, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) if raw.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(raw) => Ok(raw.trim().to_string()),
        }
    }
}

fn parse_list(key: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect();

    if items.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(items)
}

fn require_positive(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(())
}
