/// Configuration for the API server
///
/// Loaded from environment variables, with a `.env` file honored in
/// development. The core library never reads the environment; everything it
/// needs is passed in from here.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated origins, or `*` (default: `*`)
/// - `PRODUCTION`: `true` enables JSON logs and requires a durable key source
/// - `KEYS_SECRET_ID`: AWS Secrets Manager secret holding the signing keys
/// - `KEYS_FILE`: PEM file holding a single signing key
/// - `KEY_EXPIRATION_HOURS`: Signing key lifetime (default: 720)
/// - `SESSION_TTL_MINUTES`: Issued token lifetime (default: 60)
///
/// When neither `KEYS_SECRET_ID` nor `KEYS_FILE` is set, keys live in memory
/// and every restart invalidates outstanding tokens.
///
/// # Example
///
/// ```no_run
/// use launchpad_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::path::PathBuf;

use chrono::Duration;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub keys: KeysConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// `["*"]` allows any origin
    pub cors_origins: Vec<String>,

    pub production: bool,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[redacted]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Where signing keys are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySourceConfig {
    SecretsManager { secret_id: String },
    File { path: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct KeysConfig {
    pub source: KeySourceConfig,
    pub expiration_hours: i64,
}

impl KeysConfig {
    pub fn expiration(&self) -> Duration {
        Duration::hours(self.expiration_hours)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::minutes(self.ttl_minutes)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is not valid: {}", name, e)),
        _ => Ok(default),
    }
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not
    /// parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let production = parse_or(&lookup, "PRODUCTION", false)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        let source = match (lookup("KEYS_SECRET_ID"), lookup("KEYS_FILE")) {
            (Some(secret_id), _) if !secret_id.is_empty() => KeySourceConfig::SecretsManager { secret_id },
            (_, Some(path)) if !path.is_empty() => KeySourceConfig::File { path: path.into() },
            _ if production => {
                anyhow::bail!("KEYS_SECRET_ID or KEYS_FILE is required in production")
            }
            _ => KeySourceConfig::Memory,
        };

        let expiration_hours = parse_or(&lookup, "KEY_EXPIRATION_HOURS", 720i64)?;
        if expiration_hours <= 0 {
            anyhow::bail!("KEY_EXPIRATION_HOURS must be positive");
        }

        let ttl_minutes = parse_or(&lookup, "SESSION_TTL_MINUTES", 60i64)?;
        if ttl_minutes <= 0 {
            anyhow::bail!("SESSION_TTL_MINUTES must be positive");
        }

        Ok(Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 8080u16)?,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?,
            },
            keys: KeysConfig {
                source,
                expiration_hours,
            },
            session: SessionConfig { ttl_minutes },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}
