use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Minimum signing secret length accepted by `cookie::Key`.
pub const MIN_SECRET_LEN: usize = 64;

const DEFAULT_SESSION_TTL: &str = "14days";
const DEFAULT_PURGE_INTERVAL: &str = "10m";
const DEFAULT_RATE_LIMIT_PERIOD: &str = "100ms";
const DEFAULT_RATE_LIMIT_BURST: u32 = 30;

#[derive(Debug, Parser)]
#[command(
    name = "world-api",
    version,
    about = "Session-authenticated JSON API over the world dataset"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Apply the bundled `users`/`sessions` migrations before serving.
    #[arg(long)]
    pub migrate: bool,
}

#[derive(Debug)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub run_migrations: bool,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub database: String,
    pub max_connections: u32,
}

#[derive(Debug)]
pub struct SessionConfig {
    pub ttl: Duration,
    /// How often expired records are swept from the backend.
    pub purge_interval: Duration,
    pub backend: SessionBackendKind,
    pub secret: Option<SecretString>,
}

/// Token bucket: one request is replenished every `period`, up to `burst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub period: Duration,
    pub burst: u32,
    /// Separate bucket per client IP instead of one shared bucket.
    pub per_client: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            burst: DEFAULT_RATE_LIMIT_BURST,
            per_client: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackendKind {
    Mysql,
    Memory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("missing database setting {0} (set it in the config file or the environment)")]
    MissingDatabaseField(&'static str),
    #[error("invalid duration for {key}: {value}: {source}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        source: humantime::DurationError,
    },
    #[error("session secret must be at least {min} bytes, got {0}", min = MIN_SECRET_LEN)]
    SecretTooShort(usize),
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    run_migrations: Option<bool>,
    #[serde(default)]
    database: FileDatabaseConfig,
    #[serde(default)]
    session: FileSessionConfig,
    #[serde(default)]
    rate_limit: FileRateLimitConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabaseConfig {
    #[serde(alias = "host")]
    hostname: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    #[serde(alias = "name")]
    database: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSessionConfig {
    ttl: Option<String>,
    purge_interval: Option<String>,
    backend: Option<SessionBackendKind>,
}

#[derive(Debug, Default, Deserialize)]
struct FileRateLimitConfig {
    period: Option<String>,
    burst: Option<u32>,
    per_client: Option<bool>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;
        resolve(cli, from_file, &|key: &str| std::env::var(key).ok())
    }
}

impl DatabaseConfig {
    /// sqlx connect options; the password is only exposed here.
    pub fn connect_options(&self) -> sqlx::mysql::MySqlConnectOptions {
        sqlx::mysql::MySqlConnectOptions::new()
            .host(&self.hostname)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .database(&self.database)
            .charset("utf8mb4")
    }
}

fn resolve(
    cli: Cli,
    file: FileConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let bind = cli
        .bind
        .or(file.bind)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 4000)));

    let env_migrate = env("WORLD_API_MIGRATE")
        .map(|raw| parse_bool_value("WORLD_API_MIGRATE", &raw))
        .transpose()?;
    let run_migrations =
        cli.migrate || env_migrate.or(file.run_migrations).unwrap_or(false);

    let database = resolve_database(file.database, env)?;
    let session = resolve_session(file.session, env)?;
    let rate_limit = resolve_rate_limit(file.rate_limit, env)?;

    Ok(AppConfig {
        bind,
        run_migrations,
        database,
        session,
        rate_limit,
    })
}

fn resolve_database(
    file: FileDatabaseConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<DatabaseConfig, ConfigError> {
    let hostname = env("DB_HOSTNAME")
        .or(file.hostname)
        .ok_or(ConfigError::MissingDatabaseField("DB_HOSTNAME"))?;
    let port = match env("DB_PORT") {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: String::from("DB_PORT"),
            value: raw,
        })?,
        None => file.port.unwrap_or(3306),
    };
    let username = env("DB_USERNAME")
        .or(file.username)
        .ok_or(ConfigError::MissingDatabaseField("DB_USERNAME"))?;
    let password = env("DB_PASSWORD").or(file.password).unwrap_or_default();
    let database = env("DB_DATABASE")
        .or(file.database)
        .ok_or(ConfigError::MissingDatabaseField("DB_DATABASE"))?;

    Ok(DatabaseConfig {
        hostname,
        port,
        username,
        password: SecretString::from(password),
        database,
        max_connections: file.max_connections.unwrap_or(5).max(1),
    })
}

fn resolve_session(
    file: FileSessionConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<SessionConfig, ConfigError> {
    let ttl = parse_duration_value(
        "SESSION_TTL",
        env("SESSION_TTL").or(file.ttl).as_deref(),
        DEFAULT_SESSION_TTL,
    )?;
    let purge_interval = parse_duration_value(
        "SESSION_PURGE_INTERVAL",
        env("SESSION_PURGE_INTERVAL")
            .or(file.purge_interval)
            .as_deref(),
        DEFAULT_PURGE_INTERVAL,
    )?
    .max(Duration::from_secs(1));

    let backend = match env("SESSION_BACKEND") {
        Some(raw) => parse_backend(&raw)?,
        None => file.backend.unwrap_or(SessionBackendKind::Mysql),
    };

    let secret = match env("SESSION_SECRET").filter(|value| !value.is_empty()) {
        Some(value) if value.len() < MIN_SECRET_LEN => {
            return Err(ConfigError::SecretTooShort(value.len()))
        }
        Some(value) => Some(SecretString::from(value)),
        None => None,
    };

    Ok(SessionConfig {
        ttl,
        purge_interval,
        backend,
        secret,
    })
}

fn resolve_rate_limit(
    file: FileRateLimitConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<RateLimitConfig, ConfigError> {
    let period = parse_duration_value(
        "RATE_LIMIT_PERIOD",
        env("RATE_LIMIT_PERIOD").or(file.period).as_deref(),
        DEFAULT_RATE_LIMIT_PERIOD,
    )?
    .max(Duration::from_millis(1));
    let burst = match env("RATE_LIMIT_BURST") {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: String::from("RATE_LIMIT_BURST"),
            value: raw,
        })?,
        None => file.burst.unwrap_or(DEFAULT_RATE_LIMIT_BURST),
    }
    .max(1);
    let per_client = match env("RATE_LIMIT_PER_CLIENT") {
        Some(raw) => parse_bool_value("RATE_LIMIT_PER_CLIENT", &raw)?,
        None => file.per_client.unwrap_or(true),
    };

    Ok(RateLimitConfig {
        period,
        burst,
        per_client,
    })
}

fn parse_duration_value(
    key: &'static str,
    raw: Option<&str>,
    default: &str,
) -> Result<Duration, ConfigError> {
    let value = raw.unwrap_or(default);
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        key,
        value: String::from(value),
        source,
    })
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse_backend(raw: &str) -> Result<SessionBackendKind, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "mysql" => Ok(SessionBackendKind::Mysql),
        "memory" => Ok(SessionBackendKind::Memory),
        _ => Err(ConfigError::InvalidValue {
            key: String::from("SESSION_BACKEND"),
            value: String::from(raw),
        }),
    }
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: String::from(key),
            value: String::from(raw),
        }),
    }
}
