// src/config.rs
use chrono::{FixedOffset, Offset, Utc};
use log::LevelFilter;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Consent string the data provider expects when its terms are accepted.
pub const DEFAULT_CONSENT: &str = "tôi đồng ý";
pub const DEFAULT_PROVIDER_URL: &str = "https://apipubaws.tcbs.com.vn";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseUrl,
    pub session: SessionConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
    /// URL prefix pages use to reference assets.
    pub assets_root: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    Memory,
    Scylla(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_hours: i64,
    /// Whether the register form may create admins.
    pub allow_admin_signup: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub consent: String,
    pub market_offset: FixedOffset,
    pub intraday_page_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            consent: DEFAULT_CONSENT.to_string(),
            market_offset: hours_offset(7).unwrap_or_else(|| Utc.fix()),
            intraday_page_size: 5000,
        }
    }
}

impl Config {
    /// Reads the process environment; `main` loads `.env` into it first.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("SECRET_KEY").unwrap_or_default();
        if secret.trim().is_empty() {
            return Err(ConfigError::Missing("SECRET_KEY"));
        }

        let offset_hours: i32 = parse_env("MARKET_UTC_OFFSET_HOURS", 7)?;
        let market_offset = hours_offset(offset_hours).ok_or(ConfigError::Invalid {
            key: "MARKET_UTC_OFFSET_HOURS",
            value: offset_hours.to_string(),
        })?;

        Ok(Config {
            server: ServerConfig {
                bind: parse_env("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3030)))?,
                static_dir: PathBuf::from(
                    env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
                ),
                assets_root: env::var("ASSETS_ROOT")
                    .unwrap_or_else(|_| "/static/assets".to_string()),
            },
            database: DatabaseUrl::parse(
                &env::var("DATABASE_URL").unwrap_or_else(|_| "memory://".to_string()),
            )?,
            session: SessionConfig {
                secret,
                ttl_hours: parse_env("SESSION_TTL_HOURS", 12)?,
                allow_admin_signup: parse_env("ALLOW_ADMIN_SIGNUP", true)?,
            },
            provider: ProviderConfig {
                base_url: env::var("PROVIDER_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_PROVIDER_URL.to_string()),
                // The provider refuses to run without this; default it rather than fail.
                consent: env::var("ACCEPT_TC").unwrap_or_else(|_| DEFAULT_CONSENT.to_string()),
                market_offset,
                intraday_page_size: parse_env("INTRADAY_PAGE_SIZE", 5000)?,
            },
        })
    }

    /// Log level from `LOG_LEVEL`, read before the rest of the config.
    pub fn log_level() -> LevelFilter {
        env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| LevelFilter::from_str(&v).ok())
            .unwrap_or(LevelFilter::Info)
    }
}

impl DatabaseUrl {
    /// Accepts `memory://` or `scylla://host:port[,host:port...]`.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            key: "DATABASE_URL",
            value: url.to_string(),
        };
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        match scheme {
            "memory" => Ok(DatabaseUrl::Memory),
            "scylla" | "cassandra" => {
                let nodes: Vec<String> = rest
                    .trim_end_matches('/')
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect();
                if nodes.is_empty() {
                    return Err(invalid());
                }
                Ok(DatabaseUrl::Scylla(nodes))
            }
            _ => Err(invalid()),
        }
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Invalid { key, value })
        }
        Err(_) => Ok(default),
    }
}

fn hours_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}
