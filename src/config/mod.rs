//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values.
//! The database URL is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::time::Duration;

use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug)]
pub struct Config {
    /// Postgres backing. `None` selects transient in-memory storage.
    pub database_url: Option<SecretString>,
    pub bind_addr: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub sweep_interval: Duration,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let port = match optional_var("PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("PORT must be a port number: {e}")))?,
            None => DEFAULT_PORT,
        };

        let engine = EngineConfig {
            wait_timeout: millis_var("WAIT_TIMEOUT_MS", 60_000)?,
            poll_interval: millis_var("POLL_INTERVAL_MS", 500)?,
            retention: millis_var("RETENTION_MS", 10_000)?,
            exclusive_claim: bool_var("EXCLUSIVE_CLAIM", false)?,
        };
        engine.validate()?;

        Ok(Self {
            database_url: optional_var("DATABASE_URL").map(SecretString::from),
            bind_addr: optional_var("BIND_ADDR").unwrap_or_else(|| format!("0.0.0.0:{port}")),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            sweep_interval: millis_var("SWEEP_INTERVAL_MS", 5_000)?,
            engine,
        })
    }

    /// The database URL, for commands that only work against Postgres.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn millis_var(name: &str, default: u64) -> Result<Duration> {
    let Some(raw) = optional_var(name) else {
        return Ok(Duration::from_millis(default));
    };
    let ms = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Config(format!("{name} must be a number of milliseconds: {e}")))?;
    if ms == 0 {
        return Err(Error::Config(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_millis(ms))
}

fn bool_var(name: &str, default: bool) -> Result<bool> {
    match optional_var(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(Error::Config(format!("{name} must be a boolean, got {other}"))),
    }
}
