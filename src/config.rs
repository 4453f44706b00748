//! Runtime configuration read from the environment.
//!
//! `main` calls `dotenvy::dotenv()` first, so every variable below may also
//! come from a `.env` file in the working directory.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

/// Longest grace period accepted for `PAYMENT_GRACE_DAYS`.
pub const MAX_PAYMENT_GRACE_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
    /// PostgreSQL connection string. When absent the in-memory store is used.
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Days after the appointment date before an unpaid payment is due.
    pub payment_grace_days: i64,
    /// Interval of the overdue payment sweep; `None` disables it.
    pub overdue_sweep_interval: Option<Duration>,
    pub seed_demo_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            max_connections: 10,
            payment_grace_days: 0,
            overdue_sweep_interval: Some(Duration::from_secs(3600)),
            seed_demo_data: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so tests need not touch
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let sweep_secs: u64 = parse_or("OVERDUE_SWEEP_SECS", &lookup, 3600)?;
        let payment_grace_days: i64 =
            parse_or("PAYMENT_GRACE_DAYS", &lookup, defaults.payment_grace_days)?;
        if !(0..=MAX_PAYMENT_GRACE_DAYS).contains(&payment_grace_days) {
            bail!(
                "PAYMENT_GRACE_DAYS must be between 0 and {MAX_PAYMENT_GRACE_DAYS}, got {payment_grace_days}"
            );
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", &lookup, defaults.max_connections)?,
            payment_grace_days,
            overdue_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            seed_demo_data: parse_or("SEED_DEMO_DATA", &lookup, defaults.seed_demo_data)?,
        })
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}
