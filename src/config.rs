use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dotenvy::dotenv;

use crate::payroll::calc::AllowancePolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    // Store access
    pub db_max_connections: u32,
    pub request_timeout_secs: u64,
    pub save_retries: u32,

    // Payment listing cache
    pub list_cache_ttl_secs: u64,
    pub list_cache_capacity: u64,

    // Payroll policy
    pub allowance_policy: AllowancePolicy,

    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key).with_context(|| format!("{key} must be set"))
        };

        let allowance_policy = AllowancePolicy {
            hra_percent: parsed(&lookup, "HRA_PERCENT", 50.0)?,
            conveyance_percent: parsed(&lookup, "CONVEYANCE_PERCENT", 10.0)?,
        };
        if !allowance_policy.is_valid() {
            bail!(
                "HRA_PERCENT and CONVEYANCE_PERCENT must be finite, non-negative and add up to at most 100"
            );
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            rate_protected_per_min: parsed(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            request_timeout_secs: parsed(&lookup, "REQUEST_TIMEOUT_SECS", 10)?,
            save_retries: parsed(&lookup, "SAVE_RETRIES", 1)?,

            list_cache_ttl_secs: parsed(&lookup, "LIST_CACHE_TTL_SECS", 30)?,
            list_cache_capacity: parsed(&lookup, "LIST_CACHE_CAPACITY", 1_000)?,

            allowance_policy,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "debug".to_string()),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}
