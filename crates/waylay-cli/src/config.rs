use anyhow::{Context, Result};
use std::env;

/// Operator-facing environment configuration (SPEC_FULL.md §6.3 ambient
/// stack addition). `WAYLAY_*` variables override the worker defaults in
/// `waylay_worker::config`; only `DATABASE_URL` is required.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub worker_name: Option<String>,
    pub queues: Vec<String>,
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub max_run_time_secs: Option<i64>,
    pub sleep_delay_ms: Option<i64>,
    pub read_ahead: Option<i64>,
    pub max_attempts: Option<i32>,
}

impl Config {
    /// Load configuration from environment variables, reading a `.env` file
    /// first if present (development convenience only; real deployments set
    /// these in the process environment directly).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            worker_name: env::var("WAYLAY_WORKER_NAME").ok(),
            queues: env::var("WAYLAY_QUEUES")
                .ok()
                .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default(),
            min_priority: parse_opt("WAYLAY_MIN_PRIORITY")?,
            max_priority: parse_opt("WAYLAY_MAX_PRIORITY")?,
            max_run_time_secs: parse_opt("WAYLAY_MAX_RUN_TIME_SECS")?,
            sleep_delay_ms: parse_opt("WAYLAY_SLEEP_DELAY_MS")?,
            read_ahead: parse_opt("WAYLAY_READ_AHEAD")?,
            max_attempts: parse_opt("WAYLAY_MAX_ATTEMPTS")?,
        })
    }
}

fn parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => Ok(Some(raw.parse().with_context(|| format!("{key} must be a valid number"))?)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_opt_returns_none_for_unset_var() {
        let result: Result<Option<i32>> = parse_opt("WAYLAY_CLI_TEST_DOES_NOT_EXIST");
        assert_eq!(result.unwrap(), None);
    }
}
