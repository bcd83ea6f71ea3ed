//! Startup configuration, assembled once from the environment and held as
//! shared, immutable state for the life of the process.

use std::time::Duration;

use crate::error::ConfigError;

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Opaque identifier embedded in responses and health checks.
    pub node_id: String,
    /// Redis connection target.
    pub redis_url: String,
    /// Sliding window length, `W` in the design.
    pub window: Duration,
    /// Path to the YAML credentials document.
    pub api_keys_file: String,
    /// When true, the limiter client short-circuits to ALLOW. Benchmarking only.
    pub bypass_limiter: bool,
    /// Redis connection pool size.
    pub redis_pool_size: usize,
    /// Deadline for the admission call.
    pub admission_deadline: Duration,
    /// Deadline for the reconciliation call.
    pub reconcile_deadline: Duration,
    /// HTTP listen address.
    pub bind_addr: String,
    /// Ceiling applied to `max_tokens` when estimating output tokens.
    pub output_token_ceiling: u64,
}

impl Config {
    /// Load configuration from the environment, applying the documented
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| default_node_id());
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned());
        let window = Duration::from_secs(parse_env("WINDOW_SECONDS", 60)?);
        let api_keys_file =
            std::env::var("API_KEYS_FILE").unwrap_or_else(|_| "./api_keys.yaml".to_owned());
        let bypass_limiter = parse_bool_env("BYPASS_LIMITER", false);
        let redis_pool_size = parse_env("REDIS_POOL_SIZE", 16)?;
        let admission_deadline = Duration::from_millis(parse_env("ADMISSION_DEADLINE_MS", 50)?);
        let reconcile_deadline = Duration::from_millis(parse_env("RECONCILE_DEADLINE_MS", 150)?);
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
        let output_token_ceiling = parse_env("OUTPUT_TOKEN_CEILING", 4096)?;

        if window.is_zero() {
            return Err(ConfigError::InvalidEnv {
                var: "WINDOW_SECONDS",
                reason: "must be >= 1".to_owned(),
            });
        }

        Ok(Self {
            node_id,
            redis_url,
            window,
            api_keys_file,
            bypass_limiter,
            redis_pool_size,
            admission_deadline,
            reconcile_deadline,
            bind_addr,
            output_token_ceiling,
        })
    }
}

fn default_node_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "node-unknown".to_owned())
}

fn parse_env<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidEnv {
            var,
            reason: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(var: &'static str, default: bool) -> bool {
    match std::env::var(var) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_env_accepts_common_truthy_forms() {
        // SAFETY-equivalent: single-threaded test, no concurrent env access.
        unsafe { std::env::set_var("RATEWALL_TEST_BOOL", "YES") };
        assert!(parse_bool_env("RATEWALL_TEST_BOOL", false));
        unsafe { std::env::set_var("RATEWALL_TEST_BOOL", "0") };
        assert!(!parse_bool_env("RATEWALL_TEST_BOOL", true));
        unsafe { std::env::remove_var("RATEWALL_TEST_BOOL") };
    }

    #[test]
    fn parse_bool_env_defaults_when_unset() {
        unsafe { std::env::remove_var("RATEWALL_TEST_BOOL_UNSET") };
        assert!(!parse_bool_env("RATEWALL_TEST_BOOL_UNSET", false));
        assert!(parse_bool_env("RATEWALL_TEST_BOOL_UNSET", true));
    }
}
