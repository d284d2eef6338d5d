use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

/// Application configuration loaded from environment variables.
///
/// The provider API key is optional here: a missing key is reported per
/// request as a configuration error, so the service can still boot and
/// answer health checks.
#[derive(Debug, Clone)]
pub struct Config {
    pub deepseek_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub bundle_ttl: Duration,
    pub max_bundles: usize,
    pub sweep_interval: Duration,
    pub llm_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let bundle_ttl_secs: u64 = env_or("BUNDLE_TTL_SECS", 300)?;
        let max_bundles: usize = env_or("MAX_BUNDLES", 100)?;
        let sweep_interval_secs: u64 = env_or("BUNDLE_SWEEP_INTERVAL_SECS", 30)?;

        ensure!(bundle_ttl_secs > 0, "BUNDLE_TTL_SECS must be at least 1");
        ensure!(max_bundles > 0, "MAX_BUNDLES must be at least 1");
        ensure!(
            sweep_interval_secs > 0,
            "BUNDLE_SWEEP_INTERVAL_SECS must be at least 1"
        );

        Ok(Config {
            deepseek_api_key: optional_env("DEEPSEEK_API_KEY"),
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            bundle_ttl: Duration::from_secs(bundle_ttl_secs),
            max_bundles,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            llm_timeout: Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 120)?),
        })
    }

    pub fn ai_configured(&self) -> bool {
        self.deepseek_api_key.is_some()
    }
}

/// Blank values count as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration with production defaults and the given API key.
    pub fn for_tests(api_key: Option<&str>) -> Self {
        Config {
            deepseek_api_key: api_key.map(str::to_string),
            port: 0,
            rust_log: "debug".to_string(),
            bundle_ttl: Duration::from_secs(300),
            max_bundles: 100,
            sweep_interval: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_uses_default_when_unset() {
        let value: u64 = env_or("GLIXTRON_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("GLIXTRON_TEST_BAD_NUMBER", "five minutes");
        let result: Result<u64> = env_or("GLIXTRON_TEST_BAD_NUMBER", 300);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("GLIXTRON_TEST_BAD_NUMBER"));
    }

    #[test]
    fn test_optional_env_treats_blank_as_unset() {
        std::env::set_var("GLIXTRON_TEST_BLANK_KEY", "   ");
        assert_eq!(optional_env("GLIXTRON_TEST_BLANK_KEY"), None);
    }

    #[test]
    fn test_optional_env_trims_value() {
        std::env::set_var("GLIXTRON_TEST_PADDED_KEY", "  sk-test  ");
        assert_eq!(
            optional_env("GLIXTRON_TEST_PADDED_KEY").as_deref(),
            Some("sk-test")
        );
    }
}
