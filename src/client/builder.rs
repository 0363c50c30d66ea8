use crate::client::core::Client;
use crate::resilience::{CircuitBreakerConfig, ResilienceConfig, RetryConfig};
use crate::{Error, ErrorContext, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.langbase.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    /// Connect timeout, and overall timeout of buffered requests.
    pub timeout: Duration,
    pub proxy_url: Option<String>,
    pub resilience: ResilienceConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            proxy_url: None,
            resilience: ResilienceConfig::default(),
        }
    }
}

/// Builder for creating clients with custom configuration.
///
/// Anything not set explicitly falls back to the environment:
/// - `LANGBASE_API_KEY` (required if [`api_key`](Self::api_key) is not called)
/// - `LANGBASE_BASE_URL` (default `https://api.langbase.com`)
/// - `LANGBASE_TIMEOUT_SECS` (default 30)
/// - `LANGBASE_PROXY_URL`
/// - `LANGBASE_RETRY_MAX_ATTEMPTS`, `LANGBASE_BREAKER_FAILURE_THRESHOLD`,
///   `LANGBASE_BREAKER_RECOVERY_SECS` (only when no resilience setting was given)
#[derive(Debug, Default)]
pub struct ClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    proxy_url: Option<String>,
    resilience: Option<ResilienceConfig>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the API base URL (also used to point at mock servers in tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// Replace the whole resilience configuration.
    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience = Some(config);
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.resilience.get_or_insert_with(ResilienceConfig::default).retry = config;
        self
    }

    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.resilience
            .get_or_insert_with(ResilienceConfig::default)
            .circuit_breaker = Some(config);
        self
    }

    pub fn disable_circuit_breaker(mut self) -> Self {
        self.resilience
            .get_or_insert_with(ResilienceConfig::default)
            .circuit_breaker = None;
        self
    }

    /// When disabled, every request is a single attempt with no breaker.
    pub fn enable_resilience(mut self, enabled: bool) -> Self {
        self.resilience
            .get_or_insert_with(ResilienceConfig::default)
            .enabled = enabled;
        self
    }

    /// Resolve explicit settings and environment fallbacks into a config.
    pub fn build_config(self) -> Result<ClientConfig> {
        let api_key = self
            .api_key
            .or_else(|| env_string("LANGBASE_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "API key is required",
                    ErrorContext::new()
                        .with_field_path("api_key")
                        .with_details("call ClientBuilder::api_key or set LANGBASE_API_KEY")
                        .with_source("client_builder"),
                )
            })?;

        let base_url = self
            .base_url
            .or_else(|| env_string("LANGBASE_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        validate_base_url(&base_url)?;

        let timeout = match self.timeout {
            Some(t) => t,
            None => match env_string("LANGBASE_TIMEOUT_SECS") {
                Some(raw) => raw
                    .parse::<f64>()
                    .ok()
                    .filter(|s| *s > 0.0)
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .ok_or_else(|| {
                        Error::configuration_with_context(
                            "invalid timeout",
                            ErrorContext::new()
                                .with_field_path("LANGBASE_TIMEOUT_SECS")
                                .with_details(raw.clone())
                                .with_source("client_builder"),
                        )
                    })?,
                None => DEFAULT_TIMEOUT,
            },
        };

        let proxy_url = self.proxy_url.or_else(|| env_string("LANGBASE_PROXY_URL"));

        let resilience = match self.resilience {
            Some(cfg) => cfg,
            None => ResilienceConfig::default().with_env_overrides()?,
        };
        resilience.validate()?;

        Ok(ClientConfig {
            api_key,
            base_url,
            timeout,
            proxy_url,
            resilience,
        })
    }

    pub fn build(self) -> Result<Client> {
        Client::with_config(self.build_config()?)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_base_url(raw: &str) -> Result<()> {
    let invalid = |details: String| {
        Error::configuration_with_context(
            "invalid base URL",
            ErrorContext::new()
                .with_field_path("base_url")
                .with_details(details)
                .with_source("client_builder"),
        )
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn explicit_settings_win() {
        let cfg = ClientBuilder::new()
            .api_key("test-api-key")
            .base_url("http://127.0.0.1:8080")
            .timeout(Duration::from_secs(5))
            .retry_config(RetryConfig::new().with_max_attempts(7))
            .disable_circuit_breaker()
            .build_config()
            .unwrap();
        assert_eq!(cfg.api_key, "test-api-key");
        assert_eq!(cfg.base_url, "http://127.0.0.1:8080");
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.resilience.retry.max_attempts, 7);
        assert!(cfg.resilience.circuit_breaker.is_none());
        assert!(cfg.resilience.enabled);
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = ClientBuilder::new()
            .api_key("k")
            .base_url("ftp://example.com")
            .build_config()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = ClientBuilder::new()
            .api_key("k")
            .base_url("not a url")
            .build_config()
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("base_url")
        );
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let err = ClientBuilder::new().api_key("   ").build_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("API key is required"));
    }
}
