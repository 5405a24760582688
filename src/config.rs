use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Bounded retry schedule for the identity check.
///
/// Attempt `n` (1-based) waits `base_delay * n` before retrying, so the
/// default schedule is 1s, then 2s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Never retry.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// mArchive client configuration.
///
/// The only required field is the server origin; everything else has a
/// default and a `with_*` override.
///
/// ```rust,ignore
/// use marchive_client::ClientConfig;
///
/// let config = ClientConfig::new("https://library.example.com".parse()?)
///     .with_max_refresh_failures(5);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_base: Url,
    pub(crate) timeout: Duration,
    pub(crate) max_refresh_failures: u32,
    pub(crate) identity_retry: RetryPolicy,
    pub(crate) user_agent: String,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_REFRESH_FAILURES: u32 = 3;

    /// Create a configuration for the server at `api_url`.
    ///
    /// Requests go to `{api_url}/api/...`.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_base: api_base(&api_url),
            timeout: Self::DEFAULT_TIMEOUT,
            max_refresh_failures: Self::DEFAULT_MAX_REFRESH_FAILURES,
            identity_retry: RetryPolicy::default(),
            user_agent: concat!("marchive-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `MARCHIVE_API_URL`: server origin (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `MARCHIVE_TIMEOUT_SECS`: per-request timeout in seconds
    /// - `MARCHIVE_MAX_REFRESH_FAILURES`: consecutive refresh failures before the
    ///   guard stops refreshing
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is missing or any value fails to parse.
    pub fn from_env() -> Result<Self, Error> {
        let url_str = std::env::var("MARCHIVE_API_URL")
            .map_err(|_| Error::Config("MARCHIVE_API_URL is required".into()))?;
        let api_url: Url = url_str
            .parse()
            .map_err(|e| Error::Config(format!("MARCHIVE_API_URL: {e}")))?;

        let mut config = Self::new(api_url);

        if let Ok(secs) = std::env::var("MARCHIVE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("MARCHIVE_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Ok(max) = std::env::var("MARCHIVE_MAX_REFRESH_FAILURES") {
            let max: u32 = max
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("MARCHIVE_MAX_REFRESH_FAILURES: {e}")))?;
            config = config.with_max_refresh_failures(max);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_refresh_failures(mut self, max: u32) -> Self {
        self.max_refresh_failures = max;
        self
    }

    #[must_use]
    pub fn with_identity_retry(mut self, policy: RetryPolicy) -> Self {
        self.identity_retry = policy;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Base URL every request path is appended to (ends in `/api`).
    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn max_refresh_failures(&self) -> u32 {
        self.max_refresh_failures
    }

    #[must_use]
    pub fn identity_retry(&self) -> RetryPolicy {
        self.identity_retry
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

fn api_base(api_url: &Url) -> Url {
    let mut base = api_url.clone();
    let path = format!("{}/api", api_url.path().trim_end_matches('/'));
    base.set_path(&path);
    base.set_query(None);
    base.set_fragment(None);
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_appends_api_segment() {
        let config = ClientConfig::new("https://library.example.com".parse().unwrap());
        assert_eq!(config.api_base().as_str(), "https://library.example.com/api");

        let config = ClientConfig::new("https://example.com/marchive/".parse().unwrap());
        assert_eq!(config.api_base().as_str(), "https://example.com/marchive/api");
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://localhost:8080".parse().unwrap());
        assert_eq!(config.timeout(), ClientConfig::DEFAULT_TIMEOUT);
        assert_eq!(config.max_refresh_failures(), 3);
        assert_eq!(config.identity_retry(), RetryPolicy::default());
        assert!(config.user_agent().starts_with("marchive-client/"));
    }

    #[test]
    fn retry_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }

    #[test]
    fn from_env_requires_url() {
        temp_env::with_var_unset("MARCHIVE_API_URL", || {
            let err = ClientConfig::from_env().unwrap_err();
            assert!(matches!(err, Error::Config(msg) if msg.contains("MARCHIVE_API_URL")));
        });
    }

    #[test]
    fn from_env_reads_overrides() {
        temp_env::with_vars(
            [
                ("MARCHIVE_API_URL", Some("http://10.0.0.5:9000")),
                ("MARCHIVE_TIMEOUT_SECS", Some("5")),
                ("MARCHIVE_MAX_REFRESH_FAILURES", Some("1")),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.api_base().as_str(), "http://10.0.0.5:9000/api");
                assert_eq!(config.timeout(), Duration::from_secs(5));
                assert_eq!(config.max_refresh_failures(), 1);
            },
        );
    }

    #[test]
    fn from_env_rejects_bad_numbers() {
        temp_env::with_vars(
            [
                ("MARCHIVE_API_URL", Some("http://localhost")),
                ("MARCHIVE_TIMEOUT_SECS", Some("soon")),
                ("MARCHIVE_MAX_REFRESH_FAILURES", None),
            ],
            || {
                let err = ClientConfig::from_env().unwrap_err();
                assert!(matches!(err, Error::Config(msg) if msg.contains("MARCHIVE_TIMEOUT_SECS")));
            },
        );
    }
}
