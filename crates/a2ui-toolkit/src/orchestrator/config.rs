//! Configuration for generation orchestration.

use std::env;
use std::time::Duration;
use tracing::warn;

/// Configuration for [`GenerationOrchestrator`](super::GenerationOrchestrator).
///
/// # Examples
///
/// ```
/// use a2ui_toolkit::orchestrator::OrchestratorConfig;
/// use std::time::Duration;
///
/// let config = OrchestratorConfig::default()
///     .with_remote("http://ui-agent:8080", "secret")
///     .with_timeout(Duration::from_secs(10));
///
/// assert!(config.has_remote());
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Base URL of the remote UI agent.
    ///
    /// Remote generation is used only when both this and
    /// [`remote_api_key`](Self::remote_api_key) are set.
    ///
    /// **Default:** `None`
    pub remote_base_url: Option<String>,

    /// Bearer token sent to the remote UI agent.
    ///
    /// **Default:** `None`
    pub remote_api_key: Option<String>,

    /// Hard limit for one remote attempt.
    ///
    /// When it elapses, only the in-flight call is cancelled. The retry loop
    /// moves on to the next attempt or gives up.
    ///
    /// **Default:** 30 seconds
    pub timeout: Duration,

    /// Number of remote attempts, including the first one.
    ///
    /// **Backoff:** the delay before attempt `n > 1` is
    /// `min(1000 * 2^(n-2), 10000)` ms, so three attempts wait 1 s then 2 s.
    ///
    /// **Default:** 3
    pub max_retries: u32,

    /// Return a text-only fallback payload when remote attempts are exhausted.
    ///
    /// With this disabled, the orchestrator returns
    /// [`A2uiError::RemoteDelegation`](crate::A2uiError::RemoteDelegation) instead.
    ///
    /// **Default:** `true`
    pub enable_fallback: bool,

    /// Limit for the remote health check.
    ///
    /// **Default:** 5 seconds
    pub health_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            remote_base_url: None,
            remote_api_key: None,
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
            enable_fallback: true,
            health_timeout: Duration::from_millis(5_000),
        }
    }
}

impl OrchestratorConfig {
    /// Reads the configuration from the process environment.
    ///
    /// - `REMOTE_UI_AGENT_URL`, `REMOTE_UI_AGENT_API_KEY`
    /// - `A2UI_TIMEOUT` (milliseconds), `A2UI_MAX_RETRIES`
    /// - `A2UI_ENABLE_FALLBACK` (`false` disables)
    ///
    /// Values that fail to parse keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.remote_base_url = lookup("REMOTE_UI_AGENT_URL").filter(|v| !v.trim().is_empty());
        config.remote_api_key =
            lookup("REMOTE_UI_AGENT_API_KEY").filter(|v| !v.trim().is_empty());

        if let Some(raw) = lookup("A2UI_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %raw, "Ignoring unparseable A2UI_TIMEOUT"),
            }
        }
        if let Some(raw) = lookup("A2UI_MAX_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.max_retries = n,
                _ => warn!(value = %raw, "Ignoring unparseable A2UI_MAX_RETRIES"),
            }
        }
        if let Some(raw) = lookup("A2UI_ENABLE_FALLBACK") {
            config.enable_fallback = !raw.trim().eq_ignore_ascii_case("false");
        }

        config
    }

    pub fn with_remote(mut self, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.remote_base_url = Some(base_url.into());
        self.remote_api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enable_fallback = enabled;
        self
    }

    /// Both endpoint and credential are configured.
    pub fn has_remote(&self) -> bool {
        self.remote_base_url.is_some() && self.remote_api_key.is_some()
    }
}
