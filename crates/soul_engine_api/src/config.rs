use std::time::Duration;

use crate::url::{resolve_http_host, DEFAULT_WS_HOST};

/// Transport configuration for token requests.
#[derive(Debug, Clone)]
pub struct SoulEngineApiConfig {
    /// Base HTTP host; `/auth/token` is appended to it.
    pub http_host: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl Default for SoulEngineApiConfig {
    fn default() -> Self {
        Self {
            http_host: resolve_http_host(DEFAULT_WS_HOST, None),
            user_agent: None,
            timeout: None,
        }
    }
}

impl SoulEngineApiConfig {
    pub fn new(http_host: impl Into<String>) -> Self {
        Self {
            http_host: http_host.into(),
            ..Self::default()
        }
    }

    /// Derives the HTTP host from the websocket host unless one is given explicitly.
    pub fn for_hosts(ws_host: &str, http_host: Option<&str>) -> Self {
        Self::new(resolve_http_host(ws_host, http_host))
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::SoulEngineApiConfig;

    #[test]
    fn default_config_targets_local_engine() {
        let config = SoulEngineApiConfig::default();
        assert_eq!(config.http_host, "http://localhost:4000");
        assert!(config.timeout.is_none());
    }

    #[test]
    fn for_hosts_prefers_explicit_http_host() {
        let config = SoulEngineApiConfig::for_hosts("wss://engine.example", Some("https://api.example/"))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.http_host, "https://api.example");
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }
}
