//! Connection settings for the HTTP workflow backend

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Where the workflow service lives and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpBackendConfig {
    /// Service root, e.g. `https://example.com/api`
    pub base_url: String,
    /// Per-request timeout; a timed out save surfaces as a transport error
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sent as a bearer token when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auth_token: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Absolute URL of a service path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: HttpBackendConfig =
            serde_json::from_str(r#"{"baseUrl": "http://localhost:9000/"}"#).unwrap();
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.auth_token, None);
        assert_eq!(
            config.url("/workflows/3/graph"),
            "http://localhost:9000/workflows/3/graph"
        );
    }

    #[test]
    fn test_token_not_serialized_when_absent() {
        let json = serde_json::to_value(HttpBackendConfig::new("http://a")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"baseUrl": "http://a", "timeoutMs": 30000})
        );
    }
}
