//! Stream Transport Configuration

use std::time::Duration;

use agent_core::{AgentError, Result};
use reqwest::Url;

/// Path of the streaming run endpoint on the agent-serving backend
pub const DEFAULT_STREAM_PATH: &str = "/api/ai/agent/run/stream";

/// Delay between seeing `message_end` and tearing the connection down
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(100);

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Transport configuration
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Backend base URL
    pub base_url: String,

    /// Streaming endpoint path, appended to `base_url`
    pub stream_path: String,

    /// Grace delay before canceling the request after a terminal frame, so
    /// listeners finish handling it first
    pub close_grace: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            stream_path: DEFAULT_STREAM_PATH.into(),
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl StreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Read `AGENT_BASE_URL` and `AGENT_CLOSE_GRACE_MS`, falling back to defaults
    pub fn from_env() -> Self {
        let base_url = std::env::var("AGENT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let close_grace = std::env::var("AGENT_CLOSE_GRACE_MS")
            .ok()
            .and_then(|ms| ms.parse().ok())
            .map_or(DEFAULT_CLOSE_GRACE, Duration::from_millis);

        Self {
            base_url,
            close_grace,
            ..Default::default()
        }
    }

    pub const fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Full URL of the streaming endpoint
    pub fn endpoint(&self) -> Result<Url> {
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| AgentError::Config(format!("invalid endpoint {raw:?}: {e}")))
    }
}
