//! Session Identity

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Agent session identifier, sent as both session fields of a message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// New id of the form `session_<unix millis>`
    pub fn new() -> Self {
        Self(format!("session_{}", Utc::now().timestamp_millis()))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("session_"));
        assert!(id.as_str()["session_".len()..].parse::<i64>().is_ok());
    }
}
