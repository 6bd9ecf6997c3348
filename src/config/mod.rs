//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default staleness window: a completed response is fresh for 30 seconds.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_millis(30_000);

/// Default number of results an entry listener buffers per subscriber.
pub const DEFAULT_LISTENER_CAPACITY: usize = 16;

/// Default number of completions the engine broadcast buffers per subscriber.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Tunables for a [`RequestEngine`](crate::engine::RequestEngine).
///
/// Every field has a default, so hosts can deserialize a partial JSON object:
///
/// ```
/// use std::time::Duration;
/// use reqcache::config::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{ "stale_after_ms": 5000 }"#).unwrap();
/// assert_eq!(config.stale_after, Duration::from_secs(5));
/// assert_eq!(config.listener_capacity, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a completed response stays fresh before the next `send` re-issues the call.
    #[serde(rename = "stale_after_ms", with = "millis")]
    pub stale_after: Duration,
    pub listener_capacity: usize,
    pub broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            listener_capacity: DEFAULT_LISTENER_CAPACITY,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stale_after(mut self, window: Duration) -> Self {
        self.stale_after = window;
        self
    }

    /// Sets the per-entry listener buffer. Zero is raised to one.
    #[must_use]
    pub fn listener_capacity(mut self, capacity: usize) -> Self {
        self.listener_capacity = capacity.max(1);
        self
    }

    /// Sets the engine broadcast buffer. Zero is raised to one.
    #[must_use]
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(30));
        assert_eq!(config.listener_capacity, DEFAULT_LISTENER_CAPACITY);
        assert_eq!(config.broadcast_capacity, DEFAULT_BROADCAST_CAPACITY);
    }

    #[test]
    fn builder_clamps_zero_capacities() {
        let config = EngineConfig::new()
            .stale_after(Duration::from_millis(250))
            .listener_capacity(0)
            .broadcast_capacity(0);
        assert_eq!(config.stale_after, Duration::from_millis(250));
        assert_eq!(config.listener_capacity, 1);
        assert_eq!(config.broadcast_capacity, 1);
    }

    #[test]
    fn deserialize_full_object() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "stale_after_ms": 1000, "listener_capacity": 2, "broadcast_capacity": 3 }"#,
        )
        .unwrap();
        assert_eq!(
            config,
            EngineConfig::new()
                .stale_after(Duration::from_secs(1))
                .listener_capacity(2)
                .broadcast_capacity(3)
        );
    }

    #[test]
    fn deserialize_rejects_negative_window() {
        let result: Result<EngineConfig, _> = serde_json::from_str(r#"{ "stale_after_ms": -1 }"#);
        assert!(result.is_err());
    }
}
