//! Centralized Configuration Management
//!
//! Configuration structures shared by the session engine and the transport.
//! Everything is serde-friendly so the CLI can layer it from files and the
//! environment.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{NayouchiError, Result};

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration of the session task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Give up on a reply after this long; `None` waits until reconnection
    #[serde(with = "duration_millis_opt")]
    pub request_timeout: Option<Duration>,
    /// Re-fetch the group right after subscribing to its topic
    pub catch_up_refresh: bool,
    /// Buffer size of the command channel (UI → session task)
    pub command_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)), // event bus default send timeout
            catch_up_refresh: true,
            command_buffer_size: 32,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with short timeouts for tests
    pub fn testing() -> Self {
        Self {
            request_timeout: Some(Duration::from_millis(500)),
            catch_up_refresh: false,
            command_buffer_size: 16,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_buffer_size == 0 {
            return Err(NayouchiError::config_error(
                "session.command_buffer_size must be greater than zero",
            ));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(NayouchiError::config_error(
                "session.request_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// Exponential backoff used by the transport between reconnect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "duration_millis")]
    pub min_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub factor: f64,
    /// Fraction of the delay that is randomized, in `0.0..=1.0`
    pub jitter: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
            jitter: 0.5,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Create a fast policy for tests
    pub fn testing() -> Self {
        Self {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            factor: 2.0,
            jitter: 0.0,
            max_attempts: Some(3),
        }
    }

    /// Delay before attempt number `attempt` (zero-based), before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.factor.max(1.0).powi(attempt.min(32) as i32);
        let millis = (self.min_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Apply jitter given a uniform sample in `[0, 1)`
    pub fn jittered(&self, base: Duration, sample: f64) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let spread = base.as_millis() as f64 * jitter;
        let millis = base.as_millis() as f64 - spread + 2.0 * spread * sample.clamp(0.0, 1.0);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            return Err(NayouchiError::config_error(
                "reconnect.min_delay must not exceed reconnect.max_delay",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(NayouchiError::config_error("reconnect.jitter must be within 0.0..=1.0"));
        }
        if self.factor < 1.0 {
            return Err(NayouchiError::config_error("reconnect.factor must be at least 1.0"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Transport Configuration
// ----------------------------------------------------------------------------

/// Configuration of the event-bus transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Event-bus bridge endpoint, e.g. `ws://localhost:8080/eventbus`
    pub url: String,
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,
    pub auto_reconnect: bool,
    pub reconnect: ReconnectPolicy,
    /// Buffer size of the broadcast channel carrying open/close/push events
    pub event_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/eventbus".to_string(),
            ping_interval: Duration::from_secs(5),
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            event_buffer_size: 128, // pushes can be bursty
        }
    }
}

impl TransportConfig {
    pub fn with_url<T: Into<String>>(mut self, url: T) -> Self {
        self.url = url.into();
        self
    }

    /// Raw WebSocket endpoint of the SockJS bridge
    pub fn websocket_url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| NayouchiError::config_error(format!("Invalid server url {}: {}", self.url, e)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            "http" => url
                .set_scheme("ws")
                .map_err(|_| NayouchiError::config_error("Cannot switch url scheme to ws"))?,
            "https" => url
                .set_scheme("wss")
                .map_err(|_| NayouchiError::config_error("Cannot switch url scheme to wss"))?,
            other => {
                return Err(NayouchiError::config_error(format!(
                    "Unsupported url scheme '{}'",
                    other
                )))
            }
        }

        if !url.path().ends_with("/websocket") {
            let path = format!("{}/websocket", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        self.websocket_url()?;
        if self.ping_interval.is_zero() {
            return Err(NayouchiError::config_error("transport.ping_interval must be greater than zero"));
        }
        if self.event_buffer_size == 0 {
            return Err(NayouchiError::config_error(
                "transport.event_buffer_size must be greater than zero",
            ));
        }
        self.reconnect.validate()
    }
}

// ----------------------------------------------------------------------------
// Serde Helpers
// ----------------------------------------------------------------------------

mod duration_millis {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod duration_millis_opt {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(TransportConfig::default().validate().is_ok());
        assert_eq!(SessionConfig::default().request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(2), Duration::from_secs(4));
        assert_eq!(policy.base_delay(10), Duration::from_secs(5));

        let base = Duration::from_secs(4);
        assert_eq!(policy.jittered(base, 0.0), Duration::from_secs(2));
        assert_eq!(policy.jittered(base, 0.5), Duration::from_secs(4));
        assert!(policy.allows_attempt(1_000));
        assert!(!ReconnectPolicy::testing().allows_attempt(3));
    }

    #[test]
    fn test_websocket_url_normalization() {
        let config = TransportConfig::default().with_url("http://names.example.org/eventbus/");
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "ws://names.example.org/eventbus/websocket"
        );

        let config = TransportConfig::default().with_url("ftp://example.org");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_reconnect_policy() {
        let policy = ReconnectPolicy {
            min_delay: Duration::from_secs(10),
            ..ReconnectPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
