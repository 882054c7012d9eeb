//! Connection and timeout configuration.

use crate::retry::RetryConfig;
use std::time::Duration;

/// Environment variable holding the connect timeout, in seconds.
pub const ENV_CONNECT_TIMEOUT: &str = "FIREBASE_CONNECT_TIMEOUT";
/// Environment variable holding the request/response timeout, in seconds.
pub const ENV_READ_WRITE_TIMEOUT: &str = "FIREBASE_READWRITE_TIMEOUT";
/// Environment variable holding the stream timeout, in seconds (`0` = none).
pub const ENV_STREAM_TIMEOUT: &str = "FIREBASE_STREAM_TIMEOUT";
/// Environment variable holding the retry count for request/response calls.
pub const ENV_MAX_TRIES: &str = "FIREBASE_MAXTRIES";
/// Environment variable holding the idle connection limit per host.
pub const ENV_MAX_IDLE: &str = "FIREBASE_MAXIDLE";

/// Settings for the HTTP transport.
///
/// Request/response calls and watch streams use separate connection pools:
/// calls are bounded by `read_write_timeout`, streams by `stream_timeout`
/// (unbounded unless set).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub read_write_timeout: Duration,
    /// Upper bound on the lifetime of a watch connection. Servers
    /// occasionally leave an SSE connection open without delivering events;
    /// setting this forces such connections to end.
    pub stream_timeout: Option<Duration>,
    pub max_idle_per_host: usize,
    pub retry: RetryConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(300),
            read_write_timeout: Duration::from_secs(100),
            stream_timeout: None,
            max_idle_per_host: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the `FIREBASE_*` environment variables.
    ///
    /// Missing, empty or unparsable values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `FIREBASE_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str| parse_number::<u64>(lookup(key)).map(Duration::from_secs);

        let stream_timeout = match secs(ENV_STREAM_TIMEOUT) {
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
            None => defaults.stream_timeout,
        };

        let mut retry = defaults.retry;
        if let Some(n) = parse_number::<u32>(lookup(ENV_MAX_TRIES)) {
            retry.max_retries = n;
        }

        Self {
            connect_timeout: secs(ENV_CONNECT_TIMEOUT).unwrap_or(defaults.connect_timeout),
            read_write_timeout: secs(ENV_READ_WRITE_TIMEOUT).unwrap_or(defaults.read_write_timeout),
            stream_timeout,
            max_idle_per_host: parse_number(lookup(ENV_MAX_IDLE))
                .unwrap_or(defaults.max_idle_per_host),
            retry,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_write_timeout(mut self, timeout: Duration) -> Self {
        self.read_write_timeout = timeout;
        self
    }

    pub fn stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_number<N: std::str::FromStr>(value: Option<String>) -> Option<N> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let config = TransportConfig::from_lookup(lookup_from(&[
            (ENV_CONNECT_TIMEOUT, "5"),
            (ENV_READ_WRITE_TIMEOUT, "7"),
            (ENV_STREAM_TIMEOUT, "3600"),
            (ENV_MAX_TRIES, "4"),
            (ENV_MAX_IDLE, "2"),
        ]));

        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_write_timeout, Duration::from_secs(7));
        assert_eq!(config.stream_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.max_idle_per_host, 2);
    }

    #[test]
    fn test_missing_and_unparsable_keep_defaults() {
        let config = TransportConfig::from_lookup(lookup_from(&[
            (ENV_CONNECT_TIMEOUT, "zzzz"),
            (ENV_MAX_IDLE, ""),
        ]));
        let defaults = TransportConfig::default();

        assert_eq!(config.connect_timeout, defaults.connect_timeout);
        assert_eq!(config.read_write_timeout, defaults.read_write_timeout);
        assert_eq!(config.max_idle_per_host, defaults.max_idle_per_host);
        assert_eq!(config.stream_timeout, None);
    }

    #[test]
    fn test_zero_stream_timeout_means_none() {
        let config = TransportConfig::from_lookup(lookup_from(&[(ENV_STREAM_TIMEOUT, "0")]));
        assert_eq!(config.stream_timeout, None);
    }
}
