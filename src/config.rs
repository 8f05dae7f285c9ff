//! Relay and client configuration.
//!
//! Defaults match production behavior (1 second polls, 300-iteration cap,
//! 30 second backoff ceiling); tests tighten the intervals through the
//! builder methods instead of waiting out real time.

use std::net::SocketAddr;
use std::time::Duration;

/// Server-side tuning for the subscriber endpoint and demo binaries.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Interval between persisted-state re-reads on a live subscription.
    pub poll_interval: Duration,
    /// Hard cap on timer-elapsed poll iterations before the stream times out.
    pub max_poll_iterations: u32,
    /// Address the demo server binds.
    pub bind_addr: SocketAddr,
    /// SQLite database URL for the durable store, when one is used.
    pub database_url: Option<String>,
}

impl RelayConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_POLL_ITERATIONS: u32 = 300;

    /// Read configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let poll_interval = env_parse::<u64>("FLOWRELAY_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let max_poll_iterations = env_parse::<u32>("FLOWRELAY_MAX_POLL_ITERATIONS")
            .unwrap_or(defaults.max_poll_iterations);
        let bind_addr =
            env_parse::<SocketAddr>("FLOWRELAY_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let database_url = std::env::var("FLOWRELAY_DATABASE_URL").ok();
        Self {
            poll_interval,
            max_poll_iterations,
            bind_addr,
            database_url,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_poll_iterations(mut self, iterations: u32) -> Self {
        self.max_poll_iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_poll_iterations: Self::DEFAULT_MAX_POLL_ITERATIONS,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Reconnection policy for the subscriber client.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub auto_reconnect: bool,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 5;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    /// No automatic reconnection; the first transport error is terminal.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            auto_reconnect: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before reconnect attempt `retry` (zero-based): the base delay
    /// doubled per prior attempt, capped at `max_delay`. No jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..retry {
            delay = delay.saturating_mul(2);
            if delay >= self.max_delay {
                return self.max_delay;
            }
        }
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_delay: Self::DEFAULT_BASE_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_poll_iterations, 300);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..8)
            .map(|retry| policy.backoff_delay(retry).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn backoff_strictly_increases_below_cap() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(250));
        let mut previous = Duration::ZERO;
        for retry in 0..6 {
            let delay = policy.backoff_delay(retry);
            assert!(delay > previous, "retry {retry} did not increase");
            assert_eq!(delay, policy.base_delay * 2u32.pow(retry));
            previous = delay;
        }
    }

    #[test]
    fn backoff_survives_large_retry_counts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1000), RetryPolicy::DEFAULT_MAX_DELAY);
    }

    #[test]
    fn disabled_policy_keeps_other_defaults() {
        let policy = RetryPolicy::disabled();
        assert!(!policy.auto_reconnect);
        assert_eq!(policy.max_retries, RetryPolicy::DEFAULT_MAX_RETRIES);
    }
}
