// ABOUTME: Session configuration with defaults and builder-style setters
// ABOUTME: Validated once when the session is built; invalid limits never reach the rate gate

use crate::session::error::ConfigError;
use crate::session::types::{BindCredentials, BindType};
use std::time::Duration;

/// What `Stream::push` does when the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room
    #[default]
    Block,
    /// Evict the oldest unread item
    DropOldest,
}

/// Exponential backoff between connection attempts.
///
/// `delay(r) = min(initial * factor^r, max)`
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

impl BackoffConfig {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor,
        }
    }

    /// Delay before retry number `retries` (0-based).
    pub fn delay(&self, retries: u32) -> Duration {
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        let nanos = self.initial.as_nanos() as f64 * self.factor.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(nanos as u64)
    }
}

/// Grace periods observed by `Session::stop`.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Pause between closing engine sessions and closing the streams, so a
    /// PDU already being handled can still push.
    pub drain_delay: Duration,
    /// Pause before closing the response sink.
    pub sink_grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_delay: Duration::from_secs(1),
            sink_grace: Duration::from_secs(1),
        }
    }
}

/// Configuration for one gateway session.
///
/// # Example
///
/// ```rust
/// use smpp_session::session::{BindCredentials, BindType, SessionConfig};
/// use std::time::Duration;
///
/// let config = SessionConfig::new("zain", BindType::Transceiver, BindCredentials::new(
///     "smsc.example.com:2775",
///     "system_id",
///     "password",
/// ))
/// .with_rate_limit(50.0, 10)
/// .with_max_outstanding(20)
/// .with_max_retries(5)
/// .with_enquire_link(Duration::from_secs(30));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway name, used in logs, gateway history and metrics labels
    pub gateway: String,
    pub bind_type: BindType,
    pub credentials: BindCredentials,
    /// Sustained submissions per second
    pub rate_limit: f64,
    /// Submissions admitted back to back before the rate applies
    pub burst_limit: u32,
    /// Submissions awaiting submit_sm_resp at any instant
    pub max_outstanding: usize,
    /// Whether `max_outstanding` is enforced
    pub has_outstanding: bool,
    /// Connection retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    pub enquire_link: Duration,
    pub read_timeout: Duration,
    pub rebind_interval: Duration,
    /// Buffer size of the delivery and resend streams
    pub stream_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub shutdown: ShutdownConfig,
}

impl SessionConfig {
    pub fn new(gateway: impl Into<String>, bind_type: BindType, credentials: BindCredentials) -> Self {
        Self {
            gateway: gateway.into(),
            bind_type,
            credentials,
            rate_limit: 10.0,
            burst_limit: 1,
            max_outstanding: 10,
            has_outstanding: false,
            max_retries: 3,
            backoff: BackoffConfig::default(),
            enquire_link: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            rebind_interval: Duration::from_secs(600),
            stream_capacity: 50,
            overflow_policy: OverflowPolicy::Block,
            shutdown: ShutdownConfig::default(),
        }
    }

    pub fn with_rate_limit(mut self, per_second: f64, burst: u32) -> Self {
        self.rate_limit = per_second;
        self.burst_limit = burst;
        self
    }

    /// Enable outstanding-window enforcement with the given size.
    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.max_outstanding = max_outstanding;
        self.has_outstanding = true;
        self
    }

    pub fn with_has_outstanding(mut self, has_outstanding: bool) -> Self {
        self.has_outstanding = has_outstanding;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_enquire_link(mut self, interval: Duration) -> Self {
        self.enquire_link = interval;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_rebind_interval(mut self, interval: Duration) -> Self {
        self.rebind_interval = interval;
        self
    }

    pub fn with_streams(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.stream_capacity = capacity;
        self.overflow_policy = policy;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownConfig) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.is_empty() {
            return Err(ConfigError::Gateway);
        }
        if !(self.rate_limit > 0.0) || !self.rate_limit.is_finite() {
            return Err(ConfigError::RateLimit(self.rate_limit));
        }
        if self.burst_limit == 0 {
            return Err(ConfigError::BurstLimit);
        }
        if self.has_outstanding && self.max_outstanding == 0 {
            return Err(ConfigError::MaxOutstanding);
        }
        if self.stream_capacity == 0 {
            return Err(ConfigError::StreamCapacity);
        }
        if !(self.backoff.factor >= 1.0) {
            return Err(ConfigError::BackoffFactor(self.backoff.factor));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(ConfigError::BackoffRange);
        }
        Ok(())
    }
}
