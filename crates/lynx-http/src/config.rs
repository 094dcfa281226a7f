//! Socket configuration.

use std::time::Duration;

/// Default capacity of the readiness event buffer.
pub const DEFAULT_EVENTS_CAPACITY: usize = 16;

/// Bounds on the non-blocking connect retry loop.
///
/// The default is unbounded: the loop spins until the OS resolves the
/// handshake one way or the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectPolicy {
    max_attempts: Option<usize>,
    backoff: Option<Duration>,
    deadline: Option<Duration>,
}

impl ConnectPolicy {
    /// Retry until the handshake resolves.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up after `attempts` connect calls.
    #[must_use]
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Sleep for `backoff` between connect calls instead of spinning.
    #[must_use]
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Give up once `deadline` has elapsed since the first attempt.
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Get the attempt limit.
    #[must_use]
    pub fn get_max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Get the pause between attempts.
    #[must_use]
    pub fn get_backoff(&self) -> Option<Duration> {
        self.backoff
    }

    /// Get the overall deadline.
    #[must_use]
    pub fn get_deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Whether another attempt is allowed after `attempts` calls taking
    /// `elapsed` in total.
    pub(crate) fn allows_retry(&self, attempts: usize, elapsed: Duration) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
            && self.deadline.is_none_or(|deadline| elapsed < deadline)
    }
}

/// Configuration for a [`TcpSocket`](crate::TcpSocket).
#[derive(Debug, Clone)]
pub struct SocketConfig {
    connect_policy: ConnectPolicy,
    keepalive: bool,
    events_capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_policy: ConnectPolicy::default(),
            keepalive: false,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

impl SocketConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect retry policy.
    #[must_use]
    pub fn connect_policy(mut self, policy: ConnectPolicy) -> Self {
        self.connect_policy = policy;
        self
    }

    /// Enable `SO_KEEPALIVE` on the descriptor.
    #[must_use]
    pub fn keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    /// Set how many readiness events one wait can return.
    #[must_use]
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity.max(1);
        self
    }

    /// Get the connect retry policy.
    #[must_use]
    pub fn get_connect_policy(&self) -> &ConnectPolicy {
        &self.connect_policy
    }

    /// Get whether `SO_KEEPALIVE` is enabled.
    #[must_use]
    pub fn get_keepalive(&self) -> bool {
        self.keepalive
    }

    /// Get the readiness event capacity.
    #[must_use]
    pub fn get_events_capacity(&self) -> usize {
        self.events_capacity
    }
}
