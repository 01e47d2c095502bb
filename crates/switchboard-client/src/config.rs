//! Client configuration.

use std::time::Duration;

use switchboard_protocol::Role;

/// Default deadline for correlated requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default fixed reconnect delay.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Default base delay for linear backoff.
const DEFAULT_LINEAR_BASE: Duration = Duration::from_millis(1000);

/// Default attempt bound for linear backoff.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// How reconnect attempts are spaced after an unexpected disconnect.
#[derive(Debug, Clone, Copy)]
pub enum ReconnectPolicy {
    /// Retry forever with a fixed delay between attempts.
    Fixed { delay: Duration },
    /// Delay grows linearly with the attempt number (`base * attempt`);
    /// retrying stops after `max_attempts`.
    Linear { base: Duration, max_attempts: u32 },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Linear backoff with the default base and attempt bound.
    pub fn linear() -> Self {
        Self::Linear {
            base: DEFAULT_LINEAR_BASE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Delay before reconnect attempt number `attempt` (1-based), or `None`
    /// when the policy is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Fixed { delay } => Some(delay),
            Self::Linear { base, max_attempts } => {
                if attempt > max_attempts {
                    None
                } else {
                    Some(base * attempt)
                }
            }
        }
    }
}

/// Configuration for [`crate::RelayClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket URL.
    pub url: String,
    /// Role announced on every (re)connect.
    pub role: Role,
    /// Whether to reconnect automatically after an unexpected disconnect.
    pub auto_reconnect: bool,
    /// Spacing of automatic reconnect attempts.
    pub reconnect: ReconnectPolicy,
    /// Default deadline for [`crate::RelayClient::request`].
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, role: Role) -> Self {
        Self {
            url: url.into(),
            role,
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("ws://127.0.0.1:3001/ws", Role::Controller)
    }
}
