//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    config::{
        DEFAULT_REQUEST_TIMEOUT, DISCOVERY_INTERVAL, PROCESS_KEEP_ALIVE_INTERVAL,
        PROCESS_WAITING_FOR_BROKER_TIMEOUT,
    },
    error::{Result, RuntimeError},
    protocol::Interfaces,
};

/// What to do when the broker answers with something unexpected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationPolicy {
    /// Log, count and hand an absent result to the caller
    Report,
    /// Log and abort the process; broker and runtime are out of sync
    Abort,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self::Report
    }
}

/// Configuration of a [`Runtime`](super::Runtime)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bound on waiting for a reply to one request
    pub request_timeout: Duration,
    /// Bound on waiting for the broker to come up at startup
    pub broker_wait_timeout: Duration,
    /// Heartbeat period, must exceed the broker's discovery interval
    pub keepalive_interval: Duration,
    /// Reaction to protocol violations
    pub violation_policy: ViolationPolicy,
    /// Interface the application endpoint is requested for
    pub application_interface: Interfaces,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            broker_wait_timeout: PROCESS_WAITING_FOR_BROKER_TIMEOUT,
            keepalive_interval: PROCESS_KEEP_ALIVE_INTERVAL,
            violation_policy: ViolationPolicy::default(),
            application_interface: Interfaces::Internal,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the startup wait for the broker
    pub fn with_broker_wait_timeout(mut self, timeout: Duration) -> Self {
        self.broker_wait_timeout = timeout;
        self
    }

    /// Set the heartbeat period
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the protocol violation policy
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    /// Set the interface of the application endpoint
    pub fn with_application_interface(mut self, interface: Interfaces) -> Self {
        self.application_interface = interface;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(RuntimeError::invalid_parameter(
                "request_timeout",
                "Request timeout must be greater than 0",
            ));
        }

        if self.keepalive_interval <= DISCOVERY_INTERVAL {
            return Err(RuntimeError::invalid_parameter(
                "keepalive_interval",
                format!(
                    "Keepalive interval {:?} must exceed the discovery interval {:?}",
                    self.keepalive_interval, DISCOVERY_INTERVAL
                ),
            ));
        }

        Ok(())
    }
}
