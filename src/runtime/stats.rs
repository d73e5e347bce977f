//! Runtime statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of runtime counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Round trips attempted with the broker
    pub requests: u64,
    /// Requests that failed on the wire or timed out
    pub transport_failures: u64,
    /// Replies rejected as malformed or unexpected
    pub protocol_violations: u64,
    /// Heartbeats handed to the transport
    pub heartbeats_sent: u64,
    /// Heartbeats the transport refused
    pub heartbeat_failures: u64,
    /// Capability announcements queued on the application port
    pub dispatches: u64,
    /// Capability announcements that could not be queued
    pub dispatch_failures: u64,
}

impl RuntimeStats {
    /// Create new statistics instance
    pub fn new() -> Self {
        Default::default()
    }

    /// Heartbeat attempts in total
    pub fn heartbeat_attempts(&self) -> u64 {
        self.heartbeats_sent + self.heartbeat_failures
    }

    /// Fraction of requests that produced a usable reply (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 1.0;
        }
        let failed = self.transport_failures + self.protocol_violations;
        1.0 - (failed as f64 / self.requests as f64)
    }

    /// Check if the broker link looks sane
    pub fn is_healthy(&self) -> bool {
        self.protocol_violations == 0 && self.success_rate() > 0.95
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "RuntimeStats {{ requests: {}, transport_failures: {}, protocol_violations: {}, \
             heartbeats: {}/{}, dispatches: {}, success_rate: {:.2}% }}",
            self.requests,
            self.transport_failures,
            self.protocol_violations,
            self.heartbeats_sent,
            self.heartbeat_attempts(),
            self.dispatches,
            self.success_rate() * 100.0
        )
    }
}

/// Thread-safe runtime counters
#[derive(Debug, Default)]
pub struct AtomicRuntimeStats {
    requests: AtomicU64,
    transport_failures: AtomicU64,
    protocol_violations: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeat_failures: AtomicU64,
    dispatches: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl AtomicRuntimeStats {
    /// Create new atomic statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self, delivered: bool) {
        if delivered {
            self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dispatch(&self, queued: bool) {
        if queued {
            self.dispatches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            requests: self.requests.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeat_failures: self.heartbeat_failures.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}
