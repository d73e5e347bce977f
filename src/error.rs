//! Error types and handling for the runtime client

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised while talking to the broker or touching the shared segment
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// I/O related errors (sockets, segment files, mmap)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Application name rejected before any broker interaction
    #[error("Invalid application name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// The transport could not deliver a message
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// No response within the configured bound
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Broker not reachable within the startup wait
    #[error("Broker '{channel}' not available after {waited_ms}ms")]
    BrokerUnavailable { channel: String, waited_ms: u64 },

    /// Reply does not match the request it answers
    #[error("Protocol violation: expected {expected}, got {actual}")]
    Protocol { expected: String, actual: String },

    /// The broker answered with an explicit error message
    #[error("Broker rejected request: {reason}")]
    BrokerError { reason: String },

    /// A decoded offset does not denote valid segment memory
    #[error("Invalid handle {offset:#x}: {reason}")]
    InvalidHandle { offset: u64, reason: String },

    /// Shared segment mapping failures
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Capability queue has no free slot
    #[error("Buffer full: {buffer_type}")]
    BufferFull { buffer_type: String },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl RuntimeError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a broker unavailable error
    pub fn broker_unavailable(channel: impl Into<String>, waited: std::time::Duration) -> Self {
        Self::BrokerUnavailable {
            channel: channel.into(),
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Create a protocol violation error
    pub fn protocol(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Protocol {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a broker error
    pub fn broker_error(reason: impl Into<String>) -> Self {
        Self::BrokerError {
            reason: reason.into(),
        }
    }

    /// Create an invalid handle error
    pub fn invalid_handle(offset: u64, reason: impl Into<String>) -> Self {
        Self::InvalidHandle {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create a buffer full error
    pub fn buffer_full(buffer_type: impl Into<String>) -> Self {
        Self::BufferFull {
            buffer_type: buffer_type.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Whether the failure happened on the wire rather than in the reply
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::BrokerUnavailable { .. }
        )
    }

    /// Whether the reply was received but could not be accepted
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::InvalidHandle { .. } | Self::BrokerError { .. }
        )
    }
}

// Convert from common error types
impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::errno::Errno> for RuntimeError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::platform(format!("System call failed: {}", err))
    }
}
