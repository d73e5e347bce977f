//! # Renoir Runtime - Client Control Plane for Shared Memory IPC
//!
//! Renoir Runtime is the per-process side of a zero-copy, shared-memory
//! middleware. A central broker owns the shared segments and decides which
//! applications may send, receive or interface with which services; this
//! crate negotiates those endpoints with the broker and keeps the process
//! registered as alive.
//!
//! ## Features
//!
//! - **Runtime singleton**: one broker connection per process, lazily created
//! - **Typed handles**: broker objects addressed by validated segment offsets
//! - **Zero-copy chunks**: payload and header addresses derived from each other
//! - **Liveness supervision**: scoped heartbeat thread with prompt shutdown
//! - **Capability dispatch**: offer/stop-offer through a shared-memory queue
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    Runtime                      │
//! ├─────────────────────────────────────────────────┤
//! │  RequestChannel          │  SharedSegment       │
//! │  - request guard         │  - offset handles    │
//! │  - REG handshake         │  - application port  │
//! │  - keepalive bypass      │  - change counter    │
//! └─────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────┐    ┌─────────────────────────┐
//! │ Broker transport│    │   Chunk addressing      │
//! │ (Unix datagram) │    │   (header <-> payload)  │
//! └─────────────────┘    └─────────────────────────┘
//! ```

pub mod error;
pub mod chunk;
pub mod memory;
pub mod protocol;
pub mod channel;
pub mod port;
pub mod runtime;

// Main API re-exports
pub use error::{RuntimeError, Result};
pub use chunk::{ChunkHeader, CHUNK_HEADER_LAYOUT_VERSION};
pub use memory::{BackingType, SegmentConfig, SegmentInfo, SharedSegment};
pub use protocol::{
    CaproMessage, CaproMessageType, CaproSubType, IdString, Interfaces, Message, MessageType,
    RunnableProperty, ServiceDescription,
};
pub use channel::{Connector, RequestChannel, Transport, UnixConnector, UnixTransport};
pub use port::ApplicationPort;
pub use runtime::{
    AppName, Handle, LivenessSupervisor, RegistryChangeCounter, Runtime, RuntimeConfig,
    RuntimeFactory, RuntimeStats, ViolationPolicy,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    use std::time::Duration;

    /// Period of the broker's discovery loop
    pub const DISCOVERY_INTERVAL: Duration = Duration::from_millis(100);

    /// Heartbeat period of every runtime
    pub const PROCESS_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(300);

    /// How long construction waits for the broker channel to appear
    pub const PROCESS_WAITING_FOR_BROKER_TIMEOUT: Duration = Duration::from_secs(60);

    /// Reply timeout for a single request
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Channel name the broker listens on
    pub const BROKER_CHANNEL_NAME: &str = "broker";

    /// Placeholder name that must never reach the broker
    pub const DEFAULT_RUNTIME_INSTANCE_NAME: &str = "dummy";

    /// Alignment of every broker object a handle refers to
    pub const HANDLE_ALIGNMENT: usize = 8;

    /// Record slots the broker gives an application port
    pub const DEFAULT_CAPRO_QUEUE_CAPACITY: u64 = 64;

    // the broker must see at least one discovery cycle between heartbeats
    const _: () = assert!(PROCESS_KEEP_ALIVE_INTERVAL.as_millis() > DISCOVERY_INTERVAL.as_millis());
}
