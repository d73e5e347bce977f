//! Per-process runtime: broker negotiation, handles and liveness supervision

pub mod client;
pub mod config;
pub mod handle;
pub mod name;
pub mod registry;
pub mod stats;
pub mod supervisor;

pub use client::{decode_ack, Runtime};
pub use config::{RuntimeConfig, ViolationPolicy};
pub use handle::{
    ApplicationPortData, ChangeCounterData, Handle, HandleKind, InterfacePortData,
    ReceiverPortData, RegistryChangeCounter, RunnableData, SenderPortData,
};
pub use name::AppName;
pub use registry::{
    install_factory, instance, is_initialized, try_instance, DefaultRuntimeFactory, RuntimeFactory,
};
pub use stats::{AtomicRuntimeStats, RuntimeStats};
pub use supervisor::{LivenessSupervisor, KEEPALIVE_THREAD_NAME};
