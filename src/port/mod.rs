//! Ports the runtime reaches without a broker round trip

pub mod application;

pub use application::{required_size, ApplicationPort, CaproQueueHeader, CaproRecord};
