//! Request/response channel to the broker

pub mod request;
pub mod transport;
pub mod unix;

pub use request::RequestChannel;
pub use transport::{Connector, Transport};
pub use unix::{UnixConnector, UnixTransport, DEFAULT_RUNTIME_DIR};
