//! Transport seam between the request channel and the broker

use std::time::Duration;

use crate::{error::Result, protocol::Message, runtime::AppName};

/// Carries encoded messages to the broker
///
/// Implementations must be safe to call from the keepalive thread while a
/// caller thread is inside [`Transport::send_request`]; concurrent writes
/// have to be serialized by the implementation if the medium needs it.
pub trait Transport: Send + Sync {
    /// Send `request` and block up to `timeout` for the broker's reply
    fn send_request(&self, request: &Message, timeout: Duration) -> Result<Message>;

    /// Send `message` without waiting for a reply
    fn send_message(&self, message: &Message) -> Result<()>;
}

/// Opens a transport to the broker for an application
pub trait Connector: Send + Sync {
    /// Connect, waiting at most `wait` for the broker to become available
    fn connect(&self, app_name: &AppName, wait: Duration) -> Result<Box<dyn Transport>>;
}
