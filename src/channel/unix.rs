//! Unix datagram transport to a broker listening in a runtime directory

use std::{
    io::ErrorKind,
    os::{fd::AsRawFd, unix::net::UnixDatagram},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::socket::{recv, MsgFlags},
};

use crate::{
    config::{BROKER_CHANNEL_NAME, DEFAULT_REQUEST_TIMEOUT},
    error::{Result, RuntimeError},
    protocol::{Message, MAX_MESSAGE_SIZE},
    runtime::AppName,
};

use super::transport::{Connector, Transport};

/// Default directory holding broker and application sockets
pub const DEFAULT_RUNTIME_DIR: &str = "/tmp/renoir";

/// Poll period while waiting for the broker socket
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Socket file name for a channel name such as `/sensorNode`
pub fn socket_file_name(channel_name: &str) -> String {
    format!("{}.sock", channel_name.trim_start_matches('/').replace('/', "_"))
}

/// Prefix `message` with the sequence number of its datagram
///
/// Every datagram on the socket starts with this token. The broker echoes
/// the sequence number of a request as the first token of its reply.
pub fn frame(sequence: u64, message: &Message) -> Message {
    let mut framed = Message::new().with(sequence);
    for token in message.tokens() {
        framed.push(token);
    }
    framed
}

/// Split a datagram into its sequence number and the message it carries
pub fn unframe(datagram: &Message) -> Result<(u64, Message)> {
    let sequence = datagram
        .get(0)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| RuntimeError::protocol("leading sequence number", datagram.to_string()))?;
    Ok((sequence, Message::from_tokens(&datagram.tokens()[1..])))
}

/// Datagram socket bound to the application's path and connected to the broker
#[derive(Debug)]
pub struct UnixTransport {
    socket: UnixDatagram,
    local_path: PathBuf,
    broker_path: PathBuf,
    next_sequence: AtomicU64,
}

impl UnixTransport {
    /// Bind `local_path` and connect to `broker_path`
    pub fn connect(local_path: &Path, broker_path: &Path, send_timeout: Duration) -> Result<Self> {
        let socket = Self::bind(local_path, send_timeout)?;
        socket
            .connect(broker_path)
            .map_err(|e| RuntimeError::from_io(e, "Failed to connect to broker socket"))?;

        Ok(Self {
            socket,
            local_path: local_path.to_path_buf(),
            broker_path: broker_path.to_path_buf(),
            next_sequence: AtomicU64::new(1),
        })
    }

    fn bind(local_path: &Path, send_timeout: Duration) -> Result<UnixDatagram> {
        // left over by a previous run of the same application
        if local_path.exists() {
            std::fs::remove_file(local_path)
                .map_err(|e| RuntimeError::from_io(e, "Failed to remove stale socket"))?;
        }

        let socket = UnixDatagram::bind(local_path)
            .map_err(|e| RuntimeError::from_io(e, "Failed to bind application socket"))?;
        socket
            .set_write_timeout(Some(send_timeout))
            .map_err(|e| RuntimeError::from_io(e, "Failed to set send timeout"))?;
        Ok(socket)
    }

    /// Path of the broker socket
    pub fn broker_path(&self) -> &Path {
        &self.broker_path
    }

    /// Path this application is reachable at
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Discard replies that arrived after an earlier request timed out
    fn drain_stale(&self) -> usize {
        let mut buffer = [0u8; MAX_MESSAGE_SIZE];
        let mut drained = 0;
        loop {
            match recv(self.socket.as_raw_fd(), &mut buffer, MsgFlags::MSG_DONTWAIT) {
                Ok(_) => drained += 1,
                Err(Errno::EINTR) => continue,
                Err(_) => break,
            }
        }
        if drained > 0 {
            log::warn!("discarded {} stale broker replies", drained);
        }
        drained
    }

    /// Send `message` framed with a fresh sequence number, which is returned
    fn send_framed(&self, message: &Message) -> Result<u64> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let encoded = frame(sequence, message).encode()?;
        self.socket.send(encoded.as_bytes()).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                RuntimeError::transport("broker socket send timed out")
            }
            _ => RuntimeError::from_io(e, "Failed to send to broker"),
        })?;
        Ok(sequence)
    }

    fn receive(&self, buffer: &mut [u8], timeout: Duration) -> Result<Message> {
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| RuntimeError::from_io(e, "Failed to set reply timeout"))?;

        let received = self.socket.recv(buffer).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => RuntimeError::timeout(timeout),
            _ => RuntimeError::from_io(e, "Failed to receive broker reply"),
        })?;

        let text = std::str::from_utf8(&buffer[..received]).map_err(|_| {
            RuntimeError::protocol("UTF-8 reply", format!("{} raw bytes", received))
        })?;
        Message::decode(text)
    }
}

impl Transport for UnixTransport {
    fn send_request(&self, request: &Message, timeout: Duration) -> Result<Message> {
        self.drain_stale();
        let sequence = self.send_framed(request)?;
        let deadline = Instant::now() + timeout;

        let mut buffer = [0u8; MAX_MESSAGE_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RuntimeError::timeout(timeout));
            }

            let (replied_to, reply) = unframe(&self.receive(&mut buffer, remaining)?)?;
            if replied_to == sequence {
                return Ok(reply);
            }
            log::warn!(
                "discarded broker reply to request {} while waiting for {}",
                replied_to,
                sequence
            );
        }
    }

    fn send_message(&self, message: &Message) -> Result<()> {
        self.send_framed(message).map(|_| ())
    }
}

impl Drop for UnixTransport {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.local_path) {
            log::debug!("could not remove {}: {}", self.local_path.display(), e);
        }
    }
}

/// Connects applications to a broker socket in a runtime directory
#[derive(Debug, Clone)]
pub struct UnixConnector {
    runtime_dir: PathBuf,
    broker_name: String,
    send_timeout: Duration,
}

impl Default for UnixConnector {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME_DIR)
    }
}

impl UnixConnector {
    /// Create a connector for the default broker in `runtime_dir`
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            broker_name: BROKER_CHANNEL_NAME.to_string(),
            send_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the broker channel name
    pub fn with_broker_name(mut self, broker_name: impl Into<String>) -> Self {
        self.broker_name = broker_name.into();
        self
    }

    /// Set the send timeout of the application socket
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Path of the broker socket
    pub fn broker_path(&self) -> PathBuf {
        self.runtime_dir.join(socket_file_name(&self.broker_name))
    }

    /// Path of the socket for `app_name`
    pub fn app_path(&self, app_name: &AppName) -> PathBuf {
        self.runtime_dir.join(socket_file_name(app_name.as_str()))
    }
}

impl Connector for UnixConnector {
    fn connect(&self, app_name: &AppName, wait: Duration) -> Result<Box<dyn Transport>> {
        std::fs::create_dir_all(&self.runtime_dir)
            .map_err(|e| RuntimeError::from_io(e, "Failed to create runtime directory"))?;

        let local_path = self.app_path(app_name);
        let broker_path = self.broker_path();
        let started = Instant::now();
        let mut announced = false;

        loop {
            match UnixTransport::connect(&local_path, &broker_path, self.send_timeout) {
                Ok(transport) => {
                    log::info!("{} connected to broker at {}", app_name, broker_path.display());
                    return Ok(Box::new(transport));
                }
                Err(RuntimeError::Io { source: Some(e), .. })
                    if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) =>
                {
                    if started.elapsed() >= wait {
                        let _ = std::fs::remove_file(&local_path);
                        return Err(RuntimeError::broker_unavailable(&self.broker_name, wait));
                    }
                    if !announced {
                        log::warn!("waiting for broker at {}", broker_path.display());
                        announced = true;
                    }
                    thread::sleep(CONNECT_RETRY_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_socket_file_name() {
        assert_eq!(socket_file_name("/sensorNode"), "sensorNode.sock");
        assert_eq!(socket_file_name("broker"), "broker.sock");
        assert_eq!(socket_file_name("/a/b"), "a_b.sock");
    }

    #[test]
    fn test_frame_and_unframe() {
        let request = Message::request(crate::protocol::MessageType::FindService).with("/app");
        let framed = frame(7, &request);
        assert_eq!(framed.encode().unwrap(), "7,FIND_SERVICE,/app,");

        let (sequence, message) = unframe(&framed).unwrap();
        assert_eq!(sequence, 7);
        assert_eq!(message, request);

        let (_, empty) = unframe(&Message::decode("3,").unwrap()).unwrap();
        assert!(empty.is_empty());

        assert!(unframe(&Message::decode("FIND_SERVICE,/app,").unwrap()).is_err());
        assert!(unframe(&Message::new()).is_err());
    }

    #[test]
    fn test_connect_gives_up_without_broker() {
        let dir = TempDir::new().unwrap();
        let connector = UnixConnector::new(dir.path());
        let name = AppName::new("/lonely").unwrap();

        let started = Instant::now();
        let result = connector.connect(&name, Duration::from_millis(120));
        assert!(matches!(result, Err(RuntimeError::BrokerUnavailable { .. })));
        assert!(started.elapsed() >= Duration::from_millis(120));
    }
}
