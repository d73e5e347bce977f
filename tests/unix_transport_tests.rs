//! Runtime over real Unix datagram sockets

mod common;

use std::{
    os::unix::net::UnixDatagram,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use common::{BrokerState, MockBroker};
use renoir_runtime::{
    channel::unix::{frame, socket_file_name, unframe},
    runtime::AppName, runtime::Runtime, CaproMessage, Connector,
    Message, MessageType, RuntimeConfig, RuntimeError, ServiceDescription, Transport,
    UnixConnector, UnixTransport,
};
use tempfile::TempDir;

/// Serves the scripted broker on `<dir>/broker.sock` until dropped
struct SocketBroker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SocketBroker {
    fn spawn(dir: &Path, state: Arc<BrokerState>) -> Self {
        let socket = UnixDatagram::bind(dir.join(socket_file_name("broker"))).unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            let mut buffer = [0u8; 512];
            while !thread_stop.load(Ordering::SeqCst) {
                let (received, from) = match socket.recv_from(&mut buffer) {
                    Ok(datagram) => datagram,
                    Err(_) => continue,
                };
                let text = std::str::from_utf8(&buffer[..received]).unwrap();
                let (sequence, message) = unframe(&Message::decode(text).unwrap()).unwrap();

                match message.message_type() {
                    Some(MessageType::Keepalive) | Some(MessageType::RemoveRunnable) => {
                        state.messages.lock().unwrap().push(message);
                    }
                    _ => {
                        state.requests.lock().unwrap().push(message.clone());
                        let reply = frame(sequence, &state.reply(&message)).encode().unwrap();
                        if let Some(path) = from.as_pathname() {
                            let _ = socket.send_to(reply.as_bytes(), path);
                        }
                    }
                }
            }
        });

        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for SocketBroker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_broker_wait_timeout(Duration::from_secs(2))
        .with_request_timeout(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_over_sockets() {
        let broker = MockBroker::new();
        let sockets = TempDir::new().unwrap();
        let _server = SocketBroker::spawn(sockets.path(), Arc::clone(&broker.state));

        let connector = UnixConnector::new(sockets.path());
        let runtime = Runtime::new("/sensorNode", config(), &connector).unwrap();
        let app_socket = sockets.path().join("sensorNode.sock");
        assert!(app_socket.exists());

        *broker.state.instances.lock().unwrap() = vec!["Front".to_string()];
        let radar = ServiceDescription::new("Radar", "Front", "Distance").unwrap();
        assert_eq!(runtime.find_service(&radar).len(), 1);

        assert!(runtime.offer_service(&radar));
        let port = broker.application_port();
        assert_eq!(port.try_receive().unwrap().unwrap(), CaproMessage::offer(radar));

        drop(runtime);
        assert!(!app_socket.exists());
    }

    #[test]
    fn test_connector_waits_for_late_broker() {
        let broker = MockBroker::new();
        let sockets = TempDir::new().unwrap();
        let dir: PathBuf = sockets.path().to_path_buf();
        let state = Arc::clone(&broker.state);

        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            SocketBroker::spawn(&dir, state)
        });

        let connector = UnixConnector::new(sockets.path());
        let runtime = Runtime::new("/patient", config(), &connector).unwrap();
        assert_eq!(runtime.name().as_str(), "/patient");

        let _server = late.join().unwrap();
    }

    /// Echo broker answering `<seq>,FIND_SERVICE,<word>,` with `<seq>,<word>,`
    ///
    /// Each reply is sent from its own thread after the delay listed for its
    /// word, so later requests are served while earlier ones are pending.
    fn spawn_echo_broker(
        dir: &Path,
        requests: usize,
        delays: &[(&'static str, Duration)],
    ) -> JoinHandle<()> {
        let broker_socket = Arc::new(UnixDatagram::bind(dir.join("broker.sock")).unwrap());
        let delays = delays.to_vec();

        thread::spawn(move || {
            let mut buffer = [0u8; 512];
            let mut senders = Vec::new();
            for _ in 0..requests {
                let (received, from) = broker_socket.recv_from(&mut buffer).unwrap();
                let text = std::str::from_utf8(&buffer[..received]).unwrap();
                let (sequence, request) = unframe(&Message::decode(text).unwrap()).unwrap();

                let word = request.get(1).unwrap().to_string();
                let delay = delays
                    .iter()
                    .find(|(delayed, _)| *delayed == word)
                    .map_or(Duration::ZERO, |(_, delay)| *delay);
                let reply = frame(sequence, &Message::new().with(&word)).encode().unwrap();
                let to = from.as_pathname().unwrap().to_path_buf();
                let socket = Arc::clone(&broker_socket);
                senders.push(thread::spawn(move || {
                    thread::sleep(delay);
                    let _ = socket.send_to(reply.as_bytes(), &to);
                }));
            }
            for sender in senders {
                sender.join().unwrap();
            }
        })
    }

    fn impatient_transport(dir: &Path) -> Box<dyn Transport> {
        UnixConnector::new(dir)
            .connect(&AppName::new("/impatient").unwrap(), Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_late_reply_is_not_matched_to_next_request() {
        let sockets = TempDir::new().unwrap();
        let delays = [("slow", Duration::from_millis(150))];
        let server = spawn_echo_broker(sockets.path(), 2, &delays);
        let transport = impatient_transport(sockets.path());

        let slow = Message::request(MessageType::FindService).with("slow");
        let result = transport.send_request(&slow, Duration::from_millis(50));
        assert!(matches!(result, Err(RuntimeError::Timeout { .. })));

        thread::sleep(Duration::from_millis(200));
        let fast = Message::request(MessageType::FindService).with("fast");
        let reply = transport.send_request(&fast, Duration::from_secs(1)).unwrap();
        assert_eq!(reply.tokens(), &["fast"]);

        server.join().unwrap();
    }

    #[test]
    fn test_next_request_right_after_timeout_gets_its_own_reply() {
        let sockets = TempDir::new().unwrap();
        // the "slow" reply arrives while "next" is still waiting for its own
        let delays = [
            ("slow", Duration::from_millis(150)),
            ("next", Duration::from_millis(250)),
        ];
        let server = spawn_echo_broker(sockets.path(), 3, &delays);
        let transport = impatient_transport(sockets.path());

        let slow = Message::request(MessageType::FindService).with("slow");
        let result = transport.send_request(&slow, Duration::from_millis(50));
        assert!(matches!(result, Err(RuntimeError::Timeout { .. })));

        let next = Message::request(MessageType::FindService).with("next");
        let reply = transport.send_request(&next, Duration::from_secs(1)).unwrap();
        assert_eq!(reply.tokens(), &["next"]);

        let fast = Message::request(MessageType::FindService).with("fast");
        let reply = transport.send_request(&fast, Duration::from_secs(1)).unwrap();
        assert_eq!(reply.tokens(), &["fast"]);

        server.join().unwrap();
    }

    #[test]
    fn test_transport_removes_socket_file_on_drop() {
        let sockets = TempDir::new().unwrap();
        let _broker_socket = UnixDatagram::bind(sockets.path().join("broker.sock")).unwrap();

        let local = sockets.path().join("short_lived.sock");
        let transport = UnixTransport::connect(
            &local,
            &sockets.path().join("broker.sock"),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(transport.local_path(), local.as_path());
        assert!(local.exists());

        transport.send_message(&Message::request(MessageType::Keepalive).with("/x")).unwrap();
        drop(transport);
        assert!(!local.exists());
    }
}
