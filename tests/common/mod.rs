//! Scripted in-process broker shared by the integration tests

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use renoir_runtime::{
    config::DEFAULT_CAPRO_QUEUE_CAPACITY,
    memory::{BackingType, SegmentConfig, SharedSegment},
    port::ApplicationPort,
    runtime::{AppName, ApplicationPortData, Handle, Runtime, RuntimeConfig},
    Connector, Message, MessageType, Result, RuntimeError, Transport,
};
use tempfile::TempDir;

pub const SEGMENT_SIZE: usize = 64 * 1024;
pub const COUNTER_OFFSET: u64 = 512;
pub const APP_PORT_OFFSET: u64 = 1024;
pub const SENDER_OFFSET: u64 = 32 * 1024;
pub const RECEIVER_OFFSET: u64 = 33 * 1024;
pub const INTERFACE_OFFSET: u64 = 34 * 1024;
pub const RUNNABLE_OFFSET: u64 = 35 * 1024;

/// Everything the mock broker saw and is scripted to answer
#[derive(Default)]
pub struct BrokerState {
    pub connects: AtomicUsize,
    /// Transports handed out and not yet dropped
    pub open_transports: AtomicUsize,
    pub requests: Mutex<Vec<Message>>,
    pub messages: Mutex<Vec<Message>>,
    pub scripted: Mutex<HashMap<String, VecDeque<Message>>>,
    pub instances: Mutex<Vec<String>>,
    pub fail_requests: AtomicBool,
    pub reply_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub overlapped: AtomicBool,
    locator: Mutex<String>,
}

impl BrokerState {
    /// Answer the next request with discriminant `kind` with `reply`
    pub fn script(&self, kind: MessageType, reply: Message) {
        self.scripted
            .lock()
            .unwrap()
            .entry(kind.as_str().to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_of(&self, kind: MessageType) -> Vec<Message> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message_type() == Some(kind))
            .cloned()
            .collect()
    }

    pub fn messages_of(&self, kind: MessageType) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message_type() == Some(kind))
            .cloned()
            .collect()
    }

    /// Reply the broker gives to `request`
    pub fn reply(&self, request: &Message) -> Message {
        let kind = request.discriminant().unwrap_or_default().to_string();
        if let Some(reply) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        let ack = |ack: MessageType, offset: u64| Message::request(ack).with(offset);
        match request.message_type() {
            Some(MessageType::Reg) => Message::request(MessageType::RegAck)
                .with(BackingType::FileBacked.as_token())
                .with(self.locator.lock().unwrap().as_str())
                .with(SEGMENT_SIZE)
                .with(0)
                .with(42),
            Some(MessageType::ImplApplication) => {
                ack(MessageType::ImplApplicationAck, APP_PORT_OFFSET)
            }
            Some(MessageType::ImplSender) => ack(MessageType::ImplSenderAck, SENDER_OFFSET),
            Some(MessageType::ImplReceiver) => ack(MessageType::ImplReceiverAck, RECEIVER_OFFSET),
            Some(MessageType::ImplInterface) => {
                ack(MessageType::ImplInterfaceAck, INTERFACE_OFFSET)
            }
            Some(MessageType::CreateRunnable) => {
                ack(MessageType::CreateRunnableAck, RUNNABLE_OFFSET)
            }
            Some(MessageType::FindService) => {
                Message::from_tokens(self.instances.lock().unwrap().iter())
            }
            Some(MessageType::ServiceRegistryChangeCounter) => Message::new().with(COUNTER_OFFSET),
            _ => Message::request(MessageType::Error).with("unknown request"),
        }
    }
}

pub struct MockTransport {
    state: Arc<BrokerState>,
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.open_transports.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn send_request(&self, request: &Message, timeout: Duration) -> Result<Message> {
        if self.state.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.state.overlapped.store(true, Ordering::SeqCst);
        }
        self.state.requests.lock().unwrap().push(request.clone());

        let delay = *self.state.reply_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let reply = if self.state.fail_requests.load(Ordering::SeqCst) {
            Err(RuntimeError::timeout(timeout))
        } else {
            Ok(self.state.reply(request))
        };
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    fn send_message(&self, message: &Message) -> Result<()> {
        self.state.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockConnector {
    pub state: Arc<BrokerState>,
}

impl Connector for MockConnector {
    fn connect(&self, _app_name: &AppName, _wait: Duration) -> Result<Box<dyn Transport>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.open_transports.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Broker side of a test: owns the segment and the scripted channel
pub struct MockBroker {
    pub dir: TempDir,
    pub segment: Arc<SharedSegment>,
    pub state: Arc<BrokerState>,
}

impl MockBroker {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = SegmentConfig::new("broker", SEGMENT_SIZE)
            .with_backing_type(BackingType::FileBacked)
            .with_file_path(dir.path().join("segment"));
        let segment = Arc::new(SharedSegment::create(&config).unwrap());
        ApplicationPort::initialize(&segment, APP_PORT_OFFSET, DEFAULT_CAPRO_QUEUE_CAPACITY)
            .unwrap();

        let state = Arc::new(BrokerState::default());
        *state.locator.lock().unwrap() = segment.info().locator.clone();

        Self { dir, segment, state }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            state: Arc::clone(&self.state),
        }
    }

    pub fn runtime(&self, name: &str) -> Runtime {
        self.runtime_with(name, RuntimeConfig::default())
    }

    pub fn runtime_with(&self, name: &str, config: RuntimeConfig) -> Runtime {
        Runtime::new(name, config, &self.connector()).unwrap()
    }

    /// Consumer end of the application port the runtimes dispatch into
    pub fn application_port(&self) -> ApplicationPort {
        let handle =
            Handle::<ApplicationPortData>::from_offset(APP_PORT_OFFSET, &self.segment).unwrap();
        ApplicationPort::attach(Arc::clone(&self.segment), handle).unwrap()
    }

    /// Bump the registry change counter the way the broker does
    pub fn bump_change_counter(&self) {
        let counter = self
            .segment
            .resolve_offset(COUNTER_OFFSET, 8, 8)
            .unwrap()
            .cast::<AtomicU64>();
        unsafe { counter.as_ref() }.fetch_add(1, Ordering::Release);
    }
}
