//! The per-process runtime negotiating endpoints with the broker

use std::{ptr::NonNull, sync::Arc};

use crate::{
    channel::{Connector, RequestChannel},
    error::{Result, RuntimeError},
    memory::SharedSegment,
    port::ApplicationPort,
    protocol::{
        CaproMessage, IdString, Interfaces, Message, MessageType, RunnableProperty,
        ServiceDescription,
    },
};

use super::{
    config::{RuntimeConfig, ViolationPolicy},
    handle::{
        ApplicationPortData, Handle, HandleKind, InterfacePortData, ReceiverPortData,
        RegistryChangeCounter, RunnableData, SenderPortData,
    },
    name::AppName,
    stats::{AtomicRuntimeStats, RuntimeStats},
    supervisor::LivenessSupervisor,
};

/// Client side of the broker connection for one process
///
/// Operations never fail loudly: a rejected or lost request is logged,
/// counted in [`RuntimeStats`] and reported as `None`, `false` or an empty
/// list. Acquisition requests are not safe to repeat blindly; a timed-out
/// request may still have been served by the broker.
#[derive(Debug)]
pub struct Runtime {
    name: AppName,
    config: RuntimeConfig,
    channel: Arc<RequestChannel>,
    segment: Arc<SharedSegment>,
    application_port: ApplicationPort,
    supervisor: LivenessSupervisor,
    stats: Arc<AtomicRuntimeStats>,
}

impl Runtime {
    /// Validate `name`, connect, register, map the segment and start heartbeats
    ///
    /// Name validation happens before the connector is touched.
    pub fn new(name: &str, config: RuntimeConfig, connector: &dyn Connector) -> Result<Self> {
        let name = AppName::new(name).map_err(|e| {
            log::error!("Cannot initialize runtime. {}", e);
            e
        })?;
        config.validate()?;

        let transport = connector.connect(&name, config.broker_wait_timeout)?;
        let channel = Arc::new(RequestChannel::new(transport, config.request_timeout));

        let info = channel.register(&name)?;
        let segment = Arc::new(SharedSegment::open(&info)?);
        log::info!("{} registered, segment {}", name, info);

        let stats = Arc::new(AtomicRuntimeStats::new());
        let request = Message::request(MessageType::ImplApplication)
            .with(&name)
            .with(config.application_interface);
        stats.record_request();
        let handle = request_handle::<ApplicationPortData>(&channel, &segment, &request)?;
        let application_port = ApplicationPort::attach(Arc::clone(&segment), handle)?;

        // only once the runtime is complete, or the broker sees heartbeats of a half-registered app
        let supervisor = LivenessSupervisor::start(
            Arc::clone(&channel),
            name.clone(),
            config.keepalive_interval,
            Arc::clone(&stats),
        )?;

        Ok(Self {
            name,
            config,
            channel,
            segment,
            application_port,
            supervisor,
            stats,
        })
    }

    /// Application name given at construction
    pub fn name(&self) -> &AppName {
        &self.name
    }

    /// Configuration in effect
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The mapped broker segment
    pub fn segment(&self) -> &Arc<SharedSegment> {
        &self.segment
    }

    /// The application port used for offer/stop-offer
    pub fn application_port(&self) -> &ApplicationPort {
        &self.application_port
    }

    /// Get current statistics snapshot
    pub fn stats(&self) -> RuntimeStats {
        self.stats.snapshot()
    }

    /// Address of a handle's object in this process
    pub fn resolve<K: HandleKind>(&self, handle: &Handle<K>) -> Option<NonNull<u8>> {
        self.report("resolve handle", handle.resolve(&self.segment))
    }

    /// Acquire a sender endpoint for `service`
    pub fn acquire_sender(
        &self,
        service: &ServiceDescription,
        interface: Interfaces,
        runnable: &IdString,
    ) -> Option<Handle<SenderPortData>> {
        let request = Message::request(MessageType::ImplSender)
            .with(&self.name)
            .with(service.serialize())
            .with(interface)
            .with(runnable);
        let result = self.request(&request);
        self.report("acquire sender", result)
    }

    /// Acquire a receiver endpoint for `service`
    pub fn acquire_receiver(
        &self,
        service: &ServiceDescription,
        interface: Interfaces,
        runnable: &IdString,
    ) -> Option<Handle<ReceiverPortData>> {
        let request = Message::request(MessageType::ImplReceiver)
            .with(&self.name)
            .with(service.serialize())
            .with(interface)
            .with(runnable);
        let result = self.request(&request);
        self.report("acquire receiver", result)
    }

    /// Acquire an interface endpoint
    pub fn acquire_interface(
        &self,
        interface: Interfaces,
        runnable: &IdString,
    ) -> Option<Handle<InterfacePortData>> {
        let request = Message::request(MessageType::ImplInterface)
            .with(&self.name)
            .with(interface)
            .with(runnable);
        let result = self.request(&request);
        self.report("acquire interface", result)
    }

    /// Register a runnable with the broker
    pub fn create_runnable(&self, property: &RunnableProperty) -> Option<Handle<RunnableData>> {
        let request = Message::request(MessageType::CreateRunnable)
            .with(&self.name)
            .with(property.serialize());
        let result = self.request(&request);
        self.report("create runnable", result)
    }

    /// Ask the broker to drop a runnable
    ///
    /// The broker does not act on this request yet; it is sent so the broker
    /// can log it.
    pub fn remove_runnable(&self, runnable: &IdString) {
        log::warn!("removing runnable {} is not supported by the broker yet", runnable);

        let message = Message::request(MessageType::RemoveRunnable).with(runnable);
        if let Err(e) = self.channel.send_message(&message) {
            self.stats.record_transport_failure();
            log::error!("unable to send runnable removal request to broker: {}", e);
        }
    }

    /// Instances currently offering `service`
    ///
    /// An empty list is a valid "nothing found"; a failed request is logged
    /// and also yields an empty list.
    pub fn find_service(&self, service: &ServiceDescription) -> Vec<IdString> {
        let request = Message::request(MessageType::FindService)
            .with(&self.name)
            .with(service.serialize());

        self.stats.record_request();
        let response = match self.channel.send_request(&request) {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_transport_failure();
                log::error!("Could not send FIND_SERVICE request to broker: {}", e);
                return Vec::new();
            }
        };

        if response.message_type() == Some(MessageType::Error) {
            self.stats.record_protocol_violation();
            log::error!(
                "Broker rejected FIND_SERVICE for {}: {}",
                service,
                response.get(1).unwrap_or("no reason given")
            );
            return Vec::new();
        }

        response
            .tokens()
            .iter()
            .filter_map(|token| match IdString::new(token.as_str()) {
                Ok(instance) => Some(instance),
                Err(e) => {
                    log::warn!("ignoring malformed instance in FIND_SERVICE reply: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Counter the broker bumps whenever the service registry changes
    pub fn service_registry_change_counter(&self) -> Option<RegistryChangeCounter> {
        let request = Message::request(MessageType::ServiceRegistryChangeCounter).with(&self.name);
        let result = self.request_change_counter(&request);
        self.report("request service registry change counter", result)
    }

    fn request_change_counter(&self, request: &Message) -> Result<RegistryChangeCounter> {
        self.stats.record_request();
        let response = self.channel.send_request(request)?;
        if response.len() != 1 {
            return Err(RuntimeError::protocol(
                "1 token with the counter offset",
                response.to_string(),
            ));
        }

        let token = response.get(0).unwrap_or_default();
        let handle = Handle::decode(token, &self.segment)?;
        RegistryChangeCounter::attach(Arc::clone(&self.segment), handle)
    }

    /// Announce that this application offers `service`
    pub fn offer_service(&self, service: &ServiceDescription) -> bool {
        self.dispatch(CaproMessage::offer(service.clone()))
    }

    /// Withdraw an earlier offer of `service`
    pub fn stop_offer_service(&self, service: &ServiceDescription) -> bool {
        self.dispatch(CaproMessage::stop_offer(service.clone()))
    }

    fn dispatch(&self, message: CaproMessage) -> bool {
        match self.application_port.dispatch(&message) {
            Ok(()) => {
                self.stats.record_dispatch(true);
                log::debug!("{} dispatched {:?} for {}", self.name, message.kind, message.service);
                true
            }
            Err(e) => {
                self.stats.record_dispatch(false);
                log::error!("unable to dispatch {:?} for {}: {}", message.kind, message.service, e);
                false
            }
        }
    }

    fn request<K: HandleKind>(&self, request: &Message) -> Result<Handle<K>> {
        self.stats.record_request();
        request_handle(&self.channel, &self.segment, request)
    }

    fn report<T>(&self, operation: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) if e.is_protocol_violation() => {
                self.stats.record_protocol_violation();
                log::error!("{}: wrong response from broker: {}", operation, e);
                if self.config.violation_policy == ViolationPolicy::Abort {
                    log::error!("{}: broker and runtime out of sync, aborting", self.name);
                    std::process::abort();
                }
                None
            }
            Err(e) => {
                self.stats.record_transport_failure();
                log::error!("{} failed: {}", operation, e);
                None
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // heartbeats end before anything else is released
        self.supervisor.stop();
        log::debug!("runtime {} shut down: {}", self.name, self.stats.snapshot().summary());
    }
}

/// Send `request` and decode the two-token `ack, offset` reply its type expects
fn request_handle<K: HandleKind>(
    channel: &RequestChannel,
    segment: &SharedSegment,
    request: &Message,
) -> Result<Handle<K>> {
    let ack = request
        .message_type()
        .and_then(|kind| kind.ack())
        .ok_or_else(|| {
            RuntimeError::invalid_parameter(
                "request",
                format!("'{}' has no acknowledgement", request.discriminant().unwrap_or_default()),
            )
        })?;
    let response = channel.send_request(request)?;
    decode_ack(&response, ack, segment)
}

/// Decode `ack, offset` into a handle valid for `segment`
pub fn decode_ack<K: HandleKind>(
    response: &Message,
    ack: MessageType,
    segment: &SharedSegment,
) -> Result<Handle<K>> {
    if response.message_type() == Some(MessageType::Error) {
        return Err(RuntimeError::broker_error(
            response.get(1).unwrap_or("no reason given"),
        ));
    }

    if response.len() != 2 {
        return Err(RuntimeError::protocol(
            format!("{} with 2 tokens", ack),
            response.to_string(),
        ));
    }

    match response.discriminant() {
        Some(kind) if kind == ack.as_str() => {
            Handle::decode(response.get(1).unwrap_or_default(), segment)
        }
        other => Err(RuntimeError::protocol(ack.as_str(), other.unwrap_or_default())),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        channel::Transport,
        memory::{BackingType, SegmentConfig},
    };

    /// Answers every request with one canned reply and remembers what it saw
    struct CannedTransport {
        reply: Message,
        seen: Arc<Mutex<Vec<Message>>>,
    }

    impl Transport for CannedTransport {
        fn send_request(&self, request: &Message, _timeout: Duration) -> Result<Message> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }

        fn send_message(&self, _message: &Message) -> Result<()> {
            Ok(())
        }
    }

    fn setup(reply: &str) -> (TempDir, SharedSegment, RequestChannel, Arc<Mutex<Vec<Message>>>) {
        let dir = TempDir::new().unwrap();
        let config = SegmentConfig::new("client_test", 4096)
            .with_backing_type(BackingType::FileBacked)
            .with_file_path(dir.path().join("segment"));
        let segment = SharedSegment::create(&config).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = CannedTransport {
            reply: Message::decode(reply).unwrap(),
            seen: Arc::clone(&seen),
        };
        let channel = RequestChannel::new(Box::new(transport), Duration::from_secs(1));
        (dir, segment, channel, seen)
    }

    #[test]
    fn test_request_handle_expects_ack_of_request_type() {
        let (_dir, segment, channel, _) = setup("IMPL_SENDER_ACK,64,");

        let sender = Message::request(MessageType::ImplSender).with("/app");
        let handle = request_handle::<SenderPortData>(&channel, &segment, &sender).unwrap();
        assert_eq!(handle.offset(), 64);

        let receiver = Message::request(MessageType::ImplReceiver).with("/app");
        let err = request_handle::<SenderPortData>(&channel, &segment, &receiver).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_request_handle_rejects_request_without_ack() {
        let (_dir, segment, channel, seen) = setup("IMPL_SENDER_ACK,64,");

        for request in [
            Message::request(MessageType::FindService).with("/app"),
            Message::request(MessageType::Keepalive).with("/app"),
            Message::new().with("NOT_A_REQUEST"),
        ] {
            let result = request_handle::<SenderPortData>(&channel, &segment, &request);
            assert!(matches!(result, Err(RuntimeError::InvalidParameter { .. })), "{}", request);
        }
        assert!(seen.lock().unwrap().is_empty());
    }
}
