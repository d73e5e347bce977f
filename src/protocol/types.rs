//! Message discriminants agreed between runtime and broker

use std::fmt;

/// Kinds of broker messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Reg,
    RegAck,
    ImplSender,
    ImplSenderAck,
    ImplReceiver,
    ImplReceiverAck,
    ImplInterface,
    ImplInterfaceAck,
    ImplApplication,
    ImplApplicationAck,
    CreateRunnable,
    CreateRunnableAck,
    RemoveRunnable,
    FindService,
    ServiceRegistryChangeCounter,
    Keepalive,
    Error,
}

impl MessageType {
    /// All known message types
    pub const ALL: [MessageType; 17] = [
        MessageType::Reg,
        MessageType::RegAck,
        MessageType::ImplSender,
        MessageType::ImplSenderAck,
        MessageType::ImplReceiver,
        MessageType::ImplReceiverAck,
        MessageType::ImplInterface,
        MessageType::ImplInterfaceAck,
        MessageType::ImplApplication,
        MessageType::ImplApplicationAck,
        MessageType::CreateRunnable,
        MessageType::CreateRunnableAck,
        MessageType::RemoveRunnable,
        MessageType::FindService,
        MessageType::ServiceRegistryChangeCounter,
        MessageType::Keepalive,
        MessageType::Error,
    ];

    /// Wire token of this message type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Reg => "REG",
            MessageType::RegAck => "REG_ACK",
            MessageType::ImplSender => "IMPL_SENDER",
            MessageType::ImplSenderAck => "IMPL_SENDER_ACK",
            MessageType::ImplReceiver => "IMPL_RECEIVER",
            MessageType::ImplReceiverAck => "IMPL_RECEIVER_ACK",
            MessageType::ImplInterface => "IMPL_INTERFACE",
            MessageType::ImplInterfaceAck => "IMPL_INTERFACE_ACK",
            MessageType::ImplApplication => "IMPL_APPLICATION",
            MessageType::ImplApplicationAck => "IMPL_APPLICATION_ACK",
            MessageType::CreateRunnable => "CREATE_RUNNABLE",
            MessageType::CreateRunnableAck => "CREATE_RUNNABLE_ACK",
            MessageType::RemoveRunnable => "REMOVE_RUNNABLE",
            MessageType::FindService => "FIND_SERVICE",
            MessageType::ServiceRegistryChangeCounter => "SERVICE_REGISTRY_CHANGE_COUNTER",
            MessageType::Keepalive => "KEEPALIVE",
            MessageType::Error => "ERROR",
        }
    }

    /// Decode a wire token
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == token)
    }

    /// Acknowledgment expected for a request, if it has one
    pub fn ack(&self) -> Option<MessageType> {
        match self {
            MessageType::Reg => Some(MessageType::RegAck),
            MessageType::ImplSender => Some(MessageType::ImplSenderAck),
            MessageType::ImplReceiver => Some(MessageType::ImplReceiverAck),
            MessageType::ImplInterface => Some(MessageType::ImplInterfaceAck),
            MessageType::ImplApplication => Some(MessageType::ImplApplicationAck),
            MessageType::CreateRunnable => Some(MessageType::CreateRunnableAck),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
