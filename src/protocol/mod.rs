//! Broker protocol: token messages, discriminants and serialized descriptors

pub mod message;
pub mod service;
pub mod types;

pub use message::{Message, MAX_MESSAGE_SIZE, SEPARATOR};
pub use service::{
    CaproMessage, CaproMessageType, CaproSubType, IdString, Interfaces, RunnableProperty,
    ServiceDescription, MAX_ID_STRING_LENGTH,
};
pub use types::MessageType;
