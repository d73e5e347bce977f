//! Service descriptions, runnable properties and capability messages

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{Result, RuntimeError};

use super::message::SEPARATOR;

/// Maximum length of an identifier in bytes
pub const MAX_ID_STRING_LENGTH: usize = 100;

/// Identifier used for services, instances, events and runnables
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdString(String);

impl IdString {
    /// Create a validated identifier
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();

        if value.is_empty() {
            return Err(RuntimeError::invalid_parameter("id", "Identifier cannot be empty"));
        }

        if value.len() > MAX_ID_STRING_LENGTH {
            return Err(RuntimeError::invalid_parameter(
                "id",
                format!("'{}' exceeds {} bytes", value, MAX_ID_STRING_LENGTH),
            ));
        }

        if value.contains(SEPARATOR) {
            return Err(RuntimeError::invalid_parameter(
                "id",
                format!("'{}' contains the protocol separator", value),
            ));
        }

        Ok(Self(value))
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdString {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for IdString {
    type Error = RuntimeError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<IdString> for String {
    fn from(id: IdString) -> Self {
        id.0
    }
}

impl fmt::Display for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join fields as `<len>:<value>` records
pub fn serialize_fields(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| format!("{}:{}", field.len(), field))
        .collect()
}

/// Split `<len>:<value>` records back into fields
pub fn deserialize_fields(serialized: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = serialized;

    while !rest.is_empty() {
        let (length, tail) = rest
            .split_once(':')
            .ok_or_else(|| RuntimeError::protocol("<len>:<value>", rest.to_string()))?;
        let length: usize = length
            .parse()
            .map_err(|_| RuntimeError::protocol("numeric field length", length.to_string()))?;
        if tail.len() < length || !tail.is_char_boundary(length) {
            return Err(RuntimeError::protocol(
                format!("{} bytes of field data", length),
                tail.to_string(),
            ));
        }

        fields.push(tail[..length].to_string());
        rest = &tail[length..];
    }

    Ok(fields)
}

/// Identifying tuple matching publishers to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub service: IdString,
    pub instance: IdString,
    pub event: IdString,
}

impl ServiceDescription {
    /// Create a service description from three identifiers
    pub fn new(
        service: impl TryInto<IdString, Error = RuntimeError>,
        instance: impl TryInto<IdString, Error = RuntimeError>,
        event: impl TryInto<IdString, Error = RuntimeError>,
    ) -> Result<Self> {
        Ok(Self {
            service: service.try_into()?,
            instance: instance.try_into()?,
            event: event.try_into()?,
        })
    }

    /// Serialized token form
    pub fn serialize(&self) -> String {
        serialize_fields(&[
            self.service.as_str(),
            self.instance.as_str(),
            self.event.as_str(),
        ])
    }

    /// Parse the serialized token form
    pub fn deserialize(serialized: &str) -> Result<Self> {
        match deserialize_fields(serialized)?.as_slice() {
            [service, instance, event] => {
                Self::new(service.as_str(), instance.as_str(), event.as_str())
            }
            other => Err(RuntimeError::protocol(
                "3 service description fields",
                format!("{} fields", other.len()),
            )),
        }
    }
}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.instance, self.event)
    }
}

impl FromStr for ServiceDescription {
    type Err = RuntimeError;

    /// Parse `service/instance/event`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [service, instance, event] => Self::new(*service, *instance, *event),
            _ => Err(RuntimeError::invalid_parameter(
                "service",
                format!("'{}' is not of the form service/instance/event", s),
            )),
        }
    }
}

/// Middleware interface an endpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Interfaces {
    Internal = 0,
    Esoc,
    SomeIp,
    Amqp,
    Dds,
    Signal,
    Mta,
    Ros1,
}

impl Interfaces {
    /// All interface kinds
    pub const ALL: [Interfaces; 8] = [
        Interfaces::Internal,
        Interfaces::Esoc,
        Interfaces::SomeIp,
        Interfaces::Amqp,
        Interfaces::Dds,
        Interfaces::Signal,
        Interfaces::Mta,
        Interfaces::Ros1,
    ];

    /// Index transmitted on the wire
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode a wire index
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for Interfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Properties of a runnable registered with the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnableProperty {
    pub name: IdString,
    pub device_identifier: u64,
}

impl RunnableProperty {
    /// Create runnable properties
    pub fn new(
        name: impl TryInto<IdString, Error = RuntimeError>,
        device_identifier: u64,
    ) -> Result<Self> {
        Ok(Self {
            name: name.try_into()?,
            device_identifier,
        })
    }

    /// Serialized token form
    pub fn serialize(&self) -> String {
        serialize_fields(&[self.name.as_str(), &self.device_identifier.to_string()])
    }

    /// Parse the serialized token form
    pub fn deserialize(serialized: &str) -> Result<Self> {
        match deserialize_fields(serialized)?.as_slice() {
            [name, device] => {
                let device_identifier = device.parse().map_err(|_| {
                    RuntimeError::protocol("numeric device identifier", device.clone())
                })?;
                Self::new(name.as_str(), device_identifier)
            }
            other => Err(RuntimeError::protocol(
                "2 runnable property fields",
                format!("{} fields", other.len()),
            )),
        }
    }
}

/// Kinds of capability announcements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum CaproMessageType {
    Offer = 1,
    StopOffer = 2,
}

/// What a capability announcement refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum CaproSubType {
    Service = 1,
    Event = 2,
}

/// Capability announcement dispatched through the application port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaproMessage {
    pub kind: CaproMessageType,
    pub sub_type: CaproSubType,
    pub service: ServiceDescription,
}

impl CaproMessage {
    /// Offer a whole service
    pub fn offer(service: ServiceDescription) -> Self {
        Self {
            kind: CaproMessageType::Offer,
            sub_type: CaproSubType::Service,
            service,
        }
    }

    /// Withdraw a whole service
    pub fn stop_offer(service: ServiceDescription) -> Self {
        Self {
            kind: CaproMessageType::StopOffer,
            sub_type: CaproSubType::Service,
            service,
        }
    }
}
