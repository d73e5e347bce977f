//! Request channel: one request/response pair in flight at a time

use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    error::{Result, RuntimeError},
    memory::{BackingType, SegmentInfo},
    protocol::{Message, MessageType},
    runtime::AppName,
};

use super::transport::Transport;

/// Serializes round trips to the broker over a [`Transport`]
pub struct RequestChannel {
    transport: Box<dyn Transport>,
    /// Held from sending a request until its reply is consumed
    request_guard: Mutex<()>,
    timeout: Duration,
}

impl std::fmt::Debug for RequestChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestChannel")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RequestChannel {
    /// Wrap a connected transport
    pub fn new(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            request_guard: Mutex::new(()),
            timeout,
        }
    }

    /// Reply timeout applied to every request
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and wait for its reply
    pub fn send_request(&self, request: &Message) -> Result<Message> {
        let _guard = self.request_guard.lock().unwrap_or_else(PoisonError::into_inner);
        log::trace!("request: {}", request);
        let response = self.transport.send_request(request, self.timeout)?;
        log::trace!("response: {}", response);
        Ok(response)
    }

    /// Send a message that has no reply
    pub fn send_message(&self, message: &Message) -> Result<()> {
        let _guard = self.request_guard.lock().unwrap_or_else(PoisonError::into_inner);
        log::trace!("message: {}", message);
        self.transport.send_message(message)
    }

    /// Send a heartbeat without contending for the request guard
    pub fn send_keepalive(&self, app_name: &AppName) -> Result<()> {
        self.transport
            .send_message(&Message::request(MessageType::Keepalive).with(app_name))
    }

    /// Register the application and learn which segment to map
    pub fn register(&self, app_name: &AppName) -> Result<SegmentInfo> {
        let request = Message::request(MessageType::Reg)
            .with(app_name)
            .with(std::process::id())
            .with(timestamp_us());

        let response = self.send_request(&request)?;
        decode_registration(&response)
    }
}

/// Decode `REG_ACK, backing, locator, size, segment_manager_offset, timestamp`
pub fn decode_registration(response: &Message) -> Result<SegmentInfo> {
    if response.message_type() != Some(MessageType::RegAck) || response.len() != 6 {
        return Err(RuntimeError::protocol(
            "REG_ACK with 6 tokens",
            response.to_string(),
        ));
    }

    let backing: BackingType = field(response, 1)?.parse()?;
    let locator = field(response, 2)?.to_string();
    let size = field(response, 3)?
        .parse::<usize>()
        .map_err(|_| RuntimeError::protocol("numeric segment size", response.to_string()))?;
    let segment_manager_offset = field(response, 4)?
        .parse::<u64>()
        .map_err(|_| {
            RuntimeError::protocol("numeric segment manager offset", response.to_string())
        })?;

    let info = SegmentInfo {
        backing,
        locator,
        size,
        segment_manager_offset,
    };
    info.validate()?;
    Ok(info)
}

fn field(message: &Message, index: usize) -> Result<&str> {
    message
        .get(index)
        .ok_or_else(|| RuntimeError::protocol(format!("token {}", index), message.to_string()))
}

fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_registration() {
        let reply = Message::decode("REG_ACK,file,/tmp/seg,4096,64,1700000000,").unwrap();
        let info = decode_registration(&reply).unwrap();
        assert_eq!(info.backing, BackingType::FileBacked);
        assert_eq!(info.locator, "/tmp/seg");
        assert_eq!(info.size, 4096);
        assert_eq!(info.segment_manager_offset, 64);
    }

    #[test]
    fn test_decode_registration_rejects_bad_replies() {
        for reply in [
            "IMPL_SENDER_ACK,file,/tmp/seg,4096,64,0,",
            "REG_ACK,file,/tmp/seg,4096,64,",
            "REG_ACK,tape,/tmp/seg,4096,64,0,",
            "REG_ACK,file,/tmp/seg,lots,64,0,",
            "REG_ACK,file,/tmp/seg,4096,8192,0,",
        ] {
            assert!(decode_registration(&Message::decode(reply).unwrap()).is_err(), "{}", reply);
        }
    }
}
