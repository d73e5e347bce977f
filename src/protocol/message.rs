//! Ordered-token messages exchanged with the broker

use std::fmt;

use crate::error::{Result, RuntimeError};

use super::types::MessageType;

/// Separator terminating every token on the wire
pub const SEPARATOR: char = ',';

/// Maximum encoded message size in bytes
pub const MAX_MESSAGE_SIZE: usize = 512;

/// A broker message: token 0 is the discriminant, the rest are arguments
///
/// Token order is the whole schema. On the wire every token is followed by
/// [`SEPARATOR`], e.g. `IMPL_SENDER_ACK,4096,`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    tokens: Vec<String>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message starting with the given discriminant
    pub fn request(kind: MessageType) -> Self {
        Self {
            tokens: vec![kind.as_str().to_string()],
        }
    }

    /// Create a message from already split tokens
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a token
    pub fn with(mut self, token: impl fmt::Display) -> Self {
        self.tokens.push(token.to_string());
        self
    }

    /// Append a token in place
    pub fn push(&mut self, token: impl fmt::Display) {
        self.tokens.push(token.to_string());
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if the message has no tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// All tokens in order
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// First token, if any
    pub fn discriminant(&self) -> Option<&str> {
        self.get(0)
    }

    /// Discriminant decoded as a known message type
    pub fn message_type(&self) -> Option<MessageType> {
        self.discriminant().and_then(MessageType::from_token)
    }

    /// Check that no token would break the framing
    pub fn is_valid(&self) -> bool {
        self.tokens.iter().all(|token| !token.contains(SEPARATOR))
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<String> {
        if let Some(token) = self.tokens.iter().find(|token| token.contains(SEPARATOR)) {
            return Err(RuntimeError::invalid_parameter(
                "token",
                format!("'{}' contains the separator '{}'", token, SEPARATOR),
            ));
        }

        let mut encoded = String::with_capacity(self.tokens.iter().map(|t| t.len() + 1).sum());
        for token in &self.tokens {
            encoded.push_str(token);
            encoded.push(SEPARATOR);
        }

        if encoded.len() > MAX_MESSAGE_SIZE {
            return Err(RuntimeError::invalid_parameter(
                "message",
                format!("{} bytes exceed the limit of {}", encoded.len(), MAX_MESSAGE_SIZE),
            ));
        }

        Ok(encoded)
    }

    /// Decode from the wire
    pub fn decode(encoded: &str) -> Result<Self> {
        if encoded.len() > MAX_MESSAGE_SIZE {
            return Err(RuntimeError::protocol(
                format!("at most {} bytes", MAX_MESSAGE_SIZE),
                format!("{} bytes", encoded.len()),
            ));
        }

        if encoded.is_empty() {
            return Ok(Self::new());
        }

        let body = encoded.strip_suffix(SEPARATOR).ok_or_else(|| {
            RuntimeError::protocol("message terminated by the separator", encoded.to_string())
        })?;

        Ok(Self::from_tokens(body.split(SEPARATOR)))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "{}{}", token, SEPARATOR)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let message = Message::request(MessageType::ImplSenderAck).with(4096);
        assert_eq!(message.encode().unwrap(), "IMPL_SENDER_ACK,4096,");
        assert_eq!(message.message_type(), Some(MessageType::ImplSenderAck));
    }

    #[test]
    fn test_decode() {
        let message = Message::decode("FIND_SERVICE,/app,5:Radar,").unwrap();
        assert_eq!(message.len(), 3);
        assert_eq!(message.get(1), Some("/app"));
        assert_eq!(message.get(2), Some("5:Radar"));

        assert!(Message::decode("").unwrap().is_empty());
        assert!(Message::decode("unterminated").is_err());
    }

    #[test]
    fn test_separator_in_token_rejected() {
        let message = Message::request(MessageType::FindService).with("a,b");
        assert!(!message.is_valid());
        assert!(message.encode().is_err());
    }

    #[test]
    fn test_size_limit() {
        let message = Message::new().with("x".repeat(MAX_MESSAGE_SIZE));
        assert!(message.encode().is_err());
    }
}
