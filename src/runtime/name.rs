//! Process identity

use std::fmt;

use crate::{
    config::DEFAULT_RUNTIME_INSTANCE_NAME,
    error::{Result, RuntimeError},
    protocol::SEPARATOR,
};

/// Validated application name, e.g. `/sensorNode`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppName(String);

impl AppName {
    /// Validate `name` as an application name
    ///
    /// The name must be non-empty, must not be the reserved default instance
    /// name and must start with `/`. It additionally must not contain the
    /// protocol separator `,`, which would split it into two tokens on the
    /// wire.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(RuntimeError::invalid_name(name, "Application name must not be empty"));
        }

        if name == DEFAULT_RUNTIME_INSTANCE_NAME {
            return Err(RuntimeError::invalid_name(
                name,
                "Application name has not been specified",
            ));
        }

        if !name.starts_with('/') {
            return Err(RuntimeError::invalid_name(
                name,
                "Application name does not have the required leading slash '/'",
            ));
        }

        if name.contains(SEPARATOR) {
            return Err(RuntimeError::invalid_name(
                name,
                "Application name contains the protocol separator",
            ));
        }

        Ok(Self(name))
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AppName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
