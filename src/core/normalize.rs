//! Normalization of the loosely typed errors reported by peers and transports.
use std::fmt::{self, Display, Formatter};

use crate::Error;

/// Message a transport reports when no reply arrived in time.
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT";
/// Message the directory reports when no peer announced a service.
pub const ERR_LOOKUP_EMPTY: &str = "ERR_GRAPE_LOOKUP_EMPTY";

/// Message a peer replies when it cannot queue more inbound units.
const ERR_BUSY: &str = "ERR_BUSY";

/// Prefix left on messages that were already wrapped in an error once.
const WRAPPED_PREFIX: &str = "Error: ";

#[derive(Debug)]
/// An error as reported by a peer, the directory or a transport.
///
/// The absence of an error (success) is expressed by `Ok(_)` around it.
pub enum RemoteError {
    /// A bare string.
    Message(String),
    /// A structured error; only its message is kept after normalization.
    Structured(Box<dyn std::error::Error + Send + Sync>),
}

impl RemoteError {
    pub fn message(&self) -> String {
        match self {
            RemoteError::Message(message) => message.clone(),
            RemoteError::Structured(error) => error.to_string(),
        }
    }

    /// Map this error to the canonical [Error].
    pub fn normalize(self) -> Error {
        let message = match self {
            RemoteError::Message(message) => message,
            RemoteError::Structured(error) => match error.downcast::<Error>() {
                Ok(error) => return *error,
                Err(error) => error.to_string(),
            },
        };

        let code = unwrap_message(&message);

        match code {
            ERR_TIMEOUT => Error::Timeout,
            ERR_LOOKUP_EMPTY => Error::LookupEmpty,
            ERR_BUSY => Error::Busy,
            _ => Error::Remote(message),
        }
    }
}

/// Strip the prefixes left by wrapping an error message in an error repeatedly.
fn unwrap_message(mut message: &str) -> &str {
    while let Some(inner) = message.strip_prefix(WRAPPED_PREFIX) {
        message = inner;
    }
    message.trim()
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl From<&str> for RemoteError {
    fn from(value: &str) -> Self {
        RemoteError::Message(value.to_string())
    }
}

impl From<String> for RemoteError {
    fn from(value: String) -> Self {
        RemoteError::Message(value)
    }
}

impl From<Error> for RemoteError {
    fn from(value: Error) -> Self {
        RemoteError::Structured(Box::new(value))
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(value: std::io::Error) -> Self {
        RemoteError::Structured(Box::new(value))
    }
}
