//! The `{ action, args }` unit carried by every request.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Default time to wait for a reply to a request.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(120_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An action to invoke on a peer, and its positional arguments.
pub struct Call {
    pub action: String,
    pub args: Vec<Value>,
}

impl Call {
    /// Validates a loosely typed action and arguments.
    ///
    /// Returns [Error::InvalidAction] if `action` is not a string, then
    /// [Error::InvalidArgs] if `args` is not an array.
    pub fn new(action: impl Into<Value>, args: impl Into<Value>) -> Result<Self> {
        let action = match action.into() {
            Value::String(action) => action,
            _ => return Err(Error::InvalidAction),
        };

        let args = match args.into() {
            Value::Array(args) => args,
            _ => return Err(Error::InvalidArgs),
        };

        Ok(Call { action, args })
    }

    /// Arguments encoded as a JSON array, for diagnostics.
    pub fn args_json(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Caller overrides for a single invocation.
///
/// Unset fields fall back to the defaults, so `{ "timeout": 500 }` only changes the
/// timeout.
pub struct CallOptions {
    /// Time to wait for a reply, in milliseconds on the wire.
    ///
    /// Defaults to [DEFAULT_CALL_TIMEOUT]
    #[serde(default, with = "crate::common::millis::option")]
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Merge these overrides over the defaults.
    pub fn resolve(&self) -> RequestOptions {
        RequestOptions {
            timeout: self.timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Fully resolved options handed to the transport.
pub struct RequestOptions {
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        CallOptions::default().resolve()
    }
}
