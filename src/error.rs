//! Main Crate Error

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
/// peer-rpc crate error enum.
///
/// The [Display](std::fmt::Display) of each variant is a stable error code, since
/// errors travel between peers as plain strings.
pub enum Error {
    /// The requested action is not a string.
    #[error("ERR_GRC_REQ_ACTION_INVALID")]
    InvalidAction,

    /// The request arguments are not an ordered sequence.
    #[error("ERR_GRC_REQ_ARGS_INVALID")]
    InvalidArgs,

    /// A `sec:` service was requested but no secure transport pair is configured.
    #[error("ERR_GRC_NO_SECURE_TRANSPORT")]
    NoSecureTransport,

    /// A plain service was requested but the plain transport pair is disabled.
    #[error("ERR_GRC_NO_PLAIN_TRANSPORT")]
    NoPlainTransport,

    /// The directory found no peer for the requested service.
    #[error("ERR_GRAPE_LOOKUP_EMPTY")]
    LookupEmpty,

    /// No reply arrived within the request timeout.
    #[error("ERR_TIMEOUT")]
    Timeout,

    /// Any other error reported by a peer or the transport, normalized to its message.
    #[error("{0}")]
    Remote(String),

    /// The transport completed the same invocation more than once.
    ///
    /// Only ever returned to the transport, never to the caller.
    #[error("ERR_DOUBLE_CB {service} {action} {args}")]
    DoubleCompletion {
        service: String,
        action: String,
        /// JSON encoded arguments of the invocation.
        args: String,
    },

    /// Services are set to be announced, but no listening port is configured.
    #[error("ERR_NO_PORT")]
    NoPort,

    /// `port + sec_port_offset` does not fit in a port number.
    #[error("ERR_SEC_PORT_OVERFLOW: {port} + {offset}")]
    SecurePortOverflow { port: u16, offset: u16 },

    /// Listening, binding or handshaking failed inside the transport.
    #[error("ERR_TRANSPORT: {0}")]
    Transport(String),

    /// The handler offers no action with this name.
    #[error("ERR_API_ACTION_NOTFOUND")]
    UnknownAction(String),

    /// The handler advertised a stream action but does not handle streams.
    #[error("ERR_API_STREAM_UNSUPPORTED")]
    StreamUnsupported,

    /// Too many inbound units are waiting in [crate::Facility::requests].
    #[error("ERR_BUSY")]
    Busy,

    /// A stream unit arrived without its request id and service headers.
    #[error("ERR_STREAM_HEADERS_MISSING")]
    MissingStreamHeaders,

    /// Secure transport material could not be loaded.
    #[error("ERR_SEC_MATERIAL: {}: {reason}", path.display())]
    SecureMaterial { path: PathBuf, reason: String },

    #[error(transparent)]
    /// Transparent [std::io::Error]
    Io(#[from] std::io::Error),

    #[error("ERR_CONFIG: {0}")]
    /// Failed to parse a configuration file.
    Config(#[from] serde_json::Error),

    /// The facility was shutdown.
    #[error("ERR_GRC_SHUTDOWN")]
    Shutdown,

    /// Every handle able to complete the invocation was dropped before completing it.
    #[error("ERR_GRC_ABANDONED")]
    Abandoned,
}

impl Error {
    /// Stable error code of this error, without any attached detail.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAction => "ERR_GRC_REQ_ACTION_INVALID",
            Error::InvalidArgs => "ERR_GRC_REQ_ARGS_INVALID",
            Error::NoSecureTransport => "ERR_GRC_NO_SECURE_TRANSPORT",
            Error::NoPlainTransport => "ERR_GRC_NO_PLAIN_TRANSPORT",
            Error::LookupEmpty => "ERR_GRAPE_LOOKUP_EMPTY",
            Error::Timeout => "ERR_TIMEOUT",
            Error::Remote(_) => "ERR_REMOTE",
            Error::DoubleCompletion { .. } => "ERR_DOUBLE_CB",
            Error::NoPort => "ERR_NO_PORT",
            Error::SecurePortOverflow { .. } => "ERR_SEC_PORT_OVERFLOW",
            Error::Transport(_) => "ERR_TRANSPORT",
            Error::UnknownAction(_) => "ERR_API_ACTION_NOTFOUND",
            Error::StreamUnsupported => "ERR_API_STREAM_UNSUPPORTED",
            Error::Busy => "ERR_BUSY",
            Error::MissingStreamHeaders => "ERR_STREAM_HEADERS_MISSING",
            Error::SecureMaterial { .. } => "ERR_SEC_MATERIAL",
            Error::Io(_) => "ERR_IO",
            Error::Config(_) => "ERR_CONFIG",
            Error::Shutdown => "ERR_GRC_SHUTDOWN",
            Error::Abandoned => "ERR_GRC_ABANDONED",
        }
    }
}

/// Alias for `Result<T, peer_rpc::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_the_stable_code() {
        assert_eq!(Error::InvalidAction.to_string(), "ERR_GRC_REQ_ACTION_INVALID");
        assert_eq!(Error::LookupEmpty.to_string(), Error::LookupEmpty.code());
        assert_ne!(Error::LookupEmpty.to_string(), Error::Timeout.to_string());
        assert_eq!(Error::Remote("boom".into()).to_string(), "boom");
    }
}
