//! Interfaces of the directory and of the request/response transports.
//!
//! The facility never talks to the network itself. A [Network] builds the
//! directory link and the plain or secure client/server handles, and everything
//! the facility needs from them is expressed by the traits in this module.

pub mod pair;
pub mod secure;

use std::fmt::{self, Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::common::{AuthContext, Call, PeerCertificate, RequestOptions};
use crate::core::completion::Completion;
use crate::core::normalize::RemoteError;
use crate::Result;

pub use pair::{Peers, TransportPair};
pub use secure::{Role, SecureMaterial};

/// Factory of the collaborator handles used by a facility.
pub trait Network: Send + Sync + Debug {
    /// Connect a link to the directory.
    fn link(&self, options: &LinkOptions) -> Result<Arc<dyn Directory>>;

    /// Build an outbound request client sharing `link`.
    fn client(&self, link: Arc<dyn Directory>, options: ClientOptions)
        -> Result<Arc<dyn PeerClient>>;

    /// Build an inbound request server sharing `link`.
    fn server(&self, link: Arc<dyn Directory>, options: ServerOptions)
        -> Result<Arc<dyn PeerServer>>;
}

/// Link to the peer directory.
pub trait Directory: Send + Sync + Debug {
    /// Publish `name` as reachable on `port` of this host.
    ///
    /// Blocks until the directory acknowledged or rejected the announcement.
    fn announce(&self, name: &str, port: u16, metadata: &Value) -> Result<(), RemoteError>;

    /// Resolve `name` to the endpoints currently announcing it.
    ///
    /// An unknown name is reported as `ERR_GRAPE_LOOKUP_EMPTY`, never as an empty list.
    fn lookup(&self, name: &str) -> Result<Vec<SocketAddr>, RemoteError>;

    fn stop(&self) {}
}

/// Outbound side of a transport pair.
///
/// Implementations are expected to complete each [Completion] exactly once, but the
/// facility does not rely on it.
pub trait PeerClient: Send + Sync + Debug {
    /// Call `call` on one peer announcing `service`.
    fn request(&self, service: &str, call: Call, options: &RequestOptions, completion: Completion);

    /// Call `call` on every peer announcing `service`, and complete with the array of
    /// their results.
    fn map(&self, service: &str, call: Call, options: &RequestOptions, completion: Completion);

    fn stop(&self) {}
}

/// Inbound side of a transport pair.
pub trait PeerServer: Send + Sync + Debug {
    /// Start accepting units on `port`, handing them to `listener`.
    fn listen(&self, port: u16, listener: Arc<dyn InboundListener>) -> Result<(), RemoteError>;

    /// Generic handling of a stream unit as one buffered request.
    fn handle_buffered(&self, unit: StreamUnit);

    /// Stop accepting units and drop the listener.
    fn stop(&self);
}

/// Receiver of the units accepted by a [PeerServer].
pub trait InboundListener: Send + Sync + Debug {
    fn on_request(&self, request: InboundRequest);

    fn on_stream(&self, unit: StreamUnit);
}

#[derive(Debug, Clone)]
/// Options for [Network::link].
pub struct LinkOptions {
    /// Address of the directory node to connect to.
    pub grape: Option<String>,
    pub request_timeout: Duration,
    /// How long a lookup result may be reused.
    pub lookup_max_age: Duration,
}

#[derive(Debug, Default)]
/// Options for [Network::client].
pub struct ClientOptions {
    /// Maximum number of destinations per service kept active.
    pub max_active_key_dests: Option<usize>,
    /// Mutual authentication material, for the secure stack.
    pub secure: Option<SecureMaterial>,
}

#[derive(Debug)]
/// Options for [Network::server].
pub struct ServerOptions {
    /// Time an inbound unit may take to be replied to.
    pub timeout: Duration,
    /// Inbound streams are not buffered by the server; they are handed to
    /// [InboundListener::on_stream] first.
    pub disable_buffered: bool,
    /// Mutual authentication material, for the secure stack.
    pub secure: Option<SecureMaterial>,
}

/// One-shot sink for the reply to an inbound unit.
pub struct ReplyHandle(Box<dyn FnOnce(Result<Value>) + Send>);

impl ReplyHandle {
    pub fn new(reply: impl FnOnce(Result<Value>) + Send + 'static) -> Self {
        Self(Box::new(reply))
    }

    pub fn reply(self, result: Result<Value>) {
        (self.0)(result)
    }
}

impl Debug for ReplyHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyHandle")
    }
}

#[derive(Debug, Clone, PartialEq)]
/// The unit handed to an application handler.
pub struct Payload {
    pub action: String,
    pub args: Vec<Value>,
    /// Present only for units received over an authenticated channel.
    pub auth: Option<AuthContext>,
}

impl Payload {
    pub fn is_secure(&self) -> bool {
        self.auth.is_some()
    }
}

impl From<Call> for Payload {
    fn from(call: Call) -> Self {
        Self {
            action: call.action,
            args: call.args,
            auth: None,
        }
    }
}

#[derive(Debug)]
/// A buffered inbound request.
pub struct InboundRequest {
    /// Request id assigned by the transport.
    pub rid: String,
    pub service: String,
    pub payload: Payload,
    pub reply: ReplyHandle,
    /// Certificate of the requester, when the channel is authenticated.
    pub certificate: Option<PeerCertificate>,
}

#[derive(Debug, Clone, Default)]
/// Out-of-band metadata of a stream unit.
pub struct StreamMeta {
    pub action: String,
    /// `[request id, service name, ..]`
    pub info_headers: Vec<String>,
    /// Certificate of the requester, when the channel is authenticated.
    pub certificate: Option<PeerCertificate>,
    pub auth: Option<AuthContext>,
}

impl StreamMeta {
    pub fn rid(&self) -> Option<&str> {
        self.info_headers.first().map(String::as_str)
    }

    pub fn service(&self) -> Option<&str> {
        self.info_headers.get(1).map(String::as_str)
    }
}

#[derive(Debug)]
/// A long-lived or chunked inbound unit.
pub struct StreamUnit {
    /// Request body chunks; disconnected once the body is complete.
    pub request: flume::Receiver<Bytes>,
    /// Response body chunks.
    pub response: flume::Sender<Bytes>,
    pub meta: StreamMeta,
    pub reply: ReplyHandle,
}
