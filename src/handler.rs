//! Application side of inbound dispatch.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use crate::core::normalize::RemoteError;
use crate::transport::{Payload, ReplyHandle, StreamMeta};
use crate::Error;

/// Handler of the units received by a facility.
///
/// Every unit comes with a [Reply] which must be used at most once; it is consumed
/// by [Reply::send].
pub trait RequestHandler: Send + Sync {
    /// Handle a buffered request for `service`.
    fn handle(&self, service: &str, payload: Payload, reply: Reply);

    /// Name of the stream handler for `action`, if this handler consumes raw
    /// streams for it.
    fn stream_action(&self, _action: &str) -> Option<String> {
        None
    }

    /// Handle a stream unit routed by [Self::stream_action].
    fn handle_stream(&self, _service: &str, _action: &str, _request: StreamRequest, reply: Reply) {
        reply.send(Err(Error::StreamUnsupported.into()));
    }
}

/// One-shot reply to an inbound unit.
///
/// Handler errors are normalized before they reach the transport, so `"ERR_TIMEOUT"`,
/// a bare string and a structured error all travel the same way.
pub struct Reply(ReplyHandle);

impl Reply {
    pub(crate) fn new(handle: ReplyHandle) -> Self {
        Self(handle)
    }

    pub fn send(self, result: Result<Value, RemoteError>) {
        self.0.reply(result.map_err(RemoteError::normalize))
    }

    pub fn ok(self, value: impl Into<Value>) {
        self.send(Ok(value.into()))
    }

    pub fn err(self, error: impl Into<RemoteError>) {
        self.send(Err(error.into()))
    }
}

impl Debug for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Reply")
    }
}

#[derive(Debug)]
/// Raw streams of a unit handed to [RequestHandler::handle_stream].
pub struct StreamRequest {
    /// Request body chunks; disconnected once the body is complete.
    pub body: flume::Receiver<Bytes>,
    /// Response body chunks.
    pub response: flume::Sender<Bytes>,
    /// Metadata, with [StreamMeta::auth] set for authenticated channels.
    pub meta: StreamMeta,
}

type Action = Box<dyn Fn(Payload) -> Result<Value, RemoteError> + Send + Sync>;

#[derive(Default)]
/// A [RequestHandler] mapping action names to synchronous closures.
///
/// ```
/// use peer_rpc::Actions;
/// use serde_json::json;
///
/// let actions = Actions::new().action("ping", |_| Ok(json!("pong")));
/// ```
pub struct Actions {
    actions: HashMap<String, Action>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action`, replacing any previous closure with the same name.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Payload) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Box::new(action));
        self
    }
}

impl RequestHandler for Actions {
    fn handle(&self, service: &str, payload: Payload, reply: Reply) {
        match self.actions.get(&payload.action) {
            Some(action) => reply.send(action(payload)),
            None => {
                debug!(?service, action = ?payload.action, "Unknown action");
                reply.err(Error::UnknownAction(payload.action))
            }
        }
    }
}

impl Debug for Actions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.actions.keys().collect();
        names.sort();

        f.debug_struct("Actions").field("actions", &names).finish()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::Result;

    use super::*;

    fn reply_channel() -> (Reply, flume::Receiver<Result<Value>>) {
        let (sender, receiver) = flume::bounded(1);

        let reply = Reply::new(ReplyHandle::new(move |result| {
            let _ = sender.send(result);
        }));

        (reply, receiver)
    }

    fn payload(action: &str) -> Payload {
        Payload {
            action: action.to_string(),
            args: vec![json!(2)],
            auth: None,
        }
    }

    #[test]
    fn dispatch_to_action() {
        let actions = Actions::new().action("double", |payload| {
            Ok(json!(payload.args[0].as_i64().unwrap_or_default() * 2))
        });

        let (reply, receiver) = reply_channel();
        actions.handle("rest:math", payload("double"), reply);

        assert_eq!(receiver.recv().unwrap().unwrap(), json!(4));
    }

    #[test]
    fn unknown_action() {
        let (reply, receiver) = reply_channel();
        Actions::new().handle("rest:math", payload("double"), reply);

        assert!(matches!(
            receiver.recv().unwrap(),
            Err(Error::UnknownAction(action)) if action == "double"
        ));
    }

    #[test]
    fn string_errors_are_normalized() {
        let actions = Actions::new()
            .action("slow", |_| Err("Error: ERR_TIMEOUT".into()))
            .action("fail", |_| Err("boom".into()));

        let (reply, receiver) = reply_channel();
        actions.handle("rest:math", payload("slow"), reply);
        assert!(matches!(receiver.recv().unwrap(), Err(Error::Timeout)));

        let (reply, receiver) = reply_channel();
        actions.handle("rest:math", payload("fail"), reply);
        assert!(matches!(receiver.recv().unwrap(), Err(Error::Remote(m)) if m == "boom"));
    }

    #[test]
    fn streams_unsupported_by_default() {
        let (reply, receiver) = reply_channel();
        let (_, body) = flume::unbounded();
        let (response, _) = flume::unbounded();

        Actions::new().handle_stream(
            "rest:math",
            "upload",
            StreamRequest {
                body,
                response,
                meta: StreamMeta::default(),
            },
            reply,
        );

        assert!(matches!(receiver.recv().unwrap(), Err(Error::StreamUnsupported)));
        assert_eq!(Actions::new().stream_action("upload"), None);
    }
}
