//! Routing of inbound units to the application handler.

use std::sync::{Arc, Weak};

use flume::TrySendError;
use tracing::{debug, trace};

use crate::common::{AuthContext, Stack};
use crate::handler::{Reply, RequestHandler, StreamRequest};
use crate::transport::{InboundListener, InboundRequest, PeerServer, StreamUnit};
use crate::Error;

/// Listener bound to one [PeerServer].
pub(crate) struct Dispatcher {
    stack: Stack,
    server: Weak<dyn PeerServer>,
    handler: Option<Arc<dyn RequestHandler>>,
    events: flume::Sender<InboundRequest>,
}

impl Dispatcher {
    pub(crate) fn new(
        stack: Stack,
        server: &Arc<dyn PeerServer>,
        handler: Option<Arc<dyn RequestHandler>>,
        events: flume::Sender<InboundRequest>,
    ) -> Self {
        Self {
            stack,
            server: Arc::downgrade(server),
            handler,
            events,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stack", &self.stack)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl InboundListener for Dispatcher {
    fn on_request(&self, mut request: InboundRequest) {
        let Some(handler) = &self.handler else {
            trace!(rid = %request.rid, service = %request.service, "No handler, emitting request");

            match self.events.try_send(request) {
                Ok(()) => {}
                Err(TrySendError::Full(request)) => {
                    debug!(rid = %request.rid, service = %request.service, "Too many pending requests");
                    request.reply.reply(Err(Error::Busy));
                }
                Err(TrySendError::Disconnected(_)) => debug!("Request events receiver dropped"),
            }
            return;
        };

        if let Some(certificate) = &request.certificate {
            request.payload.auth = Some(AuthContext::from_certificate(certificate));
        }

        trace!(
            rid = %request.rid,
            service = %request.service,
            action = %request.payload.action,
            stack = %self.stack,
            "Dispatching request"
        );

        handler.handle(&request.service, request.payload, Reply::new(request.reply));
    }

    fn on_stream(&self, mut unit: StreamUnit) {
        let stream_action = self
            .handler
            .as_ref()
            .and_then(|handler| Some((handler, handler.stream_action(&unit.meta.action)?)));

        if let Some((handler, action)) = stream_action {
            let service = match (unit.meta.rid(), unit.meta.service()) {
                (Some(rid), Some(service)) => {
                    trace!(%rid, %service, %action, stack = %self.stack, "Dispatching stream");
                    service.to_string()
                }
                _ => {
                    debug!(action = %unit.meta.action, "Stream unit without request headers");
                    unit.reply.reply(Err(Error::MissingStreamHeaders));
                    return;
                }
            };

            if let Some(certificate) = &unit.meta.certificate {
                unit.meta.auth = Some(AuthContext::from_certificate(certificate));
            }

            let request = StreamRequest {
                body: unit.request,
                response: unit.response,
                meta: unit.meta,
            };

            handler.handle_stream(&service, &action, request, Reply::new(unit.reply));
            return;
        }

        match self.server.upgrade() {
            Some(server) => server.handle_buffered(unit),
            None => debug!(stack = %self.stack, "Server stopped, dropping stream unit"),
        }
    }
}
