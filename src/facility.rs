//! Facility handle: service offering and request/map invocations.

use std::sync::Arc;
use std::thread;

use serde_json::Value;
use tracing::{debug, info};

use crate::actor::{Actor, ActorMessage, Info};
use crate::common::{Call, CallOptions, ServiceRef};
use crate::config::{Config, TransportKind};
use crate::core::announce::AnnounceReport;
use crate::core::completion::{CallContext, Completion, CompletionStats};
use crate::handler::RequestHandler;
use crate::transport::{InboundRequest, LinkOptions, Network, PeerClient, Peers};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How many peers an invocation reaches.
pub enum CallKind {
    /// One peer, selected by the directory layer.
    Single,
    /// Every peer currently announcing the service.
    Fanout,
}

/// Builder of a [Facility].
pub struct FacilityBuilder {
    config: Config,
    network: Box<dyn Network>,
    handler: Option<Arc<dyn RequestHandler>>,
}

impl FacilityBuilder {
    /// Handler of the inbound units.
    ///
    /// Without a handler, inbound units are surfaced through [Facility::requests].
    pub fn handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Connect the link, set the transport pairs up, run the first announce tick and
    /// start the facility thread.
    pub fn build(self) -> Result<Facility> {
        let config = self.config;

        let link = self.network.link(&LinkOptions::from(&config))?;

        let peers = match config.transport {
            Some(TransportKind::Http) => Peers::setup(&config, self.network.as_ref(), &link)?,
            None => {
                debug!("No transport configured, requests and listeners are disabled");
                Peers::default()
            }
        };

        let stats = Arc::new(CompletionStats::default());
        let (events, requests) = flume::bounded(config.max_pending_requests.max(1));

        let mut actor = Actor::new(
            &config,
            link,
            peers.clone(),
            self.handler,
            events,
            stats.clone(),
        );

        if let Err(error) = actor.tick() {
            actor.stop();
            return Err(error);
        }

        let (sender, receiver) = flume::unbounded();

        thread::Builder::new()
            .name("peer-rpc".to_string())
            .spawn(move || actor.run(receiver))?;

        info!(secure = peers.has_secure(), "Facility started");

        Ok(Facility {
            sender,
            peers,
            stats,
            requests,
        })
    }
}

impl std::fmt::Debug for FacilityBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilityBuilder")
            .field("config", &self.config)
            .field("network", &self.network)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
/// RPC facility: offers services to the directory, answers inbound units and calls
/// services offered by peers.
///
/// Cloning is cheap; every clone drives the same facility thread.
pub struct Facility {
    pub(crate) sender: flume::Sender<ActorMessage>,
    peers: Peers,
    stats: Arc<CompletionStats>,
    requests: flume::Receiver<InboundRequest>,
}

impl Facility {
    pub fn builder(config: Config, network: impl Network + 'static) -> FacilityBuilder {
        FacilityBuilder {
            config,
            network: Box::new(network),
            handler: None,
        }
    }

    // === Getters ===

    /// Information and statistics about this facility.
    pub fn info(&self) -> Result<Info> {
        self.ask(ActorMessage::Info)
    }

    /// Offered services, without any stack prefix.
    pub fn services(&self) -> Result<Vec<String>> {
        self.ask(ActorMessage::Services)
    }

    /// Inbound units received while no handler is registered.
    ///
    /// The reply handle travels with each unit; nothing is replied on its behalf.
    /// Once [Config::max_pending_requests] units are waiting, later ones are replied
    /// [Error::Busy].
    pub fn requests(&self) -> flume::Receiver<InboundRequest> {
        self.requests.clone()
    }

    // === Service set ===

    /// Replace the offered services. Takes effect on the next announce tick.
    pub fn set_services<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.ask(|sender| ActorMessage::SetServices(names, sender))
    }

    /// Offer `names` in addition to the current services.
    pub fn add_services<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.ask(|sender| ActorMessage::AddServices(names, sender))
    }

    /// Stop offering `names`. Names not offered are ignored.
    pub fn del_services<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.ask(|sender| ActorMessage::DelServices(names, sender))
    }

    /// Run an announce tick now, without waiting for the next interval.
    pub fn announce(&self) -> Result<AnnounceReport> {
        self.ask(ActorMessage::Announce)?
    }

    // === Invocations ===

    /// Call `action` on one peer offering `service`, and wait for the result.
    ///
    /// A `sec:` prefixed service is reached over the secure stack.
    pub fn request(
        &self,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        self.invoke(CallKind::Single, service, action, args, options)
    }

    /// Call `action` on every peer offering `service`, and wait for the array of
    /// their results. The first peer error fails the whole call.
    pub fn map(
        &self,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        self.invoke(CallKind::Fanout, service, action, args, options)
    }

    /// Callback version of [Self::request].
    ///
    /// `callback` is called exactly once, possibly before this method returns.
    pub fn request_with<F>(
        &self,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
        callback: F,
    ) where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.invoke_with(CallKind::Single, service, action, args, options, callback)
    }

    /// Callback version of [Self::map].
    pub fn map_with<F>(
        &self,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
        callback: F,
    ) where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.invoke_with(CallKind::Fanout, service, action, args, options, callback)
    }

    /// Blocking invocation of either kind.
    pub fn invoke(
        &self,
        kind: CallKind,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        self.start(kind, service.into(), action.into(), args.into(), options)
            .recv()
            .map_err(|_| Error::Abandoned)?
    }

    /// Callback invocation of either kind.
    ///
    /// Validation and routing errors are delivered through `callback` too.
    pub fn invoke_with<F>(
        &self,
        kind: CallKind,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
        callback: F,
    ) where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let service = service.into();

        match self.prepare(&service, action.into(), args.into()) {
            Ok((client, call)) => {
                let completion = Completion::callback(
                    CallContext::new(service.wire_name(), &call),
                    self.stats.clone(),
                    Box::new(callback),
                );

                launch(kind, &service, client.as_ref(), call, &options, completion);
            }
            Err(error) => callback(Err(error)),
        }
    }

    /// Start an invocation, returning the receiver of its single result.
    pub(crate) fn start(
        &self,
        kind: CallKind,
        service: ServiceRef,
        action: Value,
        args: Value,
        options: CallOptions,
    ) -> flume::Receiver<Result<Value>> {
        match self.prepare(&service, action, args) {
            Ok((client, call)) => {
                let (completion, receiver) = Completion::channel(
                    CallContext::new(service.wire_name(), &call),
                    self.stats.clone(),
                );

                launch(kind, &service, client.as_ref(), call, &options, completion);

                receiver
            }
            Err(error) => {
                let (sender, receiver) = flume::bounded(1);
                let _ = sender.send(Err(error));
                receiver
            }
        }
    }

    fn prepare(
        &self,
        service: &ServiceRef,
        action: Value,
        args: Value,
    ) -> Result<(Arc<dyn PeerClient>, Call)> {
        let call = Call::new(action, args)?;

        if self.sender.is_disconnected() {
            return Err(Error::Shutdown);
        }

        let client = self.peers.client(service.stack())?.clone();

        Ok((client, call))
    }

    // === Lifecycle ===

    /// Stop the announce loop, the link, the clients and the listeners.
    ///
    /// Every clone observes [Error::Shutdown] afterwards.
    pub fn shutdown(&self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        if self.sender.send(ActorMessage::Shutdown(sender)).is_ok() {
            let _ = receiver.recv();
        }
    }

    pub(crate) fn ask<T>(
        &self,
        message: impl FnOnce(flume::Sender<T>) -> ActorMessage,
    ) -> Result<T> {
        let (sender, receiver) = flume::bounded::<T>(1);

        self.sender
            .send(message(sender))
            .map_err(|_| Error::Shutdown)?;

        receiver.recv().map_err(|_| Error::Shutdown)
    }
}

fn launch(
    kind: CallKind,
    service: &ServiceRef,
    client: &dyn PeerClient,
    call: Call,
    options: &CallOptions,
    completion: Completion,
) {
    let wire_name = service.wire_name();
    let options = options.resolve();

    debug!(
        ?kind,
        service = %wire_name,
        action = %call.action,
        timeout = ?options.timeout,
        "Invoking"
    );

    match kind {
        CallKind::Single => client.request(&wire_name, call, &options, completion),
        CallKind::Fanout => client.map(&wire_name, call, &options, completion),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use serde_json::json;

    use crate::config::Proto;
    use crate::handler::Actions;
    use crate::testnet::Testnet;

    use super::*;

    fn config(port: Option<u16>, services: &[&str]) -> Config {
        Config {
            svc_port: port,
            transport: Some(TransportKind::Http),
            protos: vec![Proto::Gen],
            services: services.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn shutdown() {
        let testnet = Testnet::new();
        let facility = Facility::builder(config(None, &[]), testnet).build().unwrap();

        let clone = facility.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));

            clone.shutdown();
        })
        .join()
        .unwrap();

        assert!(matches!(facility.info(), Err(Error::Shutdown)));
        assert!(matches!(
            facility.request("rest:a", "ping", json!([]), CallOptions::default()),
            Err(Error::Shutdown)
        ));

        // Idempotent.
        facility.shutdown();
    }

    #[test]
    fn first_tick_without_port_is_fatal() {
        let testnet = Testnet::new();

        let result = Facility::builder(config(None, &["rest:a"]), testnet).build();

        assert!(matches!(result, Err(Error::NoPort)));
    }

    #[test]
    fn service_set_mutators() {
        let testnet = Testnet::new();
        let facility = Facility::builder(config(Some(2100), &[]), testnet.clone())
            .handler(Actions::new())
            .build()
            .unwrap();

        facility.set_services(["rest:a", "rest:b"]).unwrap();
        facility.add_services(["rest:b", "sec:rest:c"]).unwrap();
        facility.del_services(["rest:a", "rest:missing"]).unwrap();

        assert_eq!(facility.services().unwrap(), vec!["rest:b", "rest:c"]);

        let report = facility.announce().unwrap();
        assert_eq!(report.announced.len(), 2);
        assert_eq!(testnet.lookup("rest:c"), vec![2100]);

        facility.set_services(Vec::<String>::new()).unwrap();
        assert!(facility.announce().unwrap().is_skipped());

        let info = facility.info().unwrap();
        assert_eq!(info.ticks(), 3);
        assert_eq!(info.plain_port(), Some(2100));
        assert!(info.services().is_empty());
    }

    #[test]
    fn without_transport_requests_are_unroutable() {
        let testnet = Testnet::new();
        let facility = Facility::builder(
            Config {
                transport: None,
                ..config(None, &[])
            },
            testnet,
        )
        .build()
        .unwrap();

        assert!(matches!(
            facility.request("rest:a", "ping", json!([]), CallOptions::default()),
            Err(Error::NoPlainTransport)
        ));
    }
}
