//! Actor implementation - owns the service set, the listeners and the announce loop.

pub(crate) mod dispatch;
mod info;

use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::RecvTimeoutError;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::announce::{announce_targets, secure_port, AnnounceReport};
use crate::core::completion::CompletionStats;
use crate::core::registry::ServiceSet;
use crate::handler::RequestHandler;
use crate::transport::{Directory, InboundRequest, Peers, TransportPair};
use crate::{Error, Result};

use dispatch::Dispatcher;

pub use info::Info;

pub(crate) enum ActorMessage {
    SetServices(Vec<String>, flume::Sender<()>),
    AddServices(Vec<String>, flume::Sender<()>),
    DelServices(Vec<String>, flume::Sender<()>),
    Services(flume::Sender<Vec<String>>),
    Announce(flume::Sender<Result<AnnounceReport>>),
    Info(flume::Sender<Info>),
    Shutdown(flume::Sender<()>),
}

/// State owned by the facility thread.
pub(crate) struct Actor {
    tick_interval: Duration,
    svc_port: Option<u16>,
    sec_port_offset: u16,

    services: ServiceSet,

    link: Arc<dyn Directory>,
    peers: Peers,
    handler: Option<Arc<dyn RequestHandler>>,
    events: flume::Sender<InboundRequest>,

    plain_port: Option<u16>,
    secure_port: Option<u16>,

    ticks: usize,
    announce_failures: usize,
    stats: Arc<CompletionStats>,
}

impl Actor {
    pub(crate) fn new(
        config: &Config,
        link: Arc<dyn Directory>,
        peers: Peers,
        handler: Option<Arc<dyn RequestHandler>>,
        events: flume::Sender<InboundRequest>,
        stats: Arc<CompletionStats>,
    ) -> Self {
        let mut services = ServiceSet::new();
        services.set(config.services.iter().cloned());

        Self {
            tick_interval: config.announce_interval(),
            svc_port: config.svc_port,
            sec_port_offset: config.secure_port_offset(),
            services,
            link,
            peers,
            handler,
            events,
            plain_port: None,
            secure_port: None,
            ticks: 0,
            announce_failures: 0,
            stats,
        }
    }

    pub(crate) fn info(&self) -> Info {
        Info::from(self)
    }

    /// Announce every offered service once.
    ///
    /// Listeners are bound on the first tick that has something to announce. Each
    /// rejected announcement is logged and recorded, and does not stop the others.
    pub(crate) fn tick(&mut self) -> Result<AnnounceReport> {
        self.ticks += 1;

        if self.services.is_empty() {
            debug!("No services offered, skipping announce tick");
            return Ok(AnnounceReport::default());
        }

        let names = self.services.snapshot();

        let Some(port) = self.svc_port else {
            error!(services = ?names, "No port set, set svc_port to announce services");
            return Err(Error::NoPort);
        };

        let targets = announce_targets(&names, port, self.sec_port_offset, self.peers.has_secure())?;

        self.bind(port)?;

        let metadata = json!({});
        let mut report = AnnounceReport::default();

        for target in targets {
            match self.link.announce(&target.name, target.port, &metadata) {
                Ok(()) => report.announced.push(target),
                Err(error) => {
                    let message = error.message();
                    warn!(name = %target.name, port = target.port, %message, "Announce failed");

                    self.announce_failures += 1;
                    report.failed.push((target, message));
                }
            }
        }

        debug!(
            announced = report.announced.len(),
            failed = report.failed.len(),
            "Announce tick done"
        );

        Ok(report)
    }

    fn bind(&mut self, port: u16) -> Result<()> {
        if self.plain_port.is_none() {
            if let Some(pair) = self.peers.plain.clone() {
                self.listen(&pair, port)?;
                self.plain_port = Some(port);
            }
        }

        if self.secure_port.is_none() {
            if let Some(pair) = self.peers.secure.clone() {
                let port = secure_port(port, self.sec_port_offset)?;

                self.listen(&pair, port)?;
                self.secure_port = Some(port);
            }
        }

        Ok(())
    }

    fn listen(&self, pair: &TransportPair, port: u16) -> Result<()> {
        let dispatcher = Dispatcher::new(
            pair.stack,
            &pair.server,
            self.handler.clone(),
            self.events.clone(),
        );

        pair.server
            .listen(port, Arc::new(dispatcher))
            .map_err(|error| Error::Transport(error.message()))?;

        info!(port, stack = %pair.stack, "Listening");

        Ok(())
    }

    /// Stop the link, the outbound clients and the bound servers.
    pub(crate) fn stop(&mut self) {
        self.link.stop();
        self.peers.stop();

        debug!(ticks = self.ticks, "Facility stopped");
    }

    /// Serve `receiver` until shutdown, running a tick every `tick_interval`.
    ///
    /// Ticks are serialized with the messages, so a slow directory delays the
    /// next tick instead of overlapping it. A failing tick is fatal.
    pub(crate) fn run(mut self, receiver: flume::Receiver<ActorMessage>) {
        let mut next_tick = Instant::now() + self.tick_interval;

        let ack = loop {
            match receiver.recv_deadline(next_tick) {
                Ok(message) => match message {
                    ActorMessage::SetServices(names, sender) => {
                        self.services.set(names);
                        let _ = sender.send(());
                    }
                    ActorMessage::AddServices(names, sender) => {
                        self.services.add(names);
                        let _ = sender.send(());
                    }
                    ActorMessage::DelServices(names, sender) => {
                        self.services.remove(names);
                        let _ = sender.send(());
                    }
                    ActorMessage::Services(sender) => {
                        let _ = sender.send(self.services.snapshot());
                    }
                    ActorMessage::Announce(sender) => {
                        let _ = sender.send(self.tick());
                    }
                    ActorMessage::Info(sender) => {
                        let _ = sender.send(self.info());
                    }
                    ActorMessage::Shutdown(sender) => break Some(sender),
                },
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(error) = self.tick() {
                        error!(?error, "Announce tick failed, shutting down");
                        break None;
                    }
                    next_tick = Instant::now() + self.tick_interval;
                }
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        self.stop();

        // Operations sent after this point fail instead of waiting.
        drop(receiver);

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}
