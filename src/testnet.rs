//! In-process directory and transports, for tests and demos.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flume::RecvTimeoutError;
use lru::LruCache;
use rand::seq::SliceRandom;
use rustls::pki_types::CertificateDer;
use serde_json::Value;
use tracing::{debug, trace};

use crate::common::{Call, PeerCertificate, RequestOptions};
use crate::core::completion::Completion;
use crate::core::normalize::{RemoteError, ERR_LOOKUP_EMPTY, ERR_TIMEOUT};
use crate::transport::{
    ClientOptions, Directory, InboundListener, InboundRequest, LinkOptions, Network, Payload,
    PeerClient, PeerServer, ReplyHandle, SecureMaterial, ServerOptions, StreamMeta, StreamUnit,
};
use crate::{Error, Result};

const LOOKUP_CACHE_SIZE: usize = 1000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn endpoint(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

#[derive(Debug, Clone, Default)]
/// An in-memory network of facilities.
///
/// Every [Network::link] shares the same directory, and every server listens on a
/// virtual port of the same host. Requests are delivered synchronously to the
/// listener bound on the resolved port, on a thread of the calling client.
pub struct Testnet(Arc<Registry>);

#[derive(Debug, Default)]
struct Registry {
    announced: Mutex<HashMap<String, BTreeSet<u16>>>,
    listeners: Mutex<HashMap<u16, Listener>>,
    rejected: Mutex<HashSet<String>>,
}

#[derive(Debug, Clone)]
struct Listener {
    inbound: Arc<dyn InboundListener>,
    credentials: Option<Credentials>,
}

#[derive(Debug, Clone)]
struct Credentials {
    certificate: Option<PeerCertificate>,
    ca: Vec<CertificateDer<'static>>,
}

impl From<SecureMaterial> for Credentials {
    fn from(material: SecureMaterial) -> Self {
        Self {
            certificate: material.certificate(),
            ca: material.ca,
        }
    }
}

impl Registry {
    fn listener(&self, port: u16) -> Option<Listener> {
        lock(&self.listeners).get(&port).cloned()
    }

    fn ports(&self, name: &str) -> Vec<u16> {
        lock(&self.announced)
            .get(name)
            .map(|ports| ports.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget the listener on `port` and everything announced on it.
    fn unbind(&self, port: u16) {
        lock(&self.listeners).remove(&port);

        let mut announced = lock(&self.announced);
        for ports in announced.values_mut() {
            ports.remove(&port);
        }
        announced.retain(|_, ports| !ports.is_empty());
    }
}

impl Testnet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports currently announcing `name`, bypassing any link cache.
    pub fn lookup(&self, name: &str) -> Vec<u16> {
        self.0.ports(name)
    }

    /// Make every later announcement of `name` fail.
    pub fn reject(&self, name: impl Into<String>) {
        lock(&self.0.rejected).insert(name.into());
    }

    /// Open a stream unit to the listener bound on `port`.
    ///
    /// Returns the receiver of the unit's reply, and the receiver of the response
    /// body chunks.
    pub fn stream(
        &self,
        port: u16,
        meta: StreamMeta,
        body: Vec<Bytes>,
    ) -> Result<(flume::Receiver<Result<Value>>, flume::Receiver<Bytes>)> {
        let listener = self
            .0
            .listener(port)
            .ok_or_else(|| Error::Transport(format!("connection refused {}", endpoint(port))))?;

        let (reply_sender, reply) = flume::bounded(1);
        let (body_sender, request) = flume::unbounded();
        let (response, response_body) = flume::unbounded();

        for chunk in body {
            let _ = body_sender.send(chunk);
        }
        drop(body_sender);

        listener.inbound.on_stream(StreamUnit {
            request,
            response,
            meta,
            reply: ReplyHandle::new(move |result| {
                let _ = reply_sender.send(result);
            }),
        });

        Ok((reply, response_body))
    }
}

impl Network for Testnet {
    fn link(&self, options: &LinkOptions) -> Result<Arc<dyn Directory>> {
        Ok(Arc::new(TestnetLink::new(self.0.clone(), options.lookup_max_age)))
    }

    fn client(
        &self,
        link: Arc<dyn Directory>,
        options: ClientOptions,
    ) -> Result<Arc<dyn PeerClient>> {
        Ok(Arc::new(TestnetClient {
            registry: self.0.clone(),
            link,
            credentials: options.secure.map(Credentials::from),
        }))
    }

    fn server(
        &self,
        _link: Arc<dyn Directory>,
        options: ServerOptions,
    ) -> Result<Arc<dyn PeerServer>> {
        Ok(Arc::new(TestnetServer {
            registry: self.0.clone(),
            credentials: options.secure.map(Credentials::from),
            bound: Mutex::new(None),
        }))
    }
}

#[derive(Debug)]
/// Directory link with a lookup cache.
///
/// Successful lookups are reused for `max_age`; empty lookups are never cached.
struct TestnetLink {
    registry: Arc<Registry>,
    cache: Mutex<LruCache<String, (Instant, Vec<SocketAddr>)>>,
    max_age: Duration,
}

impl TestnetLink {
    fn new(registry: Arc<Registry>, max_age: Duration) -> Self {
        let size = NonZeroUsize::new(LOOKUP_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);

        Self {
            registry,
            cache: Mutex::new(LruCache::new(size)),
            max_age,
        }
    }
}

impl Directory for TestnetLink {
    fn announce(&self, name: &str, port: u16, _metadata: &Value) -> Result<(), RemoteError> {
        if lock(&self.registry.rejected).contains(name) {
            return Err(format!("ERR_GRAPE_ANNOUNCE: {name} rejected").into());
        }

        trace!(?name, port, "Announced");

        lock(&self.registry.announced)
            .entry(name.to_string())
            .or_default()
            .insert(port);

        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Vec<SocketAddr>, RemoteError> {
        let mut cache = lock(&self.cache);

        if let Some((at, endpoints)) = cache.get(name) {
            if at.elapsed() < self.max_age {
                return Ok(endpoints.clone());
            }
        }

        let endpoints: Vec<SocketAddr> =
            self.registry.ports(name).into_iter().map(endpoint).collect();

        if endpoints.is_empty() {
            cache.pop(name);
            return Err(ERR_LOOKUP_EMPTY.into());
        }

        cache.put(name.to_string(), (Instant::now(), endpoints.clone()));

        Ok(endpoints)
    }

    fn stop(&self) {
        lock(&self.cache).clear();
    }
}

#[derive(Debug, Clone)]
struct TestnetClient {
    registry: Arc<Registry>,
    link: Arc<dyn Directory>,
    credentials: Option<Credentials>,
}

impl TestnetClient {
    /// Check that both sides agree on the channel, and return the certificate the
    /// server sees.
    fn handshake(&self, listener: &Listener) -> Result<Option<PeerCertificate>, RemoteError> {
        match (&self.credentials, &listener.credentials) {
            (None, None) => Ok(None),
            (Some(_), None) => Err("ERR_TLS_HANDSHAKE: server is not secure".into()),
            (None, Some(_)) => Err("ERR_TLS_HANDSHAKE: client certificate required".into()),
            (Some(client), Some(server)) if client.ca != server.ca => {
                Err("ERR_TLS_HANDSHAKE: unknown certificate authority".into())
            }
            (Some(client), Some(_)) => Ok(client.certificate.clone()),
        }
    }

    fn call(
        &self,
        endpoint: SocketAddr,
        service: &str,
        call: &Call,
        timeout: Duration,
    ) -> Result<Value, RemoteError> {
        let listener = self
            .registry
            .listener(endpoint.port())
            .ok_or_else(|| format!("ERR_REQUEST_GENERIC: connection refused {endpoint}"))?;

        let certificate = self.handshake(&listener)?;

        let (sender, receiver) = flume::bounded(1);
        let rid = format!("{:016x}", rand::random::<u64>());

        trace!(%rid, %endpoint, ?service, action = ?call.action, "Request");

        listener.inbound.on_request(InboundRequest {
            rid,
            service: service.to_string(),
            payload: Payload::from(call.clone()),
            reply: ReplyHandle::new(move |result| {
                let _ = sender.send(result);
            }),
            certificate,
        });

        match receiver.recv_timeout(timeout) {
            // Errors travel as their message only.
            Ok(result) => result.map_err(|error| RemoteError::from(error.to_string())),
            Err(RecvTimeoutError::Timeout) => Err(ERR_TIMEOUT.into()),
            Err(RecvTimeoutError::Disconnected) => {
                Err("ERR_REQUEST_GENERIC: reply dropped by peer".into())
            }
        }
    }

    fn spawn<F>(&self, task: F, completion: Completion)
    where
        F: FnOnce(TestnetClient) -> Result<Value, RemoteError> + Send + 'static,
    {
        let client = self.clone();

        thread::spawn(move || {
            if let Err(error) = completion.complete(task(client)) {
                debug!(?error, "Completion rejected");
            }
        });
    }
}

impl PeerClient for TestnetClient {
    fn request(&self, service: &str, call: Call, options: &RequestOptions, completion: Completion) {
        let service = service.to_string();
        let timeout = options.timeout;

        self.spawn(
            move |client| {
                let endpoints = client.link.lookup(&service)?;
                let endpoint = endpoints
                    .choose(&mut rand::thread_rng())
                    .copied()
                    .ok_or_else(|| RemoteError::from(ERR_LOOKUP_EMPTY))?;

                client.call(endpoint, &service, &call, timeout)
            },
            completion,
        );
    }

    fn map(&self, service: &str, call: Call, options: &RequestOptions, completion: Completion) {
        let service = service.to_string();
        let timeout = options.timeout;

        self.spawn(
            move |client| {
                let endpoints = client.link.lookup(&service)?;

                endpoints
                    .into_iter()
                    .map(|endpoint| client.call(endpoint, &service, &call, timeout))
                    .collect::<Result<Vec<Value>, RemoteError>>()
                    .map(Value::Array)
            },
            completion,
        );
    }
}

#[derive(Debug)]
struct TestnetServer {
    registry: Arc<Registry>,
    credentials: Option<Credentials>,
    bound: Mutex<Option<(u16, Arc<dyn InboundListener>)>>,
}

impl PeerServer for TestnetServer {
    fn listen(&self, port: u16, listener: Arc<dyn InboundListener>) -> Result<(), RemoteError> {
        let mut listeners = lock(&self.registry.listeners);

        if listeners.contains_key(&port) {
            return Err(format!("ERR_LISTEN: address in use {}", endpoint(port)).into());
        }

        listeners.insert(
            port,
            Listener {
                inbound: listener.clone(),
                credentials: self.credentials.clone(),
            },
        );
        *lock(&self.bound) = Some((port, listener));

        Ok(())
    }

    fn handle_buffered(&self, unit: StreamUnit) {
        let Some((_, listener)) = lock(&self.bound).clone() else {
            debug!("Buffered unit on a server that is not listening");
            return;
        };

        let body: Vec<u8> = unit.request.iter().flat_map(|chunk| chunk.to_vec()).collect();

        let call = match serde_json::from_slice::<Call>(&body) {
            Ok(call) => call,
            Err(error) => {
                unit.reply.reply(Err(Error::Transport(error.to_string())));
                return;
            }
        };

        listener.on_request(InboundRequest {
            rid: unit.meta.rid().unwrap_or_default().to_string(),
            service: unit.meta.service().unwrap_or_default().to_string(),
            payload: Payload::from(call),
            reply: unit.reply,
            certificate: unit.meta.certificate,
        });
    }

    fn stop(&self) {
        // `listen` locks `listeners` before `bound`; never hold `bound` while unbinding.
        let bound = lock(&self.bound).take();

        if let Some((port, _)) = bound {
            self.registry.unbind(port);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn link(testnet: &Testnet, max_age: Duration) -> Arc<dyn Directory> {
        testnet
            .link(&LinkOptions {
                grape: None,
                request_timeout: Duration::from_millis(2500),
                lookup_max_age: max_age,
            })
            .unwrap()
    }

    #[test]
    fn lookup_empty() {
        let testnet = Testnet::new();
        let link = link(&testnet, Duration::from_secs(10));

        let error = link.lookup("rest:missing").unwrap_err();

        assert!(matches!(error.normalize(), Error::LookupEmpty));
    }

    #[test]
    fn empty_lookups_are_not_cached() {
        let testnet = Testnet::new();
        let link = link(&testnet, Duration::from_secs(10));

        assert!(link.lookup("rest:a").is_err());
        link.announce("rest:a", 1337, &Value::Null).unwrap();

        assert_eq!(link.lookup("rest:a").unwrap(), vec![endpoint(1337)]);
    }

    #[test]
    fn lookups_are_cached_until_max_age() {
        let testnet = Testnet::new();
        let cached = link(&testnet, Duration::from_secs(10));
        let fresh = link(&testnet, Duration::ZERO);

        cached.announce("rest:a", 1337, &Value::Null).unwrap();
        assert_eq!(cached.lookup("rest:a").unwrap().len(), 1);

        cached.announce("rest:a", 1338, &Value::Null).unwrap();

        assert_eq!(cached.lookup("rest:a").unwrap(), vec![endpoint(1337)]);
        assert_eq!(
            fresh.lookup("rest:a").unwrap(),
            vec![endpoint(1337), endpoint(1338)]
        );
    }

    #[test]
    fn rejected_announce() {
        let testnet = Testnet::new();
        let link = link(&testnet, Duration::ZERO);

        testnet.reject("rest:a");

        assert!(link.announce("rest:a", 1337, &Value::Null).is_err());
        assert!(link.announce("rest:b", 1337, &Value::Null).is_ok());
        assert_eq!(testnet.lookup("rest:b"), vec![1337]);
    }

    #[test]
    fn stop_forgets_port() {
        let testnet = Testnet::new();
        let link = link(&testnet, Duration::ZERO);

        let server = testnet
            .server(
                link.clone(),
                ServerOptions {
                    timeout: Duration::from_secs(1),
                    disable_buffered: true,
                    secure: None,
                },
            )
            .unwrap();

        #[derive(Debug)]
        struct Nothing;

        impl InboundListener for Nothing {
            fn on_request(&self, _request: InboundRequest) {}
            fn on_stream(&self, _unit: StreamUnit) {}
        }

        server.listen(1337, Arc::new(Nothing)).unwrap();
        assert!(server.listen(1337, Arc::new(Nothing)).is_err());
        link.announce("rest:a", 1337, &Value::Null).unwrap();

        server.stop();

        assert!(testnet.lookup("rest:a").is_empty());
        assert!(testnet.stream(1337, StreamMeta::default(), vec![]).is_err());
    }

    #[derive(Debug)]
    struct Ignore;

    impl InboundListener for Ignore {
        fn on_request(&self, _request: InboundRequest) {}
        fn on_stream(&self, _unit: StreamUnit) {}
    }

    #[test]
    fn listen_and_stop_from_many_threads() {
        let testnet = Testnet::new();

        let handles: Vec<_> = (0..4u16)
            .map(|i| {
                let testnet = testnet.clone();

                thread::spawn(move || {
                    let link = link(&testnet, Duration::ZERO);
                    let server = testnet
                        .server(
                            link,
                            ServerOptions {
                                timeout: Duration::from_secs(1),
                                disable_buffered: true,
                                secure: None,
                            },
                        )
                        .unwrap();

                    for _ in 0..200 {
                        server.listen(4000 + i, Arc::new(Ignore)).unwrap();
                        server.stop();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(testnet.0.listeners.lock().unwrap().is_empty());
    }
}
