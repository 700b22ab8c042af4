//! AsyncFacility handle.

use serde_json::Value;

use crate::actor::{ActorMessage, Info};
use crate::common::{CallOptions, ServiceRef};
use crate::core::announce::AnnounceReport;
use crate::facility::{CallKind, Facility};
use crate::{Error, Result};

impl Facility {
    /// Return an async version of the facility handle.
    pub fn as_async(self) -> AsyncFacility {
        AsyncFacility(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the [Facility] handle.
///
/// Every future resolves exactly once, whatever the transport does.
pub struct AsyncFacility(Facility);

impl AsyncFacility {
    /// Returns a reference to the blocking handle.
    pub fn as_blocking(&self) -> &Facility {
        &self.0
    }

    // === Getters ===

    /// Information and statistics about this facility.
    pub async fn info(&self) -> Result<Info> {
        self.ask(ActorMessage::Info).await
    }

    pub async fn services(&self) -> Result<Vec<String>> {
        self.ask(ActorMessage::Services).await
    }

    // === Service set ===

    pub async fn set_services<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.ask(|sender| ActorMessage::SetServices(names, sender))
            .await
    }

    pub async fn add_services<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.ask(|sender| ActorMessage::AddServices(names, sender))
            .await
    }

    pub async fn del_services<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.ask(|sender| ActorMessage::DelServices(names, sender))
            .await
    }

    /// Run an announce tick now.
    pub async fn announce(&self) -> Result<AnnounceReport> {
        self.ask(ActorMessage::Announce).await?
    }

    // === Invocations ===

    /// Async version of [Facility::request].
    pub async fn request(
        &self,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        self.invoke(CallKind::Single, service, action, args, options)
            .await
    }

    /// Async version of [Facility::map].
    pub async fn map(
        &self,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        self.invoke(CallKind::Fanout, service, action, args, options)
            .await
    }

    /// Async version of [Facility::invoke].
    pub async fn invoke(
        &self,
        kind: CallKind,
        service: impl Into<ServiceRef>,
        action: impl Into<Value>,
        args: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        let receiver = self
            .0
            .start(kind, service.into(), action.into(), args.into(), options);

        receiver
            .recv_async()
            .await
            .map_err(|_| Error::Abandoned)?
    }

    // === Lifecycle ===

    /// Shutdown the facility thread.
    pub async fn shutdown(&self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        if self.0.sender.send(ActorMessage::Shutdown(sender)).is_ok() {
            let _ = receiver.recv_async().await;
        }
    }

    async fn ask<T>(&self, message: impl FnOnce(flume::Sender<T>) -> ActorMessage) -> Result<T> {
        let (sender, receiver) = flume::bounded::<T>(1);

        self.0
            .sender
            .send(message(sender))
            .map_err(|_| Error::Shutdown)?;

        receiver.recv_async().await.map_err(|_| Error::Shutdown)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::config::{Config, Proto, TransportKind};
    use crate::handler::Actions;
    use crate::testnet::Testnet;

    use super::*;

    fn config(port: u16, services: &[&str]) -> Config {
        Config {
            svc_port: Some(port),
            transport: Some(TransportKind::Http),
            protos: vec![Proto::Gen],
            services: services.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn shutdown() {
        async fn test() {
            let testnet = Testnet::new();

            let facility = Facility::builder(config(2200, &[]), testnet)
                .build()
                .unwrap()
                .as_async();

            facility.shutdown().await;

            assert!(matches!(facility.services().await, Err(Error::Shutdown)));
        }

        futures::executor::block_on(test());
    }

    #[test]
    fn request_and_services() {
        async fn test() {
            let testnet = Testnet::new();

            let server = Facility::builder(config(2300, &["rest:echo"]), testnet.clone())
                .handler(Actions::new().action("echo", |payload| Ok(json!(payload.args))))
                .build()
                .unwrap()
                .as_async();
            let client = Facility::builder(config(2301, &[]), testnet)
                .build()
                .unwrap()
                .as_async();

            let result = client
                .request("rest:echo", "echo", json!([1, "two"]), CallOptions::default())
                .await
                .unwrap();
            assert_eq!(result, json!([1, "two"]));

            server.add_services(["rest:other"]).await.unwrap();
            assert_eq!(
                server.services().await.unwrap(),
                vec!["rest:echo", "rest:other"]
            );

            assert_eq!(server.info().await.unwrap().plain_port(), Some(2300));
        }

        futures::executor::block_on(test());
    }

    #[test]
    fn validation_rejects_future() {
        async fn test() {
            let facility = Facility::builder(config(2400, &[]), Testnet::new())
                .build()
                .unwrap()
                .as_async();

            assert!(matches!(
                facility
                    .map("rest:a", json!({}), json!([]), CallOptions::default())
                    .await,
                Err(Error::InvalidAction)
            ));
        }

        futures::executor::block_on(test());
    }
}
