//! Construction of the plain and secure transport pairs.

use std::sync::Arc;

use tracing::{debug, info};

use crate::common::Stack;
use crate::config::{Config, Proto};
use crate::{Error, Result};

use super::{
    ClientOptions, Directory, Network, PeerClient, PeerServer, Role, SecureMaterial,
    ServerOptions,
};

#[derive(Debug, Clone)]
/// An outbound client and an inbound server sharing one directory link.
pub struct TransportPair {
    pub client: Arc<dyn PeerClient>,
    pub server: Arc<dyn PeerServer>,
    pub stack: Stack,
}

impl TransportPair {
    pub fn is_secure(&self) -> bool {
        self.stack == Stack::Secure
    }

    fn stop(&self) {
        self.client.stop();
        self.server.stop();
    }
}

#[derive(Debug, Clone, Default)]
/// At most one plain and one secure [TransportPair].
pub struct Peers {
    pub plain: Option<TransportPair>,
    pub secure: Option<TransportPair>,
}

impl Peers {
    /// Build the pairs enabled by `config`.
    ///
    /// The plain pair is built whenever [Proto::Gen] is enabled. The secure pair is
    /// built when [Proto::Sec] is enabled and the secure material directory exists;
    /// a missing directory silently disables it, while unreadable material inside an
    /// existing directory is an error.
    pub fn setup(config: &Config, network: &dyn Network, link: &Arc<dyn Directory>) -> Result<Self> {
        let mut peers = Peers::default();

        if config.protos.contains(&Proto::Gen) {
            peers.plain = Some(TransportPair {
                client: network.client(
                    link.clone(),
                    ClientOptions {
                        max_active_key_dests: config.max_active_key_dests,
                        secure: None,
                    },
                )?,
                server: network.server(
                    link.clone(),
                    ServerOptions {
                        timeout: config.server_timeout,
                        disable_buffered: true,
                        secure: None,
                    },
                )?,
                stack: Stack::Plain,
            });
        }

        if config.protos.contains(&Proto::Sec) {
            let dir = config.secure_dir();

            if dir.is_dir() {
                let client = SecureMaterial::load(&dir, Role::Client)?;
                let server = SecureMaterial::load(&dir, Role::Server)?;

                info!(?dir, fingerprint = ?client.fingerprint(), "Secure stack enabled");

                peers.secure = Some(TransportPair {
                    client: network.client(
                        link.clone(),
                        ClientOptions {
                            max_active_key_dests: config.max_active_key_dests,
                            secure: Some(client),
                        },
                    )?,
                    server: network.server(
                        link.clone(),
                        ServerOptions {
                            timeout: config.server_timeout,
                            disable_buffered: true,
                            secure: Some(server),
                        },
                    )?,
                    stack: Stack::Secure,
                });
            } else {
                debug!(?dir, "No secure material directory, secure stack disabled");
            }
        }

        Ok(peers)
    }

    pub fn pair(&self, stack: Stack) -> Option<&TransportPair> {
        match stack {
            Stack::Plain => self.plain.as_ref(),
            Stack::Secure => self.secure.as_ref(),
        }
    }

    /// The outbound client to route a call over `stack` with.
    pub fn client(&self, stack: Stack) -> Result<&Arc<dyn PeerClient>> {
        match (stack, self.pair(stack)) {
            (_, Some(pair)) => Ok(&pair.client),
            (Stack::Plain, None) => Err(Error::NoPlainTransport),
            (Stack::Secure, None) => Err(Error::NoSecureTransport),
        }
    }

    pub fn has_secure(&self) -> bool {
        self.secure.is_some()
    }

    pub fn stop(&self) {
        if let Some(pair) = &self.secure {
            pair.stop();
        }
        if let Some(pair) = &self.plain {
            pair.stop();
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::testnet::Testnet;
    use crate::transport::LinkOptions;

    use super::*;

    fn link(testnet: &Testnet, config: &Config) -> Arc<dyn Directory> {
        testnet.link(&LinkOptions::from(config)).unwrap()
    }

    fn with_fixtures() -> Config {
        Config {
            root: Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures"),
            ..Default::default()
        }
    }

    #[test]
    fn plain_only_without_secure_directory() {
        let testnet = Testnet::new();
        let config = Config {
            root: Path::new(env!("CARGO_MANIFEST_DIR")).join("src"),
            ..Default::default()
        };

        let peers = Peers::setup(&config, &testnet, &link(&testnet, &config)).unwrap();

        assert!(peers.plain.is_some());
        assert!(!peers.has_secure());
        assert!(matches!(
            peers.client(Stack::Secure),
            Err(Error::NoSecureTransport)
        ));
        assert!(peers.client(Stack::Plain).is_ok());
    }

    #[test]
    fn both_pairs_with_secure_directory() {
        let testnet = Testnet::new();
        let config = with_fixtures();

        let peers = Peers::setup(&config, &testnet, &link(&testnet, &config)).unwrap();

        assert!(!peers.plain.as_ref().unwrap().is_secure());
        assert!(peers.secure.as_ref().unwrap().is_secure());
    }

    #[test]
    fn secure_only() {
        let testnet = Testnet::new();
        let config = Config {
            protos: vec![Proto::Sec],
            ..with_fixtures()
        };

        let peers = Peers::setup(&config, &testnet, &link(&testnet, &config)).unwrap();

        assert!(peers.plain.is_none());
        assert!(peers.has_secure());
        assert!(matches!(
            peers.client(Stack::Plain),
            Err(Error::NoPlainTransport)
        ));
    }

    #[test]
    fn incomplete_material_is_fatal() {
        let testnet = Testnet::new();
        let config = Config {
            root: Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/incomplete"),
            ..Default::default()
        };

        let error = Peers::setup(&config, &testnet, &link(&testnet, &config)).unwrap_err();

        assert!(matches!(
            error,
            Error::SecureMaterial { ref path, .. } if path.ends_with("client-key.pem")
        ));
    }
}
