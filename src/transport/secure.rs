//! Loading of the PEM material used by the mutually authenticated stack.

use std::fmt::{self, Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use crate::common::PeerCertificate;
use crate::{Error, Result};

/// File holding the certificate authority shared by both sides.
pub const CA_CERT_FILE: &str = "ca-crt.pem";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which half of the secure stack the material is for.
pub enum Role {
    /// Outbound client: `client-key.pem`, `client-crt.pem`.
    Client,
    /// Inbound server: `server-key.pem`, `server-crt.pem`.
    Server,
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }

    pub fn key_file(&self) -> String {
        format!("{}-key.pem", self.name())
    }

    pub fn cert_file(&self) -> String {
        format!("{}-crt.pem", self.name())
    }
}

/// Key, certificate chain and certificate authority of one side of the secure stack.
pub struct SecureMaterial {
    pub role: Role,
    pub key: PrivateKeyDer<'static>,
    pub certs: Vec<CertificateDer<'static>>,
    pub ca: Vec<CertificateDer<'static>>,
    /// The remote side must present a certificate signed by `ca`.
    pub request_cert: bool,
}

impl SecureMaterial {
    /// Read the material of `role` from `dir`.
    pub fn load(dir: &Path, role: Role) -> Result<Self> {
        let key = read_key(dir.join(role.key_file()))?;
        let certs = read_certs(dir.join(role.cert_file()))?;
        let ca = read_certs(dir.join(CA_CERT_FILE))?;

        let material = Self {
            role,
            key,
            certs,
            ca,
            request_cert: true,
        };

        debug!(?dir, ?role, fingerprint = ?material.fingerprint(), "Loaded secure material");

        Ok(material)
    }

    /// The leaf certificate this side presents to its peers.
    pub fn certificate(&self) -> Option<PeerCertificate> {
        self.certs
            .first()
            .map(|cert| PeerCertificate::from_der(cert.as_ref()))
    }

    /// SHA-1 fingerprint of [Self::certificate].
    pub fn fingerprint(&self) -> Option<String> {
        self.certificate().map(|cert| cert.fingerprint())
    }
}

impl Debug for SecureMaterial {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureMaterial")
            .field("role", &self.role)
            .field("fingerprint", &self.fingerprint())
            .field("ca", &self.ca.len())
            .field("request_cert", &self.request_cert)
            .finish()
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|error| Error::SecureMaterial {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

fn read_certs(path: PathBuf) -> Result<Vec<CertificateDer<'static>>> {
    let pem = read(&path)?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| Error::SecureMaterial {
            path: path.clone(),
            reason: error.to_string(),
        })?;

    if certs.is_empty() {
        return Err(Error::SecureMaterial {
            path,
            reason: "no certificate found".to_string(),
        });
    }

    Ok(certs)
}

fn read_key(path: PathBuf) -> Result<PrivateKeyDer<'static>> {
    let pem = read(&path)?;

    match rustls_pemfile::private_key(&mut pem.as_slice()) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(Error::SecureMaterial {
            path,
            reason: "no private key found".to_string(),
        }),
        Err(error) => Err(Error::SecureMaterial {
            path,
            reason: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sec")
    }

    #[test]
    fn load_both_roles() {
        let client = SecureMaterial::load(&fixtures(), Role::Client).unwrap();
        let server = SecureMaterial::load(&fixtures(), Role::Server).unwrap();

        assert!(client.request_cert);
        assert!(server.request_cert);
        assert_eq!(client.ca, server.ca);
        assert_eq!(
            client.fingerprint().unwrap(),
            "b976ed496ab547928b203ac770a8085752e2dc09"
        );
        assert_ne!(client.fingerprint(), server.fingerprint());
    }

    #[test]
    fn missing_file() {
        let dir = fixtures().join("does-not-exist");

        let error = SecureMaterial::load(&dir, Role::Client).unwrap_err();

        assert!(matches!(
            error,
            Error::SecureMaterial { ref path, .. } if path.ends_with("client-key.pem")
        ));
    }

    #[test]
    fn certificate_file_without_key() {
        let error = read_key(fixtures().join(CA_CERT_FILE)).unwrap_err();

        assert!(matches!(error, Error::SecureMaterial { .. }));
    }
}
