//! Identity of peers reached over the secure stack.
use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq)]
/// DER encoded certificate presented by the remote side of an authenticated channel.
pub struct PeerCertificate(Vec<u8>);

impl PeerCertificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self(der.into())
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex SHA-1 digest of the DER encoding.
    pub fn fingerprint(&self) -> String {
        sha1_smol::Sha1::from(&self.0).digest().to_string()
    }
}

impl Debug for PeerCertificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PeerCertificate({})", self.fingerprint())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Authenticated identity attached to units received over the secure stack.
pub struct AuthContext {
    pub fingerprint: String,
}

impl AuthContext {
    pub fn from_certificate(certificate: &PeerCertificate) -> Self {
        Self {
            fingerprint: certificate.fingerprint(),
        }
    }

    /// Always `true`; plain units carry no [AuthContext] at all.
    pub fn is_secure(&self) -> bool {
        true
    }
}
