//! Planning of the announcements made on every tick.

use crate::common::Stack;
use crate::{Error, Result};

/// Default interval between two announce ticks.
pub const DEFAULT_TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(45_000);
/// Default offset between the plain and the secure listening ports.
pub const DEFAULT_SEC_PORT_OFFSET: u16 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One `(name, port)` pair to publish to the directory.
pub struct AnnounceTarget {
    /// Name on the wire, `sec:` prefixed for the secure stack.
    pub name: String,
    pub port: u16,
    pub stack: Stack,
}

/// Port the secure listener binds to.
pub fn secure_port(port: u16, offset: u16) -> Result<u16> {
    port.checked_add(offset)
        .ok_or(Error::SecurePortOverflow { port, offset })
}

/// Expand a snapshot of service names into announce targets.
///
/// Every name is announced on `port`. If `secure` is true, every name is also
/// announced as `sec:<name>` on `port + offset`, after all the plain names.
pub fn announce_targets(
    names: &[String],
    port: u16,
    offset: u16,
    secure: bool,
) -> Result<Vec<AnnounceTarget>> {
    let mut targets: Vec<AnnounceTarget> = names
        .iter()
        .map(|name| AnnounceTarget {
            name: Stack::Plain.wire_name(name),
            port,
            stack: Stack::Plain,
        })
        .collect();

    if secure {
        let secure_port = secure_port(port, offset)?;

        targets.extend(names.iter().map(|name| AnnounceTarget {
            name: Stack::Secure.wire_name(name),
            port: secure_port,
            stack: Stack::Secure,
        }));
    }

    Ok(targets)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Outcome of one announce tick.
pub struct AnnounceReport {
    /// Targets the directory accepted, in announce order.
    pub announced: Vec<AnnounceTarget>,
    /// Targets the directory rejected, with the reported error message.
    pub failed: Vec<(AnnounceTarget, String)>,
}

impl AnnounceReport {
    /// Returns `true` if the tick had nothing to announce.
    pub fn is_skipped(&self) -> bool {
        self.announced.is_empty() && self.failed.is_empty()
    }
}
