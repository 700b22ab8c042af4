use super::Actor;

/// Information and statistics about a facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    services: Vec<String>,
    plain_port: Option<u16>,
    secure_port: Option<u16>,
    secure: bool,
    ticks: usize,
    announce_failures: usize,
    double_completions: usize,
}

impl Info {
    /// Offered services, without any stack prefix.
    pub fn services(&self) -> &[String] {
        &self.services
    }
    /// Port the plain listener is bound to, once the first announce tick bound it.
    pub fn plain_port(&self) -> Option<u16> {
        self.plain_port
    }
    /// Port the secure listener is bound to, once the first announce tick bound it.
    pub fn secure_port(&self) -> Option<u16> {
        self.secure_port
    }
    /// Returns `true` if the secure transport pair is configured.
    pub fn secure(&self) -> bool {
        self.secure
    }
    /// Number of announce ticks run so far, skipped ones included.
    pub fn ticks(&self) -> usize {
        self.ticks
    }
    /// Number of announcements the directory rejected.
    pub fn announce_failures(&self) -> usize {
        self.announce_failures
    }
    /// Number of extra completions reported by the transports and discarded.
    pub fn double_completions(&self) -> usize {
        self.double_completions
    }
}

impl From<&Actor> for Info {
    fn from(actor: &Actor) -> Self {
        Self {
            services: actor.services.snapshot(),
            plain_port: actor.plain_port,
            secure_port: actor.secure_port,
            secure: actor.peers.has_secure(),
            ticks: actor.ticks,
            announce_failures: actor.announce_failures,
            double_completions: actor.stats.double_completions(),
        }
    }
}
