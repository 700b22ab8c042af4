use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::announce::{DEFAULT_SEC_PORT_OFFSET, DEFAULT_TICK_INTERVAL};
use crate::transport::LinkOptions;
use crate::Result;

/// Default time an inbound unit may take to be replied to.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_millis(600_000);
/// Default timeout of requests made by the directory link.
pub const DEFAULT_LINK_REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);
/// Default number of inbound units kept waiting in [crate::Facility::requests].
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1000;
/// Default age after which the directory link looks a service up again.
pub const DEFAULT_LINK_LOOKUP_MAX_AGE: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Transport family used for the request/response pairs.
pub enum TransportKind {
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Transport pair to enable.
pub enum Proto {
    /// Plain pair.
    Gen,
    /// Mutually authenticated pair.
    Sec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Facility configurations
///
/// Durations are expressed in milliseconds when (de)serialized.
pub struct Config {
    /// Address of the directory node the link connects to.
    ///
    /// Defaults to None, leaving the choice to the [crate::transport::Network].
    pub grape: Option<String>,
    /// Interval between two announce ticks.
    ///
    /// Defaults to [DEFAULT_TICK_INTERVAL], which zero also stands for.
    #[serde(alias = "tickInterval", with = "crate::common::millis")]
    pub tick_interval: Duration,
    /// Offset from [Config::svc_port] of the secure listening port.
    ///
    /// Defaults to [DEFAULT_SEC_PORT_OFFSET], which zero also stands for.
    #[serde(alias = "secPortOffset")]
    pub sec_port_offset: u16,
    /// Port the plain listener binds to and services are announced on.
    ///
    /// Required as soon as any service is offered.
    #[serde(alias = "svcPort")]
    pub svc_port: Option<u16>,
    /// Time an inbound unit may take to be replied to.
    ///
    /// Defaults to [DEFAULT_SERVER_TIMEOUT]
    #[serde(alias = "serverTimeout", with = "crate::common::millis")]
    pub server_timeout: Duration,
    /// Timeout of the requests made by the directory link.
    ///
    /// Defaults to [DEFAULT_LINK_REQUEST_TIMEOUT]
    #[serde(alias = "linkRequestTimeout", with = "crate::common::millis")]
    pub link_request_timeout: Duration,
    /// How long the directory link may reuse a lookup result.
    ///
    /// Defaults to [DEFAULT_LINK_LOOKUP_MAX_AGE]
    #[serde(alias = "linkLookupMaxAge", with = "crate::common::millis")]
    pub link_lookup_max_age: Duration,
    /// Transport family. Transport pairs are only set up when this is set.
    ///
    /// Defaults to None
    pub transport: Option<TransportKind>,
    /// Transport pairs to enable.
    ///
    /// Defaults to both [Proto::Gen] and [Proto::Sec]
    pub protos: Vec<Proto>,
    /// Services offered from start-up.
    pub services: Vec<String>,
    /// Maximum number of destinations per service kept active by outbound clients.
    #[serde(alias = "maxActiveKeyDests")]
    pub max_active_key_dests: Option<usize>,
    /// Inbound units kept waiting in [crate::Facility::requests] while no handler is
    /// registered. Later units are replied `ERR_BUSY`.
    ///
    /// Defaults to [DEFAULT_MAX_PENDING_REQUESTS]
    #[serde(alias = "maxPendingRequests")]
    pub max_pending_requests: usize,
    /// Root directory; the secure material is read from `<root>/sec`.
    ///
    /// Defaults to the current directory.
    pub root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grape: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            sec_port_offset: DEFAULT_SEC_PORT_OFFSET,
            svc_port: None,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            link_request_timeout: DEFAULT_LINK_REQUEST_TIMEOUT,
            link_lookup_max_age: DEFAULT_LINK_LOOKUP_MAX_AGE,
            transport: None,
            protos: vec![Proto::Gen, Proto::Sec],
            services: Vec::new(),
            max_active_key_dests: None,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Parse a JSON configuration; missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;

        Self::from_json(&json)
    }

    /// [Config::tick_interval], or the default when it is zero.
    pub(crate) fn announce_interval(&self) -> Duration {
        if self.tick_interval.is_zero() {
            DEFAULT_TICK_INTERVAL
        } else {
            self.tick_interval
        }
    }

    /// [Config::sec_port_offset], or the default when it is zero.
    pub(crate) fn secure_port_offset(&self) -> u16 {
        match self.sec_port_offset {
            0 => DEFAULT_SEC_PORT_OFFSET,
            offset => offset,
        }
    }

    /// Directory holding the secure material.
    pub fn secure_dir(&self) -> PathBuf {
        self.root.join("sec")
    }
}

impl From<&Config> for LinkOptions {
    fn from(config: &Config) -> Self {
        LinkOptions {
            grape: config.grape.clone(),
            request_timeout: config.link_request_timeout,
            lookup_max_age: config.link_lookup_max_age,
        }
    }
}
