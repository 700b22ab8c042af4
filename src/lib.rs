#![doc = include_str!("../README.md")]

mod actor;
mod async_facility;
mod common;
mod config;
mod core;
mod error;
mod facility;
mod handler;
mod testnet;

// Public modules
pub mod transport;

pub use crate::actor::Info;
pub use crate::async_facility::AsyncFacility;
pub use crate::common::{
    AuthContext, Call, CallOptions, PeerCertificate, RequestOptions, ServiceRef, Stack,
    DEFAULT_CALL_TIMEOUT, SECURE_PREFIX,
};
pub use crate::config::{
    Config, Proto, TransportKind, DEFAULT_LINK_LOOKUP_MAX_AGE, DEFAULT_LINK_REQUEST_TIMEOUT,
    DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_SERVER_TIMEOUT,
};
pub use crate::core::announce::{
    AnnounceReport, AnnounceTarget, DEFAULT_SEC_PORT_OFFSET, DEFAULT_TICK_INTERVAL,
};
pub use crate::core::completion::{CallContext, Completion};
pub use crate::core::normalize::{RemoteError, ERR_LOOKUP_EMPTY, ERR_TIMEOUT};
pub use crate::error::{Error, Result};
pub use crate::facility::{CallKind, Facility, FacilityBuilder};
pub use crate::handler::{Actions, Reply, RequestHandler, StreamRequest};
pub use crate::testnet::Testnet;

pub use bytes::Bytes;
pub use serde_json::{json, Value};
