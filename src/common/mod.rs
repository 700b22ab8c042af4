//! Plain data types shared by the facility, the dispatcher and the transports.

mod auth;
mod call;
pub(crate) mod millis;
mod service;

pub use auth::*;
pub use call::*;
pub use service::*;
