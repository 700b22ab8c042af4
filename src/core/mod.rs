//! Core facility logic - pure computation with no direct I/O.
//!
//! Contains the offered service set (`registry`), announce planning (`announce`),
//! the single-assignment completion cell (`completion`) and error normalization
//! (`normalize`). All I/O orchestration lives in `actor/` and `facility`, which
//! call into this module.

pub(crate) mod announce;
pub(crate) mod completion;
pub(crate) mod normalize;
pub(crate) mod registry;
