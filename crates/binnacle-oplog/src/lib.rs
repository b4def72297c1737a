//! Author-signed, append-only operation logs.
//!
//! An [`Op`] is the smallest unit of history: a typed, timestamped record
//! attributable to an author. A [`Log`] is an append-only ordered sequence of
//! ops plus zero or more child logs (a rose tree), identified by the hash of
//! its first op. The [`wire`] module provides the canonical version-byte
//! envelope and detached ed25519 signing used at every persistence and
//! transport boundary.

mod error;
mod log;
mod op;
pub mod wire;

pub use error::OplogError;
pub use log::Log;
pub use op::{Op, OpModel};
