//! Build and pool isolated circuits over a set of link connections.
//!
//! A [`CircMgr`] turns a [`tor_netdir::Consensus`] snapshot and a
//! [`tor_chanmgr::ChanMgr`] into ready-to-use, multi-hop
//! [`tor_proto::circuit::ClientCirc`]s: [`config`] holds its build/rotation
//! timing and preemptive pool sizing, [`isolation`] holds the key type
//! requests are leased by, [`err`] holds its error type, and [`mgr`] holds
//! the pool itself.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod err;
mod isolation;
mod mgr;

pub use config::{CircuitTiming, ConfigBuildError, PreemptiveCircuitConfig};
pub use err::{Error, Result};
pub use isolation::{IsolationKey, IsolationLevel};
pub use mgr::CircMgr;
