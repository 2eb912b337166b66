//! Fetch, parse, and serve a queryable snapshot of the Tor network
//! directory: the relay list a client needs to choose a guard, a middle,
//! and an exit.
//!
//! This is a reduced stand-in for the teacher's `tor-netdir` +
//! `tor-netdoc` + `tor-dirclient` split: one crate that knows how to
//! parse a consensus document ([`consensus`]), describe one relay
//! ([`relay`]), and keep a client's view of the network refreshed from a
//! small set of fallback directories ([`dirclient`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod consensus;
pub mod dirclient;
mod err;
mod relay;

pub use consensus::{Consensus, ConsensusSnapshot, MAX_CONSENSUS_AGE};
pub use dirclient::{default_fallback_dirs, ConsensusFetcher, DirectoryClient, FallbackDir};
pub use err::Error;
pub use relay::{ExitPolicy, Relay, RelayFlags};
