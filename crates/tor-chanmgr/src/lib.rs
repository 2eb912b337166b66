//! Manage a set of link connections to the Tor network.
//!
//! A [`ChanMgr`] keeps at most one open [`tor_proto::channel::Channel`] per
//! relay identity, launches new ones with [`connect_with_retry`]'s
//! exponential backoff, de-duplicates concurrent build requests for the
//! same relay, and evicts channels that have sat idle too long.

#![warn(missing_docs)]

mod err;
mod mgr;
mod retry;

pub use err::{Error, Result};
pub use mgr::ChanMgr;
pub use retry::connect_with_retry;
