//! Link connections, the `ntor` handshake, onion-cell crypto, circuits and
//! the stream multiplexer for a client-only Tor implementation.
//!
//! A [`channel::Channel`] is one TLS link connection to a relay, carrying
//! zero or more circuits. A [`circuit::ClientCirc`] is a path built one hop
//! at a time over a channel via `CREATE2`/`EXTEND2`. A
//! [`stream::DataStream`] is an application-visible byte stream multiplexed
//! over a circuit.

#![warn(missing_docs)]

pub mod channel;
pub mod circuit;
pub mod crypto;
pub mod err;
pub mod stream;

pub use err::{Error, Result};
