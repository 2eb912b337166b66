//! A library for connecting to the Tor network as an anonymous client.
//!
//! [`TorClient`] owns a guard manager, directory client, circuit pool, and
//! link-connection pool, and is bootstrapped once before serving any
//! traffic; [`socks`] layers a SOCKS5 front end on top of it. This crate
//! is a reduced stand-in for the teacher's own `arti-client`: the
//! `R: Runtime` generic, bridges, pluggable transports, onion services,
//! and the key manager are all out of scope here, leaving one concrete,
//! `tokio`-backed client built from exactly the five pieces
//! SPEC_FULL.md §4.9 names.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod client;
mod config;
mod dirfetch;
mod err;
mod socks;

pub use address::{DangerouslyIntoTorAddr, IntoTorAddr, TorAddr, TorAddrError};
pub use client::TorClient;
pub use config::{ConfigBuildError, StreamIsolationPreference, TorClientConfig};
pub use err::{BootstrapAttemptError, Error, ErrorHint, HintableError, Result};
pub use socks::serve as serve_socks;
pub use tor_circmgr::{CircuitTiming, IsolationKey, IsolationLevel, PreemptiveCircuitConfig};
