//! Encode and decode the cells that make up the Tor link protocol.
//!
//! A [`chancell::ChanCell`] is the frame exchanged directly over a TLS link
//! between this client and a relay. A [`relaycell::RelayCellFields`] is the
//! inner frame carried inside the payload of a `RELAY` or `RELAY_EARLY`
//! channel cell, onion-encrypted one layer per hop. This crate only knows
//! how to encode and decode these frames; it has no notion of a network
//! connection, a circuit, or cryptography beyond what is needed to compute
//! digests for the replay sieve.

#![warn(missing_docs)]

pub mod chancell;
pub mod relaycell;
pub mod replay;

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error while encoding or decoding a Tor cell.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// An error that occurred in `tor_bytes` while decoding an object.
    #[error("error while parsing {parsed}")]
    BytesErr {
        /// The error that occurred.
        #[source]
        err: tor_bytes::Error,
        /// The thing that was being parsed.
        parsed: &'static str,
    },
    /// We encountered an error while encoding an outgoing message.
    #[error("error while encoding message")]
    EncodeErr(#[from] tor_bytes::EncodeError),
    /// There was a programming error somewhere in this crate or its caller.
    #[error("internal programming error")]
    Internal(#[from] tor_error::InternalError),
    /// Protocol violation at the channel level.
    #[error("channel protocol violation: {0}")]
    ChanProto(String),
    /// Protocol violation at the circuit level.
    #[error("circuit protocol violation: {0}")]
    CircProto(String),
    /// A relay cell's data payload would not fit in the 498-byte budget.
    #[error("relay cell data too long: {0} bytes")]
    RelayDataTooLong(usize),
    /// The replay sieve rejected a cell.
    #[error("replay detected: {0}")]
    Replay(#[from] replay::ReplayError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error as E;
        use ErrorKind as EK;
        match self {
            E::BytesErr {
                err: tor_bytes::Error::Truncated { .. },
                ..
            } => EK::Internal,
            E::EncodeErr(..) => EK::BadApiUsage,
            E::BytesErr { .. } => EK::TorProtocolViolation,
            E::Internal(_) => EK::Internal,
            E::ChanProto(_) => EK::TorProtocolViolation,
            E::CircProto(_) => EK::TorProtocolViolation,
            E::RelayDataTooLong(_) => EK::BadApiUsage,
            E::Replay(_) => EK::TorProtocolViolation,
        }
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
