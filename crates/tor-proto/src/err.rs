//! Declare an error type for tor-proto.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error arising from a link connection, a circuit, or a stream.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error on the underlying TCP or TLS connection.
    #[error("I/O error on link connection")]
    Io(#[source] std::io::Error),

    /// The peer's TLS handshake could not be completed.
    #[error("TLS handshake failed")]
    Tls(#[source] std::io::Error),

    /// A cell or relay cell could not be parsed, or was malformed.
    #[error("cell codec error")]
    CellCodec(#[from] tor_cell::Error),

    /// The peer violated the link or circuit protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer offered no link protocol version in common with ours.
    #[error("no shared link protocol version with peer")]
    NoSharedLinkProtocol,

    /// The `ntor` handshake's AUTH tag did not verify.
    #[error("ntor handshake authentication failed")]
    BadHandshakeAuth,

    /// A CREATE2/EXTEND2 handshake timed out.
    #[error("circuit handshake timed out")]
    HandshakeTimeout,

    /// We received DESTROY while a circuit was still being built.
    #[error("circuit build failed: relay sent DESTROY (reason {0})")]
    CircuitDestroyed(u8),

    /// A relay cell failed the replay sieve.
    #[error("replay detected on circuit")]
    Replay(#[from] tor_cell::replay::ReplayError),

    /// No hop of a circuit recognized an inbound relay cell.
    #[error("inbound relay cell not recognized by any hop")]
    NotRecognized,

    /// A circuit has already accumulated the maximum number of hops this
    /// client supports extending to.
    #[error("circuit already has the maximum number of hops")]
    TooManyHops,

    /// An operation was attempted on a circuit or stream that is closed.
    #[error("circuit or stream is closed")]
    Closed,

    /// A caller tried to write more to a stream than its flow-control
    /// window and the circuit's window together allow, or some other
    /// internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error as E;
        match self {
            E::Io(_) | E::Tls(_) => ErrorKind::LocalNetworkError,
            E::CellCodec(_) => ErrorKind::TorProtocolViolation,
            E::Protocol(_) => ErrorKind::TorProtocolViolation,
            E::NoSharedLinkProtocol => ErrorKind::TorProtocolViolation,
            E::BadHandshakeAuth => ErrorKind::TorProtocolViolation,
            E::HandshakeTimeout => ErrorKind::TorNetworkTimeout,
            E::CircuitDestroyed(_) => ErrorKind::CircuitCollapse,
            E::Replay(_) => ErrorKind::TorProtocolViolation,
            E::NotRecognized => ErrorKind::TorProtocolViolation,
            E::TooManyHops => ErrorKind::BadApiUsage,
            E::Closed => ErrorKind::BadApiUsage,
            E::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
