//! Declare an error type for tor-socksproto.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error arising from a SOCKS5 negotiation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The client's bytes did not parse as a well-formed SOCKS5 message.
    #[error("malformed SOCKS5 message: {0}")]
    Malformed(#[from] tor_bytes::Error),

    /// The client's connection closed (or the socket errored) mid-handshake.
    #[error("I/O error during SOCKS5 handshake: {0}")]
    Io(#[from] std::io::Error),

    /// None of the client's offered authentication methods are acceptable.
    #[error("no acceptable SOCKS5 authentication method offered")]
    NoAcceptableAuthMethod,

    /// The RFC 1929 username/password sub-negotiation did not follow the
    /// greeting that selected it.
    #[error("username/password sub-negotiation failed")]
    AuthFailed,

    /// The request named `BIND` or `UDP_ASSOCIATE`, which this proxy never
    /// performs.
    #[error("requested SOCKS5 command is not supported")]
    CommandNotSupported,

    /// The request named a Tor hostname-resolution extension
    /// (`RESOLVE`/`RESOLVE_PTR`) but DNS-via-Tor is disabled, or the
    /// resolution itself is not implemented.
    #[error("hostname resolution over Tor is not available")]
    ResolutionNotAvailable,

    /// The proxy is already serving `max_connections` clients.
    #[error("connection limit reached")]
    TooManyConnections,
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Malformed(_) => ErrorKind::LocalProtocolViolation,
            Error::Io(_) => ErrorKind::LocalNetworkError,
            Error::NoAcceptableAuthMethod => ErrorKind::LocalProtocolViolation,
            Error::AuthFailed => ErrorKind::LocalProtocolViolation,
            Error::CommandNotSupported => ErrorKind::NotImplemented,
            Error::ResolutionNotAvailable => ErrorKind::NotImplemented,
            Error::TooManyConnections => ErrorKind::LocalResourceExhausted,
        }
    }
}

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
