//! Declare an error type for tor-circmgr.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error arising from building or pooling a circuit.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The guard manager or path selector could not assemble a 3-hop path.
    #[error("path selection failed")]
    PathSelection(#[from] tor_guardmgr::Error),

    /// Opening a link connection to the first hop failed.
    #[error("could not open a link connection for this circuit")]
    Channel(#[from] tor_chanmgr::Error),

    /// The CREATE2/EXTEND2 handshake, or some other circuit-level
    /// operation, failed.
    #[error("circuit build failed")]
    Proto(#[from] tor_proto::Error),

    /// A build did not complete within `circuit_build_timeout`.
    #[error("circuit build timed out")]
    BuildTimeout,

    /// The pool already holds `max_size` circuits and cannot build another
    /// to satisfy this request.
    #[error("circuit pool exhausted at its configured max_size")]
    PoolExhausted,

    /// An internal error that should never happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::PathSelection(e) => e.kind(),
            Error::Channel(e) => e.kind(),
            Error::Proto(e) => e.kind(),
            Error::BuildTimeout => ErrorKind::TorNetworkTimeout,
            Error::PoolExhausted => ErrorKind::LocalResourceExhausted,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
