//! Declare an error type for tor-chanmgr.

use std::net::SocketAddr;

use safelog::Sensitive;
use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error returned by the channel manager.
///
/// `connect_with_retry` itself never gives up, so the only failure this
/// crate can report is a concurrent waiter losing its build.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// We were waiting on a channel another caller was building, but the
    /// task running that build was dropped before it could finish.
    #[error("pending link connection to {peer} failed to launch")]
    PendingFailed {
        /// The relay address whose build was abandoned.
        peer: Sensitive<SocketAddr>,
    },

    /// An internal error that should never happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::PendingFailed { .. } => ErrorKind::TorAccessFailed,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
