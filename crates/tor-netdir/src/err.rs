//! Declare an error type for tor-netdir.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error returned by the network directory code.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The consensus document as a whole could not be parsed at all.
    ///
    /// Per SPEC_FULL.md §4.4, a whole-document parse error means the
    /// caller should keep using its previous snapshot, not discard it.
    #[error("could not parse consensus document: {0}")]
    BadDocument(String),

    /// We don't have any usable directory information yet.
    #[error("no directory information available")]
    NoConsensus,

    /// Every directory fetch attempt against our fallback authorities
    /// failed.
    #[error("could not fetch a consensus from any directory source")]
    DirFetchFailed,

    /// The consensus we hold is stale.
    #[error("network directory is more than the allowed staleness window old")]
    DirectoryStale,
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::BadDocument(_) => ErrorKind::TorDirectoryError,
            Error::NoConsensus => ErrorKind::TorDirectoryUnusable,
            Error::DirFetchFailed => ErrorKind::TorDirectoryError,
            Error::DirectoryStale => ErrorKind::DirectoryExpired,
        }
    }
}
