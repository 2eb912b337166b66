//! Declare an error type for tor-guardmgr.

use std::path::PathBuf;

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error arising from guard persistence or path selection.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// We could not read or write the guard state file.
    #[error("could not access guard state file {path}")]
    Io {
        /// The file we were trying to access.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The guard state file existed but could not be parsed as JSON.
    #[error("could not parse guard state file {path}")]
    Corrupted {
        /// The file we were trying to parse.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// There were not enough distinct, suitable relays in the directory to
    /// build a 3-hop circuit.
    #[error("not enough suitable relays to build a circuit")]
    NoPath,
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::PersistentStateAccessFailed,
            Error::Corrupted { .. } => ErrorKind::PersistentStateCorrupted,
            Error::NoPath => ErrorKind::NoPath,
        }
    }
}
