//! Declare an error type for orchestration.
//!
//! Grounded on the teacher's `arti-client/src/err.rs` split between a
//! `HintableError` that tells a human-facing caller roughly what to do
//! and the error itself; the teacher's `detail()`-behind-a-feature
//! boxing is dropped since no downstream here needs the extra semver
//! firewall.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

use crate::address::TorAddrError;

/// An error raised by client orchestration: configuration, bootstrap, or
/// a single `connect` attempt.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The supplied [`crate::TorClientConfig`] failed validation.
    #[error("invalid configuration")]
    Config(#[from] crate::config::ConfigBuildError),

    /// Reading or writing persistent state (currently: the guard file)
    /// failed.
    #[error("persistent state error")]
    Guard(#[from] tor_guardmgr::Error),

    /// No usable directory information could be fetched or parsed.
    #[error("directory error")]
    Directory(#[from] tor_netdir::Error),

    /// The circuit pool could not produce a circuit for this request.
    #[error("circuit error")]
    Circuit(#[from] tor_circmgr::Error),

    /// Opening or using a stream on an otherwise-healthy circuit failed.
    #[error("stream error")]
    Stream(#[from] tor_proto::Error),

    /// A SOCKS5 negotiation failed.
    #[error("SOCKS5 error")]
    Socks(#[from] tor_socksproto::Error),

    /// The target address was invalid.
    #[error("invalid address")]
    Address(#[from] TorAddrError),

    /// Local I/O (binding a listener, reading the data directory) failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A hidden-service address was given, but this client has no
    /// hidden-service client support built in.
    #[error("onion service addresses are not supported by this client")]
    OnionServiceNotSupported,

    /// A caller tried to use the client (e.g. `connect`) before
    /// [`crate::TorClient::bootstrap`] completed.
    #[error("client is not bootstrapped yet")]
    NotBootstrapped,

    /// Every bootstrap attempt failed; see the wrapped
    /// [`retry_error::RetryError`] for each attempt's error.
    #[error(transparent)]
    Bootstrap(#[from] retry_error::RetryError<BootstrapAttemptError>),
}

/// One bootstrap attempt's failure: either the directory fetch or the
/// circuit build that followed it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BootstrapAttemptError {
    /// The consensus fetch/refresh failed.
    #[error("directory error")]
    Directory(#[from] tor_netdir::Error),
    /// Building the circuit used to confirm readiness failed.
    #[error("circuit error")]
    Circuit(#[from] tor_circmgr::Error),
}

impl AsRef<dyn std::error::Error + 'static> for BootstrapAttemptError {
    fn as_ref(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(e) => e.kind(),
            Error::Guard(e) => e.kind(),
            Error::Directory(e) => e.kind(),
            Error::Circuit(e) => e.kind(),
            Error::Stream(e) => e.kind(),
            Error::Socks(e) => e.kind(),
            Error::Address(_) => ErrorKind::InvalidStreamTarget,
            Error::Io(_) => ErrorKind::LocalNetworkError,
            Error::OnionServiceNotSupported => ErrorKind::NotImplemented,
            Error::NotBootstrapped => ErrorKind::BootstrapRequired,
            Error::Bootstrap(_) => ErrorKind::TorDirectoryError,
        }
    }
}

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A coarse hint about how a caller-facing application should react to an
/// [`Error`], beyond what [`HasKind`] already reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorHint {
    /// Retrying later, with no change to configuration, may succeed.
    RetryLater,
    /// The configuration itself needs to change before retrying.
    FixConfiguration,
    /// The request itself cannot succeed; do not retry unchanged.
    GiveUp,
}

/// Give a rough hint about how to react to an error, beyond its
/// [`ErrorKind`](tor_error::ErrorKind).
pub trait HintableError {
    /// Return a hint for how a caller-facing application should react.
    fn hint(&self) -> ErrorHint;
}

impl HintableError for Error {
    fn hint(&self) -> ErrorHint {
        match self {
            Error::Config(_) => ErrorHint::FixConfiguration,
            Error::Address(_) | Error::OnionServiceNotSupported => ErrorHint::GiveUp,
            Error::NotBootstrapped | Error::Bootstrap(_) => ErrorHint::RetryLater,
            Error::Guard(_) | Error::Directory(_) | Error::Circuit(_) | Error::Stream(_) | Error::Io(_) => {
                ErrorHint::RetryLater
            }
            Error::Socks(_) => ErrorHint::GiveUp,
        }
    }
}
