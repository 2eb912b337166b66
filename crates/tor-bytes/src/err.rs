//! Internal: Declare an Error type for tor-bytes

use std::borrow::Cow;
use std::num::NonZeroUsize;

use derive_deftly::{define_derive_deftly, Deftly};
use safelog::Sensitive;
use thiserror::Error;
use tor_error::{into_internal, Bug};

define_derive_deftly! {
    /// `impl PartialEq for Error`
    PartialEqForError expect items:

    impl PartialEq for $ttype {
        fn eq(&self, other: &Self) -> bool {
            match (self, other) {
              $(
                ${when not(vmeta(never_eq))}
                (${vpat fprefix=a_}, ${vpat fprefix=b_}) => {
                  $(
                    if $<a_ $fname> != $<b_ $fname> { return false; }
                  )
                    return true;
                },
              )
                (_, _) => false,
            }
        }
    }
}

/// Error type for decoding Tor cells and certs from bytes.
#[derive(Error, Debug, Clone, Deftly)]
#[derive_deftly(PartialEqForError)]
#[non_exhaustive]
pub enum Error {
    /// Tried to read something, but ran out of bytes before finding it.
    ///
    /// This usually means the cell or message being parsed is shorter than
    /// its own length field claims.
    ///
    /// Do not construct this variant directly outside of tests; use
    /// [`Reader::incomplete_error`](crate::Reader::incomplete_error).
    #[error("object truncated, at least {deficit} more bytes needed")]
    Truncated {
        /// Lower bound on number of additional bytes needed.
        deficit: Sensitive<NonZeroUsize>,
    },
    /// Called [`Reader::should_be_exhausted`](crate::Reader::should_be_exhausted),
    /// but found bytes anyway.
    #[error("extra bytes at end of object")]
    ExtraneousBytes,
    /// A length field's value didn't fit into a `usize` (or into the
    /// caller-specified length-field width, when encoding).
    #[error("object length too large to represent")]
    BadLengthValue,
    /// An attempt to parse an object failed for some reason related to its
    /// contents, with no more specific variant applying.
    #[error("bad object: {0}")]
    InvalidMessage(Cow<'static, str>),
    /// A parsing error that should never happen.
    ///
    /// Used in lieu of `assert`/`expect`/`unwrap` from within parsing code.
    #[error("internal error")]
    #[deftly(never_eq)] // an internal error is equal to nothing, not even itself.
    Bug(#[from] tor_error::Bug),
}

impl Error {
    /// Make an [`Error::Truncated`] with a specified deficit, for use in tests.
    ///
    /// # Panics
    ///
    /// Panics if `deficit` is zero.
    pub fn new_truncated_for_test(deficit: usize) -> Self {
        let deficit = NonZeroUsize::new(deficit)
            .expect("zero deficit in new_truncated_for_test")
            .into();
        Error::Truncated { deficit }
    }
}

/// Error type for encoding Tor cells and certs to bytes.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum EncodeError {
    /// We tried to encode an object with an attached length, but the length
    /// was too large to encode in the available space.
    #[error("object length too large to encode")]
    BadLengthValue,
    /// An encoding error that should never happen.
    #[error("internal error")]
    Bug(#[from] Bug),
}

// This trait is used to convert any encoding error into a bug.
impl From<EncodeError> for Bug {
    fn from(error: EncodeError) -> Bug {
        match error {
            EncodeError::Bug(bug) => bug,
            EncodeError::BadLengthValue => into_internal!("EncodingError")(error),
        }
    }
}
