//! Digests used to implement the Tor protocol.
//!
//! Tor's link and relay-cell protocols use SHA-1 for running digests and
//! SHA-256 as the hash inside HKDF for the `ntor` handshake. Both are
//! re-exported here in forms that implement the [`digest::Digest`] trait, so
//! callers reach them through the `digest` crate's API rather than depending
//! directly on `sha1`/`sha2`.

pub use sha1::Sha1;
pub use sha2::Sha256;
