//! Low-level cryptography wrappers used by the Tor client protocol stack.
//!
//! Tor's wire protocols depend on a small, fixed set of primitives: AES in
//! counter mode for per-hop onion encryption, SHA-1 and SHA-256/SHA3 digests
//! for running digests and KDFs, Curve25519 for the `ntor` handshake, and
//! Ed25519 for relay and consensus signatures. This crate re-exports (or
//! thinly wraps) implementations of each of those from the RustCrypto and
//! dalek-cryptography families, so that the rest of the workspace can depend
//! on one place for "the cryptography Tor uses" rather than scattering
//! version-pinned crates everywhere.
//!
//! Submodules:
//! - [`d`]: digests (SHA-1, SHA-256).
//! - [`cipher`]: AES-CTR type aliases.
//! - [`pk`]: public-key types (`curve25519`, `ed25519`, `rsa`).
//! - [`util::ct`]: constant-time comparison helpers.
//! - [`rng`]: CSPRNG access point.

#![warn(missing_docs)]

pub mod cipher;
pub mod d;
pub mod pk;
pub mod rng;
pub mod util;
