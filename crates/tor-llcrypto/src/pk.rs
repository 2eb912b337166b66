//! Public-key cryptography for Tor.
//!
//! Circuit extension uses Curve25519 (`ntor`); relay and consensus
//! signatures use Ed25519; legacy relay identities are a SHA-1 digest of an
//! RSA-1024 key, and we keep that as an opaque fingerprint type (`rsa`)
//! without implementing RSA itself, since this client only speaks to relays
//! that support the `ntor` handshake.

pub mod curve25519;
pub mod ed25519;
pub mod rsa;
