//! Circuit-level cryptography: the `ntor` handshake and per-hop onion-cell
//! encryption.

pub mod cellcrypto;
pub mod handshake;
