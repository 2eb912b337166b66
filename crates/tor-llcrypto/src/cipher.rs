//! Ciphers used to implement the Tor protocol.
//!
//! Tor has never needed more than one cipher family: AES, always used in
//! counter mode, both for per-hop relay-cell encryption (AES-128-CTR) and for
//! the legacy TAP onion-skin KDF output stream (AES-128-CTR again). We only
//! need the 128-bit variant for `ntor`, but keep the 256-bit alias around
//! since some callers (directory caches, in the original protocol) use it.

/// Re-exports of counter-mode AES, as used by Tor.
///
/// These implement `cipher::StreamCipher`, so most callers will want to
/// `use cipher::StreamCipher` to get at `apply_keystream`.
pub mod aes {
    /// AES-128 in counter mode, as used for per-hop relay cell encryption.
    pub type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

    /// AES-256 in counter mode.
    pub type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
}
