//! Ed25519 signatures, as used for relay and consensus document signing.
//!
//! This client only ever *verifies* Ed25519 signatures (on router
//! descriptors and, indirectly, via the consensus); it never signs with one.

use std::fmt;

/// An Ed25519 public key.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&hex_fingerprint(self.0.as_bytes()))
            .finish()
    }
}

impl PublicKey {
    /// Parse a 32-byte Ed25519 public key.
    ///
    /// Fails if the bytes do not decode to a valid compressed Edwards point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Ed25519Error> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| Ed25519Error::BadLength)?;
        ed25519_dalek::VerifyingKey::from_bytes(&arr)
            .map(Self)
            .map_err(|_| Ed25519Error::BadKey)
    }

    /// View this key as a byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Verify `signature` over `message` under this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;
        self.0.verify(message, &signature.0).is_ok()
    }
}

/// An Ed25519 signature.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// Parse a raw 64-byte signature.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    /// Return the raw signature bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl From<[u8; 64]> for Signature {
    fn from(value: [u8; 64]) -> Self {
        Self::from_bytes(&value)
    }
}

/// A relay's long-term Ed25519 identity, as carried in router descriptors
/// and `EXTEND2` link specifiers.
///
/// Kept distinct from [`PublicKey`] because a relay's Ed25519 identity may
/// be referenced (e.g. in a consensus digest) before its full public key has
/// been fetched and validated.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Ed25519Identity([u8; 32]);

impl Ed25519Identity {
    /// Wrap a raw 32-byte identity.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// View the identity as a byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ed25519Identity")
            .field(&hex_fingerprint(&self.0))
            .finish()
    }
}

impl fmt::Display for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Render a byte array as a short hex string for debug output, without
/// pulling in a hex-formatting dependency just for this.
fn hex_fingerprint(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// An error parsing or checking an Ed25519 key or signature.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Ed25519Error {
    /// The input was not 32 bytes long.
    #[error("Ed25519 public key must be 32 bytes")]
    BadLength,
    /// The bytes did not decode to a valid point.
    #[error("invalid Ed25519 public key")]
    BadKey,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use ed25519_dalek::Signer;

    #[test]
    fn sign_and_verify() {
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        let verifying_key = PublicKey(signing_key.verifying_key());

        let msg = b"circuit extension request";
        let sig = Signature(signing_key.sign(msg));
        assert!(verifying_key.verify(msg, &sig));
        assert!(!verifying_key.verify(b"different message", &sig));
    }
}
