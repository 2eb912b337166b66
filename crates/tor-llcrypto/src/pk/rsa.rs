//! Legacy RSA relay identities, and the RSA-OAEP-SHA1 padding scheme the
//! (unimplemented) TAP onion-skin handshake would use it for.
//!
//! Tor relay identities have historically been the SHA-1 digest of an
//! RSA-1024 public key, and that 20-byte fingerprint is still what appears
//! as `NODEID` in the `ntor` handshake and as a relay's primary fingerprint
//! in consensus documents, even for relays that no longer use RSA for
//! anything else. This client's circuit engine only ever builds `ntor`
//! circuits (the TAP handshake that would drive an actual encrypt/decrypt
//! call is out of scope, see the system's Non-goals), so [`PublicKey`] and
//! [`PrivateKey`] below are exposed as primitives per SPEC_FULL.md §4.2 but
//! have no caller anywhere in this workspace.

use std::fmt;

use rand::rngs::OsRng;
use rsa::Oaep;
use sha1::{Digest, Sha1};

/// The length in bytes of an RSA relay identity fingerprint.
pub const RSA_ID_LEN: usize = 20;

/// A 20-byte RSA relay identity fingerprint (`NODEID`).
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct RsaIdentity([u8; RSA_ID_LEN]);

impl RsaIdentity {
    /// Construct an identity from exactly [`RSA_ID_LEN`] bytes.
    ///
    /// Returns `None` if `bytes` has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; RSA_ID_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// View the identity as a byte array.
    pub fn as_bytes(&self) -> &[u8; RSA_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Display for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error performing an RSA-OAEP-SHA1 operation.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RsaError {
    /// The DER bytes didn't decode to a valid RSA key.
    #[error("invalid RSA key encoding")]
    BadKey,
    /// Encryption failed (the message was too long for this key's modulus).
    #[error("RSA-OAEP encryption failed")]
    Encrypt,
    /// Decryption failed (the ciphertext didn't decrypt to a validly padded
    /// message under this key).
    #[error("RSA-OAEP decryption failed")]
    Decrypt,
}

/// An RSA public key, used only for the legacy RSA-OAEP-SHA1 padding scheme
/// (the TAP onion-skin handshake's "create cell" encryption).
#[derive(Clone)]
pub struct PublicKey(rsa::RsaPublicKey);

impl PublicKey {
    /// Parse a public key from its DER (PKCS#1) encoding.
    pub fn from_der(der: &[u8]) -> Result<Self, RsaError> {
        use rsa::pkcs1::DecodeRsaPublicKey;
        rsa::RsaPublicKey::from_pkcs1_der(der)
            .map(PublicKey)
            .map_err(|_| RsaError::BadKey)
    }

    /// Encrypt `msg` with RSA-OAEP using SHA-1 as both the hash and MGF1
    /// digest, the padding TAP's "create cell" uses.
    pub fn encrypt_oaep_sha1(&self, msg: &[u8]) -> Result<Vec<u8>, RsaError> {
        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), msg)
            .map_err(|_| RsaError::Encrypt)
    }
}

/// An RSA private key, used only for the legacy RSA-OAEP-SHA1 padding scheme.
pub struct PrivateKey(rsa::RsaPrivateKey);

impl PrivateKey {
    /// Parse a private key from its DER (PKCS#1) encoding.
    pub fn from_der(der: &[u8]) -> Result<Self, RsaError> {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        rsa::RsaPrivateKey::from_pkcs1_der(der)
            .map(PrivateKey)
            .map_err(|_| RsaError::BadKey)
    }

    /// Decrypt a message encrypted with [`PublicKey::encrypt_oaep_sha1`].
    pub fn decrypt_oaep_sha1(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RsaError> {
        self.0
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map_err(|_| RsaError::Decrypt)
    }

    /// Derive this key's public half.
    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }
}

/// KDF-TOR, the legacy key derivation function from tor-spec.txt §5.2.1:
/// `K = K_1 | K_2 | K_3 | ...` where `K_1 = SHA1(secret)` and
/// `K_(i+1) = SHA1(secret | K_i)`... except Tor's actual construction
/// indexes by an appended counter byte rather than feeding back prior
/// output: `K_i = SHA1(secret | [i])` for `i = 0, 1, 2, ...`, concatenated
/// and truncated to `key_len` bytes.
///
/// Used only where the legacy (TAP) protocol demands it; the `ntor`
/// handshake this client actually uses derives keys with `tor-hkdf` instead.
pub fn kdf_tor(secret: &[u8], key_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(key_len + Sha1::output_size());
    let mut i: u8 = 0;
    while out.len() < key_len {
        let mut hasher = Sha1::new();
        hasher.update(secret);
        hasher.update([i]);
        out.extend_from_slice(&hasher.finalize());
        i = i.checked_add(1).expect("key_len unreasonably large for KDF-TOR");
    }
    out.truncate(key_len);
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn roundtrip() {
        let bytes = [0x11_u8; RSA_ID_LEN];
        let id = RsaIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(id.as_bytes(), &bytes);
        assert!(RsaIdentity::from_bytes(&[0; 19]).is_none());
    }

    #[test]
    fn debug_format() {
        let id = RsaIdentity::from_bytes(&[0xAB; RSA_ID_LEN]).unwrap();
        assert_eq!(format!("{id:?}"), format!("${}", "AB".repeat(RSA_ID_LEN)));
    }

    #[test]
    fn oaep_roundtrip() {
        let mut rng = rand::thread_rng();
        let private = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let private = PrivateKey(private);
        let public = private.to_public_key();

        let msg = b"the short onion-skin payload TAP would encrypt";
        let ciphertext = public.encrypt_oaep_sha1(msg).unwrap();
        let decrypted = private.decrypt_oaep_sha1(&ciphertext).unwrap();
        assert_eq!(decrypted, msg);
    }

    #[test]
    fn kdf_tor_produces_requested_length_and_is_deterministic() {
        let secret = b"shared ntor-style secret material";
        let k1 = kdf_tor(secret, 70);
        let k2 = kdf_tor(secret, 70);
        assert_eq!(k1.len(), 70);
        assert_eq!(k1, k2);

        // The first 20 bytes of a longer derivation must equal a shorter
        // derivation's only block: K_0 = SHA1(secret) doesn't depend on
        // key_len.
        let short = kdf_tor(secret, 20);
        assert_eq!(&k1[..20], &short[..]);
    }

    #[test]
    fn kdf_tor_differs_by_secret() {
        assert_ne!(kdf_tor(b"secret-a", 40), kdf_tor(b"secret-b", 40));
    }
}
