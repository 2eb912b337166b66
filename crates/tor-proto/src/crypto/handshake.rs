//! The `ntor` client handshake: the key exchange run against a relay's
//! identity and onion key to establish one circuit hop.
//!
//! Grounded on the teacher's `crypto/handshake.rs` `ClientHandshake` trait
//! shape (a `client1`/`client2` pair of steps), but written as a concrete
//! `ntor`-only implementation rather than a generic trait, since this
//! client never negotiates any other handshake type.

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tor_bytes::{SecretBuf, Writer};
use tor_llcrypto::pk::curve25519::{PublicKey, ReusableSecret};
use tor_llcrypto::pk::rsa::RsaIdentity;

use crate::err::{Error, Result};

/// The `ntor` protocol identifier tag, used to domain-separate every HKDF
/// label from any other handshake that reuses the same primitives.
const PROTOID: &[u8] = b"ntor-curve25519-sha256-1";

/// Number of bytes of key material `ntor` derives: `Df(20) | Db(20) |
/// Kf(16) | Kb(16)`.
const KEY_MATERIAL_LEN: usize = 20 + 20 + 16 + 16;

/// Key material derived from a completed `ntor` handshake, split into the
/// four per-direction secrets a circuit hop's onion-cell crypto needs.
pub struct NtorKeys {
    /// Forward (outbound) digest seed.
    pub df: [u8; 20],
    /// Backward (inbound) digest seed.
    pub db: [u8; 20],
    /// Forward (outbound) AES-128-CTR key.
    pub kf: [u8; 16],
    /// Backward (inbound) AES-128-CTR key.
    pub kb: [u8; 16],
}

/// The client side of one in-progress `ntor` handshake.
///
/// Holds the ephemeral keypair `(x, X)` between emitting the `CREATE2`/
/// `EXTEND2` payload and processing the matching reply; the secret must be
/// reusable because it is run through Diffie-Hellman twice (`EXP(Y,x)` and
/// `EXP(B,x)`), hence [`ReusableSecret`] rather than an ephemeral one.
pub struct NtorClientHandshake {
    /// The relay's 20-byte RSA identity fingerprint (`NODEID`).
    node_id: RsaIdentity,
    /// The relay's `ntor` onion key (`KEYID`/`B`).
    b: PublicKey,
    /// Our ephemeral secret scalar.
    x: ReusableSecret,
    /// Our ephemeral public point, sent to the relay as `X`.
    x_pub: PublicKey,
}

impl NtorClientHandshake {
    /// Begin a handshake against a relay with identity `node_id` and
    /// `ntor` onion key `b`.
    pub fn new<R: rand_core::RngCore + rand_core::CryptoRng>(
        node_id: RsaIdentity,
        b: PublicKey,
        rng: R,
    ) -> Self {
        let x = ReusableSecret::random_from_rng(rng);
        let x_pub = PublicKey::from(&x);
        NtorClientHandshake {
            node_id,
            b,
            x,
            x_pub,
        }
    }

    /// Build the 84-byte `NODEID | KEYID | X` payload to send as a
    /// `CREATE2`/`EXTEND2` handshake.
    pub fn client_handshake_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + 32 + 32);
        buf.write_all(self.node_id.as_bytes());
        buf.write_all(self.b.as_bytes());
        buf.write_all(self.x_pub.as_bytes());
        buf
    }

    /// Process a 64-byte `Y | AUTH` server reply, verifying the handshake
    /// and deriving session keys on success.
    pub fn finish(self, reply: &[u8]) -> Result<NtorKeys> {
        if reply.len() != 64 {
            return Err(Error::Protocol(format!(
                "ntor reply has wrong length: {} bytes",
                reply.len()
            )));
        }
        let mut y_bytes = [0u8; 32];
        y_bytes.copy_from_slice(&reply[..32]);
        let y = PublicKey::from(y_bytes);
        let auth = &reply[32..64];

        let exp_yx = self.x.diffie_hellman(&y);
        let exp_bx = self.x.diffie_hellman(&self.b);

        let mut secret_input = SecretBuf::new();
        secret_input.write_all(exp_yx.as_bytes());
        secret_input.write_all(exp_bx.as_bytes());
        secret_input.write_all(self.node_id.as_bytes());
        secret_input.write_all(self.b.as_bytes());
        secret_input.write_all(self.x_pub.as_bytes());
        secret_input.write_all(y.as_bytes());
        secret_input.write_all(PROTOID);

        let hkdf = Hkdf::<Sha256>::new(None, &secret_input);

        let mut expected_auth = [0u8; 32];
        hkdf.expand(b"ntor-curve25519-sha256-1:verify", &mut expected_auth)
            .map_err(|_| Error::Internal("ntor verify HKDF output too long".into()))?;
        if expected_auth[..].ct_eq(auth).unwrap_u8() != 1 {
            return Err(Error::BadHandshakeAuth);
        }

        let mut key_material = [0u8; KEY_MATERIAL_LEN];
        hkdf.expand(b"ntor-curve25519-sha256-1:key_extract", &mut key_material)
            .map_err(|_| Error::Internal("ntor key HKDF output too long".into()))?;

        let mut df = [0u8; 20];
        let mut db = [0u8; 20];
        let mut kf = [0u8; 16];
        let mut kb = [0u8; 16];
        df.copy_from_slice(&key_material[0..20]);
        db.copy_from_slice(&key_material[20..40]);
        kf.copy_from_slice(&key_material[40..56]);
        kb.copy_from_slice(&key_material[56..72]);

        Ok(NtorKeys { df, db, kf, kb })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::rngs::OsRng;
    use tor_llcrypto::pk::curve25519::EphemeralSecret;

    /// Run the server side of `ntor` by hand, the way a relay would, so the
    /// client implementation can be exercised without a real relay.
    fn server_reply(node_id: RsaIdentity, b_secret: &EphemeralSecretCopy, x_pub: &PublicKey) -> ([u8; 32], Vec<u8>) {
        let y_secret = EphemeralSecret::random_from_rng(OsRng);
        let y_pub = PublicKey::from(&y_secret);
        let exp_yx = y_secret.diffie_hellman(x_pub);
        let exp_bx = b_secret.0.diffie_hellman(x_pub);

        let mut secret_input = SecretBuf::new();
        secret_input.write_all(exp_yx.as_bytes());
        secret_input.write_all(exp_bx.as_bytes());
        secret_input.write_all(node_id.as_bytes());
        secret_input.write_all(b_secret.1.as_bytes());
        secret_input.write_all(x_pub.as_bytes());
        secret_input.write_all(y_pub.as_bytes());
        secret_input.write_all(PROTOID);

        let hkdf = Hkdf::<Sha256>::new(None, &secret_input);
        let mut auth = [0u8; 32];
        hkdf.expand(b"ntor-curve25519-sha256-1:verify", &mut auth)
            .unwrap();
        (*y_pub.as_bytes(), auth.to_vec())
    }

    /// A reusable stand-in for the relay's long-term onion key, since our
    /// own [`EphemeralSecret`] cannot be reused for the two DH computations
    /// a test server also needs to perform.
    struct EphemeralSecretCopy(tor_llcrypto::pk::curve25519::ReusableSecret, PublicKey);

    #[test]
    fn handshake_round_trip() {
        let node_id = RsaIdentity::from_bytes(&[7u8; 20]).unwrap();
        let b_secret = ReusableSecret::random_from_rng(OsRng);
        let b_pub = PublicKey::from(&b_secret);
        let server_b = EphemeralSecretCopy(b_secret, b_pub);

        let client = NtorClientHandshake::new(node_id, b_pub, OsRng);
        let create2 = client.client_handshake_bytes();
        assert_eq!(create2.len(), 84);
        let x_pub_bytes: [u8; 32] = create2[52..84].try_into().unwrap();
        let x_pub = PublicKey::from(x_pub_bytes);

        let (y_bytes, auth) = server_reply(node_id, &server_b, &x_pub);
        let mut reply = Vec::with_capacity(64);
        reply.extend_from_slice(&y_bytes);
        reply.extend_from_slice(&auth);

        let keys = client.finish(&reply).unwrap();
        assert_ne!(keys.kf, keys.kb);
    }

    #[test]
    fn bad_auth_is_rejected() {
        let node_id = RsaIdentity::from_bytes(&[1u8; 20]).unwrap();
        let b_secret = ReusableSecret::random_from_rng(OsRng);
        let b_pub = PublicKey::from(&b_secret);

        let client = NtorClientHandshake::new(node_id, b_pub, OsRng);
        let mut reply = vec![0u8; 64];
        reply[40] = 0xFF;
        assert!(matches!(client.finish(&reply), Err(Error::BadHandshakeAuth)));
    }

    #[test]
    fn wrong_length_reply_is_rejected() {
        let node_id = RsaIdentity::from_bytes(&[2u8; 20]).unwrap();
        let b_secret = ReusableSecret::random_from_rng(OsRng);
        let b_pub = PublicKey::from(&b_secret);
        let client = NtorClientHandshake::new(node_id, b_pub, OsRng);
        assert!(client.finish(&[0u8; 10]).is_err());
    }
}
