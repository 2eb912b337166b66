//! Curve25519 Diffie-Hellman, as used by the `ntor` circuit handshake.
//!
//! This is a thin wrapper over [`x25519_dalek`] that gives the rest of the
//! workspace stable, short type names (`PublicKey`, `EphemeralSecret`,
//! `SharedSecret`) independent of which underlying crate implements them.

use subtle::ConstantTimeEq;

/// A Curve25519 secret key that is used exactly once and cannot be
/// inspected after creation.
///
/// Used for the client's per-circuit ephemeral key `x` in the `ntor`
/// handshake: it must never be reused across circuits.
pub struct EphemeralSecret(x25519_dalek::EphemeralSecret);

impl EphemeralSecret {
    /// Generate a new ephemeral secret from a CSPRNG.
    pub fn random_from_rng<R: rand_core::RngCore + rand_core::CryptoRng>(csprng: R) -> Self {
        Self(x25519_dalek::EphemeralSecret::random_from_rng(csprng))
    }

    /// Perform Diffie-Hellman with `their_public`, consuming this secret.
    pub fn diffie_hellman(self, their_public: &PublicKey) -> SharedSecret {
        SharedSecret(self.0.diffie_hellman(&their_public.0))
    }
}

/// A Curve25519 secret key that may be used for more than one
/// Diffie-Hellman exchange.
///
/// Used for the client's ephemeral key in the `ntor` handshake: that
/// protocol runs the same scalar through two separate DH computations
/// (`EXP(Y,x)` and `EXP(B,x)`), which [`EphemeralSecret`] cannot do since
/// it consumes itself on use.
pub struct ReusableSecret(x25519_dalek::ReusableSecret);

impl ReusableSecret {
    /// Generate a new reusable secret from a CSPRNG.
    pub fn random_from_rng<R: rand_core::RngCore + rand_core::CryptoRng>(csprng: R) -> Self {
        Self(x25519_dalek::ReusableSecret::random_from_rng(csprng))
    }

    /// Perform Diffie-Hellman with `their_public`.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> SharedSecret {
        SharedSecret(self.0.diffie_hellman(&their_public.0))
    }
}

/// A Curve25519 public key.
#[derive(Clone, Copy, Debug, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl ConstantTimeEq for PublicKey {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.as_bytes().ct_eq(other.0.as_bytes())
    }
}
impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl PublicKey {
    /// View this key as a byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Copy this key out as a byte array.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(value: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(value))
    }
}

impl<'a> From<&'a EphemeralSecret> for PublicKey {
    fn from(secret: &'a EphemeralSecret) -> Self {
        Self((&secret.0).into())
    }
}

impl<'a> From<&'a ReusableSecret> for PublicKey {
    fn from(secret: &'a ReusableSecret) -> Self {
        Self((&secret.0).into())
    }
}

/// A shared secret produced by a Curve25519 Diffie-Hellman exchange.
///
/// This is *not* the final session key: `ntor` always runs the DH output
/// through HKDF before using it, since raw X25519 output is not uniformly
/// random.
pub struct SharedSecret(x25519_dalek::SharedSecret);

impl SharedSecret {
    /// View the raw DH output as a byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn dh_agreement() {
        let a = EphemeralSecret::random_from_rng(OsRng);
        let a_pub = PublicKey::from(&a);
        let b = EphemeralSecret::random_from_rng(OsRng);
        let b_pub = PublicKey::from(&b);

        let shared_a = a.diffie_hellman(&b_pub);
        let shared_b = b.diffie_hellman(&a_pub);
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
    }

    #[test]
    fn reusable_secret_agrees_with_two_peers() {
        let x = ReusableSecret::random_from_rng(OsRng);
        let x_pub = PublicKey::from(&x);
        let y = EphemeralSecret::random_from_rng(OsRng);
        let y_pub = PublicKey::from(&y);
        let b = EphemeralSecret::random_from_rng(OsRng);
        let b_pub = PublicKey::from(&b);

        let exp_yx = x.diffie_hellman(&y_pub);
        let exp_bx = x.diffie_hellman(&b_pub);
        assert_ne!(exp_yx.as_bytes(), exp_bx.as_bytes());
        assert_eq!(exp_yx.as_bytes(), y.diffie_hellman(&x_pub).as_bytes());
    }
}
