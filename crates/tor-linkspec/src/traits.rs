//! Traits implemented by anything that describes a relay this client can
//! connect to, directly or through a circuit extension.

use std::net::SocketAddr;

use tor_llcrypto::pk::{ed25519::Ed25519Identity, rsa::RsaIdentity};

use crate::LinkSpec;

/// An object that carries a relay's two identity keys.
///
/// Every relay known to the directory client (§4.4) has both; a
/// `HasRelayIds` implementation is how the path selector (§4.5) and circuit
/// engine (§4.6) compare "is this the same relay" without caring whether
/// they are holding a full directory entry or just an extracted pair of
/// identities.
pub trait HasRelayIds {
    /// Return this relay's Ed25519 identity.
    fn ed_identity(&self) -> &Ed25519Identity;
    /// Return this relay's RSA identity fingerprint.
    fn rsa_identity(&self) -> &RsaIdentity;

    /// Return true if `self` and `other` name the same relay.
    fn same_relay_ids<T: HasRelayIds + ?Sized>(&self, other: &T) -> bool {
        self.ed_identity() == other.ed_identity() && self.rsa_identity() == other.rsa_identity()
    }
}

/// An object that can be connected to directly: something with a TCP
/// address and relay identities, i.e. a candidate guard (§4.3's link
/// connection target).
pub trait ChanTarget: HasRelayIds {
    /// Return the relay's OR port address.
    fn addr(&self) -> SocketAddr;
}

/// An object that can be extended *to* over an existing circuit, i.e. a
/// candidate middle or exit hop (§4.6's `EXTEND2` target).
pub trait CircTarget: ChanTarget {
    /// Return the link specifiers to include in an `EXTEND2` cell
    /// addressed to this relay, in the conventional wire order.
    fn link_specifiers(&self) -> Vec<LinkSpec> {
        let mut v = vec![
            LinkSpec::from(self.addr()),
            LinkSpec::from(*self.rsa_identity()),
            LinkSpec::from(*self.ed_identity()),
        ];
        LinkSpec::sort_by_type(&mut v);
        v
    }

    /// Return the relay's `ntor` onion key, used as `KEYID` in the
    /// `CREATE2`/`EXTEND2` handshake payload (§4.2).
    fn ntor_onion_key(&self) -> &tor_llcrypto::pk::curve25519::PublicKey;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tor_llcrypto::pk::curve25519::{EphemeralSecret, PublicKey};

    struct FakeRelay {
        addr: SocketAddr,
        ed: Ed25519Identity,
        rsa: RsaIdentity,
        onion_key: PublicKey,
    }

    impl HasRelayIds for FakeRelay {
        fn ed_identity(&self) -> &Ed25519Identity {
            &self.ed
        }
        fn rsa_identity(&self) -> &RsaIdentity {
            &self.rsa
        }
    }
    impl ChanTarget for FakeRelay {
        fn addr(&self) -> SocketAddr {
            self.addr
        }
    }
    impl CircTarget for FakeRelay {
        fn ntor_onion_key(&self) -> &PublicKey {
            &self.onion_key
        }
    }

    #[test]
    fn link_specifiers_cover_address_and_both_identities() {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let relay = FakeRelay {
            addr: "198.51.100.9:9001".parse().unwrap(),
            ed: Ed25519Identity::new([3u8; 32]),
            rsa: RsaIdentity::from_bytes(&[4u8; 20]).unwrap(),
            onion_key: PublicKey::from(&secret),
        };
        let specs = relay.link_specifiers();
        assert_eq!(specs.len(), 3);
        assert!(specs.contains(&LinkSpec::Ed25519Id(relay.ed)));
        assert!(specs.contains(&LinkSpec::RsaId(relay.rsa)));
    }
}
