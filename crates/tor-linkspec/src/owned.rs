//! Self-contained (non-borrowed) descriptions of a relay's address and
//! identities, for when a target must outlive the directory snapshot it
//! was drawn from (e.g. a path handed off to the circuit engine after the
//! consensus that produced it may have been replaced).

use std::net::SocketAddr;

use tor_llcrypto::pk::curve25519::PublicKey as CurvePublicKey;
use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

use crate::{ChanTarget, CircTarget, HasRelayIds};

/// An owned copy of everything needed to open a link connection to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedChanTarget {
    /// The relay's OR port address.
    addr: SocketAddr,
    /// The relay's Ed25519 identity.
    ed_identity: Ed25519Identity,
    /// The relay's RSA identity fingerprint.
    rsa_identity: RsaIdentity,
}

impl OwnedChanTarget {
    /// Construct an `OwnedChanTarget` from its component fields.
    pub fn new(addr: SocketAddr, ed_identity: Ed25519Identity, rsa_identity: RsaIdentity) -> Self {
        OwnedChanTarget {
            addr,
            ed_identity,
            rsa_identity,
        }
    }

    /// Copy the fields of any `ChanTarget` into a new `OwnedChanTarget`.
    pub fn from_chan_target<T: ChanTarget + ?Sized>(target: &T) -> Self {
        OwnedChanTarget {
            addr: target.addr(),
            ed_identity: *target.ed_identity(),
            rsa_identity: *target.rsa_identity(),
        }
    }
}

impl HasRelayIds for OwnedChanTarget {
    fn ed_identity(&self) -> &Ed25519Identity {
        &self.ed_identity
    }
    fn rsa_identity(&self) -> &RsaIdentity {
        &self.rsa_identity
    }
}
impl ChanTarget for OwnedChanTarget {
    fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// An owned copy of everything needed to extend a circuit to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedCircTarget {
    /// The chan-target fields (address and identities).
    chan_target: OwnedChanTarget,
    /// The relay's `ntor` onion key.
    ntor_onion_key: CurvePublicKey,
}

impl OwnedCircTarget {
    /// Construct an `OwnedCircTarget` from its component fields.
    pub fn new(chan_target: OwnedChanTarget, ntor_onion_key: CurvePublicKey) -> Self {
        OwnedCircTarget {
            chan_target,
            ntor_onion_key,
        }
    }

    /// Copy the fields of any `CircTarget` into a new `OwnedCircTarget`.
    pub fn from_circ_target<T: CircTarget + ?Sized>(target: &T) -> Self {
        OwnedCircTarget {
            chan_target: OwnedChanTarget::from_chan_target(target),
            ntor_onion_key: *target.ntor_onion_key(),
        }
    }
}

impl HasRelayIds for OwnedCircTarget {
    fn ed_identity(&self) -> &Ed25519Identity {
        self.chan_target.ed_identity()
    }
    fn rsa_identity(&self) -> &RsaIdentity {
        self.chan_target.rsa_identity()
    }
}
impl ChanTarget for OwnedCircTarget {
    fn addr(&self) -> SocketAddr {
        self.chan_target.addr()
    }
}
impl CircTarget for OwnedCircTarget {
    fn ntor_onion_key(&self) -> &CurvePublicKey {
        &self.ntor_onion_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tor_llcrypto::pk::curve25519::EphemeralSecret;

    #[test]
    fn owned_circ_target_round_trips_fields() {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let onion_key = CurvePublicKey::from(&secret);
        let chan = OwnedChanTarget::new(
            "203.0.113.5:443".parse().unwrap(),
            Ed25519Identity::new([1u8; 32]),
            RsaIdentity::from_bytes(&[2u8; 20]).unwrap(),
        );
        let circ = OwnedCircTarget::new(chan.clone(), onion_key);
        assert_eq!(circ.addr(), chan.addr());
        assert!(circ.same_relay_ids(&chan));
    }
}
