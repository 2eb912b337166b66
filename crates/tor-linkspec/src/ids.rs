//! Code to abstract over the notion of relays having more than one kind of
//! identity.
//!
//! Every Tor relay has exactly two identities: a legacy identity that is
//! the SHA-1 hash of an RSA-1024 public key, and a modern identity that is
//! an Ed25519 public key.

use derive_more::{Display, From};
use tor_llcrypto::pk::{ed25519::Ed25519Identity, rsa::RsaIdentity};

/// The type of a relay identity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Display)]
#[non_exhaustive]
pub enum RelayIdType {
    /// An Ed25519 identity.
    #[display("Ed25519")]
    Ed25519,
    /// A legacy RSA identity.
    #[display("RSA (legacy)")]
    Rsa,
}

/// A single relay identity, with its type attached.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, From, Hash)]
#[non_exhaustive]
pub enum RelayId {
    /// An Ed25519 identity.
    Ed25519(Ed25519Identity),
    /// A legacy RSA identity.
    Rsa(RsaIdentity),
}

impl RelayId {
    /// Return the [`RelayIdType`] of this identity.
    pub fn id_type(&self) -> RelayIdType {
        match self {
            RelayId::Ed25519(_) => RelayIdType::Ed25519,
            RelayId::Rsa(_) => RelayIdType::Rsa,
        }
    }
}

/// The two identities every relay known to this client carries: its
/// (mandatory) Ed25519 identity and its (mandatory, legacy) RSA identity.
///
/// Unlike [`RelayId`], this does not model "a relay with zero or more
/// identities of arbitrary types" — every [`super::LinkSpec::RsaId`]/
/// [`super::LinkSpec::Ed25519Id`] pair used by this client-only
/// implementation to extend a circuit carries both, so it is convenient to
/// bundle them rather than carry a `Vec<RelayId>` everywhere.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct RelayIds {
    /// The relay's Ed25519 identity.
    pub ed_identity: Ed25519Identity,
    /// The relay's RSA identity fingerprint.
    pub rsa_identity: RsaIdentity,
}

impl RelayIds {
    /// Construct a new `RelayIds` from its two component identities.
    pub fn new(ed_identity: Ed25519Identity, rsa_identity: RsaIdentity) -> Self {
        RelayIds {
            ed_identity,
            rsa_identity,
        }
    }
}
