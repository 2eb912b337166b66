//! A single relay as described by the directory: the long-lived, immutable
//! facts the consensus asserts about one fingerprint, per SPEC_FULL.md's
//! "Relay (directory entry)" data model.

use std::net::SocketAddr;

use bitflags::bitflags;
use tor_linkspec::{ChanTarget, CircTarget, HasRelayIds};
use tor_llcrypto::pk::curve25519::PublicKey as CurvePublicKey;
use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

bitflags! {
    /// The consensus flag set asserted about a relay on an `"s"` line.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RelayFlags: u16 {
        /// The relay is currently believed to be running.
        const RUNNING = 1 << 0;
        /// The relay's descriptor is valid and recommended.
        const VALID = 1 << 1;
        /// The relay is suitable for use as a guard.
        const GUARD = 1 << 2;
        /// The relay is suitable for use as an exit.
        const EXIT = 1 << 3;
        /// The relay's uptime is high enough to be "stable".
        const STABLE = 1 << 4;
        /// The relay is fast enough for general use.
        const FAST = 1 << 5;
    }
}

/// A simplified exit policy: an ordered list of accept/reject rules over
/// TCP port ranges, applied in order, with an implicit final "reject all".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExitPolicy {
    /// Rules in the order they should be checked.
    rules: Vec<PolicyRule>,
}

/// One rule of an [`ExitPolicy`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct PolicyRule {
    /// Whether this rule accepts or rejects.
    accept: bool,
    /// The inclusive port range this rule covers.
    ports: (u16, u16),
}

impl ExitPolicy {
    /// Build a policy that accepts every port (used for relays whose
    /// descriptor could not be parsed in detail but are flagged `Exit`).
    pub fn accept_all() -> Self {
        ExitPolicy {
            rules: vec![PolicyRule {
                accept: true,
                ports: (1, 65535),
            }],
        }
    }

    /// Add an `accept low-high` rule, checked before any rule added later.
    pub fn push_accept(&mut self, low: u16, high: u16) {
        self.rules.push(PolicyRule {
            accept: true,
            ports: (low, high),
        });
    }

    /// Add a `reject low-high` rule, checked before any rule added later.
    pub fn push_reject(&mut self, low: u16, high: u16) {
        self.rules.push(PolicyRule {
            accept: false,
            ports: (low, high),
        });
    }

    /// Return true if this policy permits exiting to `port`.
    pub fn allows_port(&self, port: u16) -> bool {
        for rule in &self.rules {
            if rule.ports.0 <= port && port <= rule.ports.1 {
                return rule.accept;
            }
        }
        false
    }
}

/// A relay, as asserted by the consensus: fingerprint, address, flags,
/// advertised bandwidth, and the keys needed to extend a circuit to it.
///
/// Created by consensus parsing and immutable thereafter; a new consensus
/// produces wholly new `Relay` values rather than mutating these in place.
#[derive(Clone, Debug)]
pub struct Relay {
    /// The relay's legacy RSA identity fingerprint.
    pub rsa_identity: RsaIdentity,
    /// The relay's Ed25519 identity.
    pub ed_identity: Ed25519Identity,
    /// The relay's human-readable (and unverified) nickname.
    pub nickname: String,
    /// The relay's OR port address.
    pub or_port: SocketAddr,
    /// The consensus flags asserted about this relay.
    pub flags: RelayFlags,
    /// The relay's self-reported or measured bandwidth weight, in the
    /// consensus's arbitrary bandwidth units.
    pub bandwidth: u32,
    /// The relay's exit policy for this client's use (summarized).
    pub exit_policy: ExitPolicy,
    /// The relay's `ntor` onion key, used as `KEYID` in `CREATE2`/`EXTEND2`.
    pub ntor_onion_key: CurvePublicKey,
}

impl Relay {
    /// Return true if this relay is usable at all: `Running` and `Valid`.
    pub fn is_usable(&self) -> bool {
        self.flags.contains(RelayFlags::RUNNING) && self.flags.contains(RelayFlags::VALID)
    }

    /// Return true if this relay may be used as a guard.
    pub fn is_suitable_as_guard(&self) -> bool {
        self.is_usable()
            && self.flags.contains(RelayFlags::GUARD)
            && self.flags.contains(RelayFlags::STABLE)
    }

    /// Return true if this relay may be used as an exit for `port`.
    pub fn is_suitable_as_exit(&self, port: u16) -> bool {
        self.is_usable()
            && self.flags.contains(RelayFlags::EXIT)
            && self.exit_policy.allows_port(port)
    }
}

impl HasRelayIds for Relay {
    fn ed_identity(&self) -> &Ed25519Identity {
        &self.ed_identity
    }
    fn rsa_identity(&self) -> &RsaIdentity {
        &self.rsa_identity
    }
}
impl ChanTarget for Relay {
    fn addr(&self) -> SocketAddr {
        self.or_port
    }
}
impl CircTarget for Relay {
    fn ntor_onion_key(&self) -> &CurvePublicKey {
        &self.ntor_onion_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_policy_checks_rules_in_order() {
        let mut policy = ExitPolicy::default();
        policy.push_reject(1, 1024);
        policy.push_accept(1, 65535);
        assert!(!policy.allows_port(80));
        assert!(policy.allows_port(8080));
    }

    #[test]
    fn empty_policy_rejects_everything() {
        let policy = ExitPolicy::default();
        assert!(!policy.allows_port(443));
    }
}
