//! Choosing a guard, middle, and exit relay for a circuit.
//!
//! Grounded on the shape of `tor-guardmgr/src/sample.rs`'s guard
//! preference (confirmed guards first, then any sampled guard, then a
//! fresh one) and on SPEC_FULL.md §9's resolution that bandwidth-weighted
//! selection, relay-family exclusion, and circuit padding are out of
//! scope: this picks uniformly at random among relays that pass the
//! suitability checks, the way a reduced client-only path selector would.

use std::time::SystemTime;

use rand::seq::SliceRandom;
use rand::Rng;
use tor_linkspec::HasRelayIds;
use tor_netdir::{Consensus, Relay};

use crate::err::Error;
use crate::guard::GuardSet;

/// A chosen, ordered 3-hop path: guard, middle, exit.
#[derive(Clone, Debug)]
pub struct Path {
    /// The first hop.
    pub guard: Relay,
    /// The second hop.
    pub middle: Relay,
    /// The third (exit) hop.
    pub exit: Relay,
}

/// Pick this circuit's guard, preferring a remembered guard that is still
/// listed in `consensus` over sampling a fresh one.
///
/// Per SPEC_FULL.md §4.3: the guard set persists across restarts and is
/// capped at [`crate::guard::MAX_GUARDS`]; a confirmed (previously used
/// successfully) guard is preferred over an unconfirmed one.
pub fn select_guard(
    guards: &mut GuardSet,
    consensus: &Consensus,
    rng: &mut impl Rng,
    now: SystemTime,
) -> Result<Relay, Error> {
    guards.expire_old_guards(now);

    let listed = |fingerprint: &tor_llcrypto::pk::rsa::RsaIdentity| {
        consensus
            .relays()
            .iter()
            .find(|r| r.rsa_identity() == fingerprint)
            .filter(|r| r.is_suitable_as_guard())
    };

    if let Some(relay) = guards
        .live_guards(now)
        .filter(|g| g.confirmed)
        .find_map(|g| listed(&g.fingerprint))
    {
        return Ok(relay.clone());
    }
    if let Some(relay) = guards.live_guards(now).find_map(|g| listed(&g.fingerprint)) {
        return Ok(relay.clone());
    }

    let candidates: Vec<&Relay> = consensus
        .relays()
        .iter()
        .filter(|r| r.is_suitable_as_guard())
        .collect();
    let chosen = candidates.choose(rng).ok_or(Error::NoPath)?;
    guards.add_guard(*chosen, &chosen.nickname, now);
    Ok((*chosen).clone())
}

/// Pick a middle and an exit relay distinct from `guard` and from each
/// other, with the exit additionally required to permit `target_port`.
///
/// Per SPEC_FULL.md §3: guard, middle, and exit must all be distinct
/// relays.
pub fn select_middle_and_exit(
    consensus: &Consensus,
    guard: &Relay,
    target_port: u16,
    rng: &mut impl Rng,
) -> Result<(Relay, Relay), Error> {
    let port_permitting: Vec<&Relay> = consensus
        .relays()
        .iter()
        .filter(|r| r.is_suitable_as_exit(target_port) && !r.same_relay_ids(guard))
        .collect();

    // Per SPEC_FULL.md §4.5 step 2: if no Exit-flagged relay permits the
    // target port, fall back to any non-guard relay rather than failing
    // the whole path.
    let exit = if let Some(exit) = port_permitting.choose(rng) {
        *exit
    } else {
        tracing::warn!(
            target_port,
            "no exit relay permits this port; falling back to any non-guard relay"
        );
        let any_non_guard: Vec<&Relay> = consensus
            .relays()
            .iter()
            .filter(|r| r.is_usable() && !r.same_relay_ids(guard))
            .collect();
        *any_non_guard.choose(rng).ok_or(Error::NoPath)?
    };

    let middles: Vec<&Relay> = consensus
        .relays()
        .iter()
        .filter(|r| r.is_usable() && !r.same_relay_ids(guard) && !r.same_relay_ids(exit))
        .collect();
    let middle = middles.choose(rng).ok_or(Error::NoPath)?;

    Ok(((*middle).clone(), exit.clone()))
}

/// Build a complete 3-hop path for a stream that wants to reach
/// `target_port`.
pub fn select_path(
    guards: &mut GuardSet,
    consensus: &Consensus,
    target_port: u16,
    rng: &mut impl Rng,
    now: SystemTime,
) -> Result<Path, Error> {
    let guard = select_guard(guards, consensus, rng, now)?;
    let (middle, exit) = select_middle_and_exit(consensus, &guard, target_port, rng)?;
    Ok(Path { guard, middle, exit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tor_netdir::{ExitPolicy, RelayFlags};
    use tor_llcrypto::pk::curve25519::PublicKey as CurvePublicKey;
    use tor_llcrypto::pk::{ed25519::Ed25519Identity, rsa::RsaIdentity};

    fn relay(byte: u8, flags: RelayFlags) -> Relay {
        Relay {
            rsa_identity: RsaIdentity::from_bytes(&[byte; 20]).unwrap(),
            ed_identity: Ed25519Identity::new([byte; 32]),
            nickname: format!("relay{byte}"),
            or_port: SocketAddr::new("198.51.100.1".parse().unwrap(), 9000 + byte as u16),
            flags,
            bandwidth: 1000,
            exit_policy: if flags.contains(RelayFlags::EXIT) {
                ExitPolicy::accept_all()
            } else {
                ExitPolicy::default()
            },
            ntor_onion_key: CurvePublicKey::from([byte; 32]),
        }
    }

    fn sample_consensus() -> Consensus {
        let usable = RelayFlags::RUNNING | RelayFlags::VALID;
        let relays = vec![
            relay(1, usable | RelayFlags::GUARD | RelayFlags::STABLE),
            relay(2, usable),
            relay(3, usable | RelayFlags::EXIT),
        ];
        Consensus::from_relays_for_test(relays, SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn selects_three_distinct_hops() {
        let consensus = sample_consensus();
        let mut guards = GuardSet::new();
        let mut rng = rand::thread_rng();
        let path = select_path(&mut guards, &consensus, 443, &mut rng, SystemTime::UNIX_EPOCH)
            .unwrap();
        assert!(!path.guard.same_relay_ids(&path.middle));
        assert!(!path.guard.same_relay_ids(&path.exit));
        assert!(!path.middle.same_relay_ids(&path.exit));
        assert!(path.exit.flags.contains(RelayFlags::EXIT));
    }

    #[test]
    fn falls_back_to_any_non_guard_relay_when_no_exit_permits_the_port() {
        let usable = RelayFlags::RUNNING | RelayFlags::VALID;
        let mut restrictive_exit = relay(3, usable | RelayFlags::EXIT);
        restrictive_exit.exit_policy.push_accept(1, 79);
        let consensus = Consensus::from_relays_for_test(
            vec![
                relay(1, usable | RelayFlags::GUARD | RelayFlags::STABLE),
                relay(2, usable),
                restrictive_exit,
            ],
            SystemTime::UNIX_EPOCH,
        );
        let guard = consensus.relays()[0].clone();
        let mut rng = rand::thread_rng();

        // Port 443 is permitted by no exit policy in this consensus, so the
        // selector must fall back to any non-guard relay instead of failing.
        let (_middle, exit) =
            select_middle_and_exit(&consensus, &guard, 443, &mut rng).unwrap();
        assert!(!exit.same_relay_ids(&guard));
    }

    #[test]
    fn reuses_confirmed_guard_across_calls() {
        let consensus = sample_consensus();
        let mut guards = GuardSet::new();
        let mut rng = rand::thread_rng();
        let first = select_guard(&mut guards, &consensus, &mut rng, SystemTime::UNIX_EPOCH).unwrap();
        guards.mark_confirmed(first.rsa_identity(), SystemTime::UNIX_EPOCH);
        let second =
            select_guard(&mut guards, &consensus, &mut rng, SystemTime::UNIX_EPOCH).unwrap();
        assert!(first.same_relay_ids(&second));
    }
}
