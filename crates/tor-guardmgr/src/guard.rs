//! A single persisted guard and the bounded set of guards this client
//! remembers across restarts, grounded on `tor-guardmgr/src/guard.rs`'s
//! `Guard` and `tor-guardmgr/src/sample.rs`'s `GuardSet` (greatly reduced:
//! no pluggable transports, no sample "confirmed order" bookkeeping beyond
//! a single timestamp, and a plain `Vec` in place of the teacher's
//! primary/sample split), with the on-disk shape matching SPEC_FULL.md §6's
//! `guard_state.json` schema (`fingerprint`/`nickname`/`address`/
//! `first_used`/`last_used`/`confirmed`) rather than the teacher's own.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tor_linkspec::ChanTarget;
use tor_llcrypto::pk::rsa::RsaIdentity;

/// The maximum number of guards this client remembers at once.
///
/// Per SPEC_FULL.md §4.5: `max_guards = 3`.
pub const MAX_GUARDS: usize = 3;

/// How long an unused guard may sit in the sample before it expires.
///
/// Per SPEC_FULL.md §4.5: a 90-day expiry, measured from `last_used`.
pub const GUARD_LIFETIME: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Serialize a [`RsaIdentity`] as lowercase hex, the canonical Tor
/// fingerprint form.
mod rsa_hex {
    use super::{Deserialize, RsaIdentity, Serialize};
    use serde::{Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(id: &RsaIdentity, ser: S) -> Result<S::Ok, S::Error> {
        hex::encode(id.as_bytes()).serialize(ser)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<RsaIdentity, D::Error> {
        let s = String::deserialize(de)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        RsaIdentity::from_bytes(&bytes)
            .ok_or_else(|| serde::de::Error::custom("wrong RSA identity length"))
    }
}

/// A single guard remembered across restarts.
///
/// Field names and shapes mirror SPEC_FULL.md §6's `guard_state.json`
/// schema one-to-one, with `added_at`/`SystemTime` replacing the spec's
/// RFC3339 strings (converted at the persistence boundary in `persist.rs`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Guard {
    /// The guard's RSA identity fingerprint, the key this client tracks it by.
    #[serde(with = "rsa_hex")]
    pub fingerprint: RsaIdentity,
    /// The guard's consensus nickname, for diagnostics only.
    pub nickname: String,
    /// The guard's OR port address, so a restart can dial it without
    /// re-querying the consensus first.
    pub address: SocketAddr,
    /// When this guard was first added to the sample.
    #[serde(with = "humantime_serde")]
    pub first_used: SystemTime,
    /// When we last selected or confirmed this guard.
    #[serde(with = "humantime_serde")]
    pub last_used: SystemTime,
    /// Whether we have ever completed a circuit through this guard. A
    /// confirmed guard is preferred over an unconfirmed one and is never
    /// evicted to make room for a new one.
    pub confirmed: bool,
}

impl Guard {
    /// Create a newly sampled, unconfirmed guard.
    pub fn new<T: ChanTarget + ?Sized>(target: &T, nickname: &str, now: SystemTime) -> Self {
        Guard {
            fingerprint: *target.rsa_identity(),
            nickname: nickname.to_owned(),
            address: target.addr(),
            first_used: now,
            last_used: now,
            confirmed: false,
        }
    }

    /// Record a successful circuit through this guard.
    pub fn mark_confirmed(&mut self, now: SystemTime) {
        self.confirmed = true;
        self.last_used = now;
    }

    /// Return true once this guard has gone unused for longer than
    /// [`GUARD_LIFETIME`].
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now.duration_since(self.last_used).unwrap_or_default() > GUARD_LIFETIME
    }
}

/// The bounded set of guards this client remembers, in preference order
/// (most preferred first).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GuardSet {
    /// The remembered guards, at most [`MAX_GUARDS`] of them.
    guards: Vec<Guard>,
    /// When this set was last written to disk.
    #[serde(with = "humantime_serde::option", default)]
    pub last_updated: Option<SystemTime>,
}

impl GuardSet {
    /// An empty guard set, as before any guard has ever been chosen.
    pub fn new() -> Self {
        GuardSet { guards: Vec::new(), last_updated: None }
    }

    /// The guards in this set, most preferred first.
    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    /// `GetGuards()`: the guards that have been used within
    /// [`GUARD_LIFETIME`] of `now`.
    pub fn live_guards(&self, now: SystemTime) -> impl Iterator<Item = &Guard> {
        self.guards.iter().filter(move |g| !g.is_expired(now))
    }

    /// `CleanupExpired()`: drop every guard that [`Guard::is_expired`] as of
    /// `now`.
    pub fn expire_old_guards(&mut self, now: SystemTime) {
        let before = self.guards.len();
        self.guards.retain(|g| !g.is_expired(now));
        let dropped = before - self.guards.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired old guards from sample");
        }
    }

    /// `AddGuard(relay)`: add `target` to the set if it is not already
    /// present. If the set is full, evicts the oldest unconfirmed entry to
    /// make room; if every entry is confirmed, refuses to add (the
    /// confirmed list never shrinks to admit a new guard). Returns true if
    /// the guard was added.
    pub fn add_guard<T: ChanTarget + ?Sized>(
        &mut self,
        target: &T,
        nickname: &str,
        now: SystemTime,
    ) -> bool {
        let fingerprint = *target.rsa_identity();
        if self.guards.iter().any(|g| g.fingerprint == fingerprint) {
            return false;
        }

        if self.guards.len() >= MAX_GUARDS {
            let oldest_unconfirmed = self
                .guards
                .iter()
                .enumerate()
                .filter(|(_, g)| !g.confirmed)
                .min_by_key(|(_, g)| g.first_used)
                .map(|(idx, _)| idx);
            match oldest_unconfirmed {
                Some(idx) => {
                    self.guards.remove(idx);
                }
                None => return false,
            }
        }

        self.guards.push(Guard::new(target, nickname, now));
        true
    }

    /// `ConfirmGuard(fpr)`: record a successful circuit extension through
    /// the guard identified by `fingerprint`, if we are tracking it.
    pub fn mark_confirmed(&mut self, fingerprint: &RsaIdentity, now: SystemTime) {
        if let Some(guard) = self.guards.iter_mut().find(|g| &g.fingerprint == fingerprint) {
            guard.mark_confirmed(now);
        }
    }

    /// Return true if this set already has room for another guard without
    /// evicting anything.
    pub fn has_room(&self) -> bool {
        self.guards.len() < MAX_GUARDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tor_llcrypto::pk::curve25519::PublicKey as CurvePublicKey;
    use tor_llcrypto::pk::{ed25519::Ed25519Identity, rsa::RsaIdentity};
    use tor_linkspec::HasRelayIds;

    struct FakeRelay {
        ed: Ed25519Identity,
        rsa: RsaIdentity,
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
            "127.0.0.1:9001".parse().unwrap()
        }
    }
    impl tor_linkspec::CircTarget for FakeRelay {
        fn ntor_onion_key(&self) -> &CurvePublicKey {
            unimplemented!("not needed for guard-set tests")
        }
    }

    fn relay(byte: u8) -> FakeRelay {
        FakeRelay {
            ed: Ed25519Identity::new([byte; 32]),
            rsa: RsaIdentity::from_bytes(&[byte; 20]).unwrap(),
        }
    }

    #[test]
    fn respects_max_guards_and_dedups() {
        let mut set = GuardSet::new();
        let now = SystemTime::UNIX_EPOCH;
        assert!(set.add_guard(&relay(1), "r1", now));
        assert!(set.add_guard(&relay(2), "r2", now));
        assert!(set.add_guard(&relay(3), "r3", now));
        assert!(!set.add_guard(&relay(1), "r1", now), "already present");
        assert_eq!(set.guards().len(), MAX_GUARDS);
    }

    #[test]
    fn full_set_evicts_oldest_unconfirmed_to_make_room() {
        let mut set = GuardSet::new();
        let now = SystemTime::UNIX_EPOCH;
        set.add_guard(&relay(1), "r1", now);
        set.add_guard(&relay(2), "r2", now + Duration::from_secs(1));
        set.add_guard(&relay(3), "r3", now + Duration::from_secs(2));

        assert!(set.add_guard(&relay(4), "r4", now + Duration::from_secs(3)));
        assert_eq!(set.guards().len(), MAX_GUARDS);
        assert!(
            !set.guards().iter().any(|g| g.fingerprint == relay(1).rsa),
            "the oldest unconfirmed entry should have been evicted"
        );
        assert!(set.guards().iter().any(|g| g.fingerprint == relay(4).rsa));
    }

    #[test]
    fn fully_confirmed_set_refuses_further_additions() {
        let mut set = GuardSet::new();
        let now = SystemTime::UNIX_EPOCH;
        for byte in 1..=3u8 {
            set.add_guard(&relay(byte), "r", now);
            set.mark_confirmed(&relay(byte).rsa, now);
        }
        assert!(
            !set.add_guard(&relay(9), "r9", now),
            "a fully confirmed set must not shrink to admit a new guard"
        );
        assert_eq!(set.guards().len(), MAX_GUARDS);
    }

    #[test]
    fn unconfirmed_guard_expires_after_90_days() {
        let mut set = GuardSet::new();
        let now = SystemTime::UNIX_EPOCH;
        set.add_guard(&relay(1), "r1", now);
        set.expire_old_guards(now + GUARD_LIFETIME - Duration::from_secs(1));
        assert_eq!(set.guards().len(), 1);
        set.expire_old_guards(now + GUARD_LIFETIME + Duration::from_secs(1));
        assert_eq!(set.guards().len(), 0);
    }

    #[test]
    fn confirmation_resets_the_expiry_clock() {
        let mut set = GuardSet::new();
        let now = SystemTime::UNIX_EPOCH;
        set.add_guard(&relay(1), "r1", now);
        let later = now + Duration::from_secs(60 * 24 * 60 * 60);
        set.mark_confirmed(&relay(1).rsa, later);
        set.expire_old_guards(later + Duration::from_secs(10));
        assert_eq!(set.guards().len(), 1, "confirmation should have reset expiry");
    }

    #[test]
    fn guard_round_trips_through_json() {
        let mut set = GuardSet::new();
        set.add_guard(&relay(7), "r7", SystemTime::UNIX_EPOCH);
        let json = serde_json::to_string(&set).unwrap();
        let back: GuardSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set.guards().len(), back.guards().len());
        assert_eq!(set.guards()[0].fingerprint, back.guards()[0].fingerprint);
    }
}
