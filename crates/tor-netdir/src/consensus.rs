//! Parsing and storage of network consensus documents.
//!
//! Real Tor splits this information across a consensus document (which
//! carries `"r"`/`"s"`/`"w"` lines) and per-relay microdescriptors (which
//! carry `"id"` and `"ntor-onion-key"` lines); see
//! `tor-netdoc/src/doc/netstatus.rs` and `routerdesc.rs` in the teacher
//! crate for the real keyword set. This reduced parser accepts a single
//! merged per-relay block carrying all of those lines together, since
//! SPEC_FULL.md's directory module does not separately model
//! microdescriptor fetch and matching.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use base64ct::{Base64Unpadded, Encoding};

use tor_llcrypto::pk::curve25519::PublicKey as CurvePublicKey;
use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

use crate::err::Error;
use crate::relay::{ExitPolicy, Relay, RelayFlags};

/// How long a consensus may go unreplaced before it is considered stale.
///
/// Per SPEC_FULL.md §4.4: ">3h staleness = unhealthy".
pub const MAX_CONSENSUS_AGE: Duration = Duration::from_secs(3 * 60 * 60);

/// A parsed consensus document: every relay the directory authorities
/// agreed was `Running` and `Valid` at `valid_after`.
#[derive(Clone, Debug)]
pub struct Consensus {
    /// When this consensus became valid.
    valid_after: SystemTime,
    /// The relays it lists, already filtered to `Running && Valid`.
    relays: Vec<Relay>,
}

impl Consensus {
    /// Build a consensus directly from a relay list, bypassing parsing.
    ///
    /// For use by other crates' tests (e.g. `tor-guardmgr`'s path-selector
    /// tests), mirroring the teacher's `tor-netdir/src/testnet.rs` helpers
    /// that let downstream crates build a `NetDir` without a real document.
    /// Gated behind the `testing` feature the same way the teacher gates
    /// `testnet`.
    #[cfg(any(test, feature = "testing"))]
    pub fn from_relays_for_test(relays: Vec<Relay>, valid_after: SystemTime) -> Self {
        Consensus {
            valid_after,
            relays,
        }
    }

    /// Parse `text` as a merged consensus/microdescriptor block.
    ///
    /// Per SPEC_FULL.md §4.4, a relay whose block cannot be fully parsed is
    /// skipped (and logged) rather than failing the whole document; only a
    /// structural failure of the document itself (no blocks at all, or a
    /// malformed `valid-after` line) is a [`Error::BadDocument`].
    pub fn parse(text: &str, valid_after: SystemTime) -> Result<Self, Error> {
        let mut relays = Vec::new();
        let mut skipped = 0usize;
        for block in split_relay_blocks(text) {
            match parse_relay_block(block) {
                Ok(relay) if relay.is_usable() => relays.push(relay),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(%err, "skipping unparseable relay entry in consensus");
                    skipped += 1;
                }
            }
        }
        if relays.is_empty() && skipped == 0 {
            return Err(Error::BadDocument("no relay entries found".into()));
        }
        Ok(Consensus {
            valid_after,
            relays,
        })
    }

    /// The relays in this consensus, already filtered to `Running && Valid`.
    pub fn relays(&self) -> &[Relay] {
        &self.relays
    }

    /// When this consensus became valid.
    pub fn valid_after(&self) -> SystemTime {
        self.valid_after
    }

    /// Return true if this consensus is older than [`MAX_CONSENSUS_AGE`]
    /// as of `now`.
    pub fn is_stale(&self, now: SystemTime) -> bool {
        match now.duration_since(self.valid_after) {
            Ok(age) => age > MAX_CONSENSUS_AGE,
            Err(_) => false,
        }
    }
}

/// Split a document into the whitespace-separated chunks that each begin
/// with an `"r "` line, the way `tor-netdoc` splits a consensus into one
/// item per router-status entry.
fn split_relay_blocks(text: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    for (offset, _) in text.match_indices("\nr ") {
        starts.push(offset + 1);
    }
    if text.starts_with("r ") {
        starts.insert(0, 0);
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect()
}

/// Parse one relay's `"r"`/`"s"`/`"w"`/`"id"`/`"ntor-onion-key"` lines.
fn parse_relay_block(block: &str) -> Result<Relay, Error> {
    let mut nickname = None;
    let mut rsa_identity = None;
    let mut or_port = None;
    let mut flags = RelayFlags::empty();
    let mut bandwidth = 0u32;
    let mut ed_identity = None;
    let mut ntor_onion_key = None;

    for line in block.lines() {
        let line = line.trim();
        let mut words = line.split_ascii_whitespace();
        match words.next() {
            Some("r") => {
                let fields: Vec<&str> = words.collect();
                let (name, ident_b64, ip, or_port_str) = match fields.as_slice() {
                    [name, ident_b64, _digest, _date, _time, ip, or_port_str, ..] => {
                        (*name, *ident_b64, *ip, *or_port_str)
                    }
                    _ => return Err(Error::BadDocument(format!("malformed r line: {line}"))),
                };
                nickname = Some(name.to_string());
                rsa_identity = Some(decode_rsa_identity(ident_b64)?);
                let ip: IpAddr = ip
                    .parse()
                    .map_err(|_| Error::BadDocument(format!("bad IP in r line: {line}")))?;
                let port: u16 = or_port_str
                    .parse()
                    .map_err(|_| Error::BadDocument(format!("bad ORPort in r line: {line}")))?;
                or_port = Some(SocketAddr::new(ip, port));
            }
            Some("s") => {
                for flag in words {
                    flags |= flag_from_name(flag);
                }
            }
            Some("w") => {
                for kv in words {
                    if let Some(value) = kv.strip_prefix("Bandwidth=") {
                        bandwidth = value.parse().unwrap_or(0);
                    }
                }
            }
            Some("id") => {
                if let (Some("ed25519"), Some(b64)) = (words.next(), words.next()) {
                    ed_identity = Some(decode_ed25519_identity(b64)?);
                }
            }
            Some("ntor-onion-key") => {
                if let Some(b64) = words.next() {
                    ntor_onion_key = Some(decode_ntor_key(b64)?);
                }
            }
            _ => {}
        }
    }

    let nickname = nickname.ok_or_else(|| Error::BadDocument("missing r line".into()))?;
    let rsa_identity = rsa_identity.ok_or_else(|| Error::BadDocument("missing identity".into()))?;
    let or_port = or_port.ok_or_else(|| Error::BadDocument("missing ORPort".into()))?;
    let ed_identity =
        ed_identity.ok_or_else(|| Error::BadDocument("missing ed25519 identity".into()))?;
    let ntor_onion_key =
        ntor_onion_key.ok_or_else(|| Error::BadDocument("missing ntor-onion-key".into()))?;

    let exit_policy = if flags.contains(RelayFlags::EXIT) {
        ExitPolicy::accept_all()
    } else {
        ExitPolicy::default()
    };

    Ok(Relay {
        rsa_identity,
        ed_identity,
        nickname,
        or_port,
        flags,
        bandwidth,
        exit_policy,
        ntor_onion_key,
    })
}

/// Map an `"s"` line flag keyword onto a [`RelayFlags`] bit.
fn flag_from_name(name: &str) -> RelayFlags {
    match name {
        "Running" => RelayFlags::RUNNING,
        "Valid" => RelayFlags::VALID,
        "Guard" => RelayFlags::GUARD,
        "Exit" => RelayFlags::EXIT,
        "Stable" => RelayFlags::STABLE,
        "Fast" => RelayFlags::FAST,
        _ => RelayFlags::empty(),
    }
}

/// Decode a base64-unpadded 20-byte RSA identity fingerprint.
fn decode_rsa_identity(b64: &str) -> Result<RsaIdentity, Error> {
    let decoded = Base64Unpadded::decode_vec(b64)
        .map_err(|_| Error::BadDocument(format!("bad identity base64: {b64}")))?;
    RsaIdentity::from_bytes(&decoded)
        .ok_or_else(|| Error::BadDocument("identity wrong length".into()))
}

/// Decode a base64-unpadded 32-byte Ed25519 identity.
fn decode_ed25519_identity(b64: &str) -> Result<Ed25519Identity, Error> {
    let decoded = Base64Unpadded::decode_vec(b64)
        .map_err(|_| Error::BadDocument(format!("bad ed25519 base64: {b64}")))?;
    let arr: [u8; 32] = decoded
        .try_into()
        .map_err(|_| Error::BadDocument("ed25519 identity wrong length".into()))?;
    Ok(Ed25519Identity::new(arr))
}

/// Decode a base64-unpadded 32-byte `ntor` onion key.
fn decode_ntor_key(b64: &str) -> Result<CurvePublicKey, Error> {
    let decoded = Base64Unpadded::decode_vec(b64)
        .map_err(|_| Error::BadDocument(format!("bad ntor-onion-key base64: {b64}")))?;
    let arr: [u8; 32] = decoded
        .try_into()
        .map_err(|_| Error::BadDocument("ntor-onion-key wrong length".into()))?;
    Ok(CurvePublicKey::from(arr))
}

/// A single-writer, many-reader snapshot of the latest consensus.
///
/// Readers call [`NetDirProvider::latest`](crate::NetDirProvider::latest)
/// (or clone a [`Consensus`] out directly) without blocking a concurrent
/// replacement; replacement is a single atomic pointer swap, matching
/// SPEC_FULL.md §5's "Consensus snapshot: replaced atomically via a
/// pointer swap". The teacher's directory manager uses `postage::watch`
/// for this (see `tor-async-utils`), which additionally lets readers
/// await the next update; this client has no such subscriber, so a plain
/// `RwLock<Arc<_>>` gives the same atomic-swap discipline without pulling
/// in a dependency the rest of this crate has no other use for.
#[derive(Debug)]
pub struct ConsensusSnapshot(RwLock<Option<Arc<Consensus>>>);

impl ConsensusSnapshot {
    /// Create an empty snapshot, as before the client's first successful
    /// directory fetch.
    pub fn empty() -> Self {
        ConsensusSnapshot(RwLock::new(None))
    }

    /// Atomically replace the held consensus.
    pub fn store(&self, consensus: Consensus) {
        let mut guard = self.0.write().expect("consensus snapshot lock poisoned");
        *guard = Some(Arc::new(consensus));
    }

    /// Return a cheap clone of the currently held consensus, if any.
    pub fn load(&self) -> Option<Arc<Consensus>> {
        self.0.read().expect("consensus snapshot lock poisoned").clone()
    }
}

impl Default for ConsensusSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "r Unnamed AQEBAQEBAQEBAQEBAQEBAQEBAQE BAQEBAQEBAQEBAQEBAQEBAQEBAQ 2026-08-01 00:00:00 198.51.100.7 9001 0\ns Exit Fast Guard Running Stable Valid\nw Bandwidth=1000\nid ed25519 AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI\nntor-onion-key AwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwM\n";

    #[test]
    fn parses_one_relay_and_filters_flags() {
        let consensus = Consensus::parse(SAMPLE, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(consensus.relays().len(), 1);
        let relay = &consensus.relays()[0];
        assert_eq!(relay.nickname, "Unnamed");
        assert!(relay.is_suitable_as_guard());
        assert!(relay.is_suitable_as_exit(443));
        assert_eq!(relay.bandwidth, 1000);
    }

    #[test]
    fn rejects_empty_document() {
        assert!(Consensus::parse("", SystemTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn snapshot_swap_is_atomic_and_visible() {
        let snapshot = ConsensusSnapshot::empty();
        assert!(snapshot.load().is_none());
        let consensus = Consensus::parse(SAMPLE, SystemTime::UNIX_EPOCH).unwrap();
        snapshot.store(consensus);
        let loaded = snapshot.load().expect("consensus was just stored");
        assert_eq!(loaded.relays().len(), 1);
    }

    #[test]
    fn staleness_follows_valid_after() {
        let consensus = Consensus::parse(SAMPLE, SystemTime::UNIX_EPOCH).unwrap();
        let fresh = SystemTime::UNIX_EPOCH + Duration::from_secs(60);
        let stale = SystemTime::UNIX_EPOCH + Duration::from_secs(4 * 60 * 60);
        assert!(!consensus.is_stale(fresh));
        assert!(consensus.is_stale(stale));
    }
}
