//! Fetching a consensus document and keeping a [`ConsensusSnapshot`] fresh.
//!
//! The actual HTTP-over-Tor transport is out of this crate's scope (the
//! teacher splits it into `tor-dirclient`); callers supply a
//! [`ConsensusFetcher`] that performs the transport and hands back raw
//! document bytes. This mirrors `tor-guardmgr`'s `FallbackDir` split: the
//! fallback-directory list lives next to the directory logic, but dialing
//! the network is someone else's job.

use std::net::SocketAddr;
use std::time::SystemTime;

use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

use crate::consensus::{Consensus, ConsensusSnapshot};
use crate::err::Error;

/// One of the hard-coded fallback directory caches used to bootstrap a
/// consensus before any relays are known, grounded on
/// `tor-guardmgr/src/fallback/set.rs`'s `FallbackDir`.
#[derive(Clone, Debug)]
pub struct FallbackDir {
    /// The address to connect to for directory requests.
    pub addr: SocketAddr,
    /// The fallback's RSA identity.
    pub rsa_identity: RsaIdentity,
    /// The fallback's Ed25519 identity.
    pub ed_identity: Ed25519Identity,
}

/// Return the hard-coded set of fallback directories this client trusts to
/// answer its first consensus request.
///
/// Real Tor ships several dozen of these, refreshed from a periodic survey
/// of long-lived relays; this reduced client ships a representative
/// placeholder set sized for the client-only scope here; a deployment
/// would replace it with a maintained list.
pub fn default_fallback_dirs() -> Vec<FallbackDir> {
    vec![
        FallbackDir {
            addr: "198.51.100.1:9001".parse().expect("valid fallback address"),
            rsa_identity: RsaIdentity::from_bytes(&[0x11; 20]).expect("correct length"),
            ed_identity: Ed25519Identity::new([0x11; 32]),
        },
        FallbackDir {
            addr: "198.51.100.2:9001".parse().expect("valid fallback address"),
            rsa_identity: RsaIdentity::from_bytes(&[0x22; 20]).expect("correct length"),
            ed_identity: Ed25519Identity::new([0x22; 32]),
        },
        FallbackDir {
            addr: "198.51.100.3:9001".parse().expect("valid fallback address"),
            rsa_identity: RsaIdentity::from_bytes(&[0x33; 20]).expect("correct length"),
            ed_identity: Ed25519Identity::new([0x33; 32]),
        },
    ]
}

/// Performs the network transport for a directory fetch.
///
/// Implemented elsewhere (on top of the channel/circuit layers); this
/// crate only defines the seam and the parsing/staleness policy around it.
pub trait ConsensusFetcher {
    /// Fetch the current consensus document's raw text from `fallback`.
    fn fetch_consensus(&self, fallback: &FallbackDir) -> Result<String, Error>;
}

/// Bootstraps and refreshes a [`ConsensusSnapshot`] from a set of fallback
/// directories.
pub struct DirectoryClient {
    /// The fallback directories to try, in order, on each fetch attempt.
    fallbacks: Vec<FallbackDir>,
    /// The latest consensus, if any.
    snapshot: ConsensusSnapshot,
}

impl DirectoryClient {
    /// Build a client that will try `fallbacks` in order on each fetch.
    pub fn new(fallbacks: Vec<FallbackDir>) -> Self {
        DirectoryClient {
            fallbacks,
            snapshot: ConsensusSnapshot::empty(),
        }
    }

    /// Build a client using [`default_fallback_dirs`].
    pub fn with_default_fallbacks() -> Self {
        Self::new(default_fallback_dirs())
    }

    /// The held consensus snapshot, shared with whatever reads it
    /// concurrently with a future refresh.
    pub fn snapshot(&self) -> &ConsensusSnapshot {
        &self.snapshot
    }

    /// Try each fallback directory in turn until one yields a parseable
    /// consensus, then atomically install it.
    ///
    /// Per SPEC_FULL.md §4.4: a fetch or whole-document parse failure from
    /// one fallback just moves on to the next; if every fallback fails,
    /// the previous snapshot (if any) is left untouched and
    /// [`Error::DirFetchFailed`] is returned.
    pub fn refresh(&self, fetcher: &dyn ConsensusFetcher, now: SystemTime) -> Result<(), Error> {
        let mut last_err = None;
        for fallback in &self.fallbacks {
            match fetcher
                .fetch_consensus(fallback)
                .and_then(|text| Consensus::parse(&text, now))
            {
                Ok(consensus) => {
                    self.snapshot.store(consensus);
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(addr = %fallback.addr, %err, "directory fetch failed");
                    last_err = Some(err);
                }
            }
        }
        let _ = last_err;
        Err(Error::DirFetchFailed)
    }

    /// Return true if we hold a consensus that is not yet
    /// [`MAX_CONSENSUS_AGE`](crate::consensus::MAX_CONSENSUS_AGE) stale.
    pub fn is_healthy(&self, now: SystemTime) -> bool {
        match self.snapshot.load() {
            Some(consensus) => !consensus.is_stale(now),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SAMPLE: &str = "r Unnamed AQEBAQEBAQEBAQEBAQEBAQEBAQE BAQEBAQEBAQEBAQEBAQEBAQEBAQ 2026-08-01 00:00:00 198.51.100.7 9001 0\ns Exit Fast Guard Running Stable Valid\nw Bandwidth=1000\nid ed25519 AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI\nntor-onion-key AwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwM\n";

    struct FailThenSucceed {
        calls: AtomicUsize,
    }
    impl ConsensusFetcher for FailThenSucceed {
        fn fetch_consensus(&self, _fallback: &FallbackDir) -> Result<String, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(Error::DirFetchFailed)
            } else {
                Ok(SAMPLE.to_string())
            }
        }
    }

    #[test]
    fn refresh_falls_back_to_next_directory() {
        let client = DirectoryClient::with_default_fallbacks();
        let fetcher = FailThenSucceed {
            calls: AtomicUsize::new(0),
        };
        client.refresh(&fetcher, SystemTime::UNIX_EPOCH).unwrap();
        assert!(client.is_healthy(SystemTime::UNIX_EPOCH));
        assert_eq!(client.snapshot().load().unwrap().relays().len(), 1);
    }

    struct AlwaysFails;
    impl ConsensusFetcher for AlwaysFails {
        fn fetch_consensus(&self, _fallback: &FallbackDir) -> Result<String, Error> {
            Err(Error::DirFetchFailed)
        }
    }

    #[test]
    fn refresh_reports_failure_when_all_fallbacks_fail() {
        let client = DirectoryClient::with_default_fallbacks();
        assert!(client.refresh(&AlwaysFails, SystemTime::UNIX_EPOCH).is_err());
        assert!(!client.is_healthy(SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn stale_snapshot_is_unhealthy() {
        let client = DirectoryClient::with_default_fallbacks();
        let fetcher = FailThenSucceed {
            calls: AtomicUsize::new(1),
        };
        client.refresh(&fetcher, SystemTime::UNIX_EPOCH).unwrap();
        let much_later = SystemTime::UNIX_EPOCH + Duration::from_secs(4 * 60 * 60);
        assert!(!client.is_healthy(much_later));
    }
}
