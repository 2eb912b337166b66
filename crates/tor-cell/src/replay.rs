//! Per-circuit, per-direction replay detection for relay cells.
//!
//! Each hop of a circuit keeps one [`ReplaySieve`] per direction. Once a
//! relay cell's `recognized`/digest check (done by the circuit crypto
//! layer) says the cell belongs to this hop, the sieve gets a chance to
//! reject it as a duplicate or out-of-window delivery before it is acted
//! on.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};

/// The default sliding-window size used by a [`ReplaySieve`].
pub const DEFAULT_WINDOW: u64 = 32;

/// The length, in bytes, of the truncated digest used to detect duplicate
/// cell payloads.
const DIGEST_LEN: usize = 16;

/// Which direction of a circuit a [`ReplaySieve`] call concerns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Client to relay.
    Forward,
    /// Relay to client.
    Backward,
}

/// Why [`ReplaySieve::validate`] rejected a cell.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum ReplayError {
    /// This exact payload (by digest) was already seen at `prior_seq`.
    #[error("duplicate cell payload, first seen at sequence {prior_seq}")]
    DuplicateDigest {
        /// The sequence number the payload was first accepted at.
        prior_seq: u64,
    },
    /// This sequence number was already accepted.
    #[error("sequence {seq} already seen")]
    SequenceReplayed {
        /// The repeated sequence number.
        seq: u64,
    },
    /// This sequence number is older than the sieve's retained window.
    #[error("sequence {seq} is older than the replay window (expected >= {floor})")]
    TooOld {
        /// The rejected sequence number.
        seq: u64,
        /// The oldest sequence number the sieve will still accept.
        floor: u64,
    },
    /// This sequence number is further ahead than the sieve will tolerate.
    #[error("sequence {seq} is too far ahead (ceiling {ceiling})")]
    TooFarAhead {
        /// The rejected sequence number.
        seq: u64,
        /// The highest sequence number the sieve will accept.
        ceiling: u64,
    },
}

/// Running counters exposed by a [`ReplaySieve`] for one direction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReplayCounters {
    /// Number of cells rejected as duplicates or replays.
    pub replay_attempts: u64,
    /// Number of cells accepted out of strict sequence order.
    pub out_of_order: u64,
}

/// Per-direction replay state: the retained window of accepted sequence
/// numbers and the digests of their payloads.
#[derive(Debug, Default)]
struct DirState {
    /// Accepted sequence numbers still inside the window, mapped to the
    /// digest of the payload accepted at that sequence. Ordered by
    /// sequence number so the oldest entries can be evicted cheaply.
    seqs: BTreeMap<u64, [u8; DIGEST_LEN]>,
    /// Reverse index from payload digest to the sequence it was first
    /// accepted at, for duplicate detection independent of sequence.
    digests: HashMap<[u8; DIGEST_LEN], u64>,
    /// One past the highest sequence number ever accepted.
    expected: u64,
    /// Whether any cell has been accepted yet.
    started: bool,
    /// Running counters.
    counters: ReplayCounters,
}

/// A sliding-window replay detector for one circuit.
///
/// Tracks forward and backward traffic independently, since a cell
/// crossing a hop in one direction never collides with one in the other.
#[derive(Debug)]
pub struct ReplaySieve {
    /// Number of trailing sequence numbers retained for duplicate checks.
    window_size: u64,
    /// State for client-to-relay traffic.
    forward: DirState,
    /// State for relay-to-client traffic.
    backward: DirState,
}

impl ReplaySieve {
    /// Construct a sieve with the given sliding-window size.
    pub fn new(window_size: u64) -> Self {
        ReplaySieve {
            window_size,
            forward: DirState::default(),
            backward: DirState::default(),
        }
    }

    /// Return the state for `direction`.
    fn state_mut(&mut self, direction: Direction) -> &mut DirState {
        match direction {
            Direction::Forward => &mut self.forward,
            Direction::Backward => &mut self.backward,
        }
    }

    /// Validate and, on success, record a cell's `(direction, seq, bytes)`.
    ///
    /// Rejects a duplicate payload digest, a repeated sequence number, a
    /// sequence older than the retained window, or one further ahead than
    /// twice the window size. On acceptance, records the entry and evicts
    /// anything that has fallen out of the window.
    pub fn validate(
        &mut self,
        direction: Direction,
        seq: u64,
        bytes: &[u8],
    ) -> Result<(), ReplayError> {
        let window_size = self.window_size;
        let digest = truncated_digest(bytes);
        let state = self.state_mut(direction);

        if let Some(&prior_seq) = state.digests.get(&digest) {
            state.counters.replay_attempts += 1;
            return Err(ReplayError::DuplicateDigest { prior_seq });
        }
        if state.seqs.contains_key(&seq) {
            state.counters.replay_attempts += 1;
            return Err(ReplayError::SequenceReplayed { seq });
        }
        if state.started {
            let floor = state.expected.saturating_sub(window_size);
            if seq < floor {
                state.counters.replay_attempts += 1;
                return Err(ReplayError::TooOld { seq, floor });
            }
            let ceiling = state.expected + 2 * window_size;
            if seq > ceiling {
                state.counters.replay_attempts += 1;
                return Err(ReplayError::TooFarAhead { seq, ceiling });
            }
            if seq + 1 < state.expected {
                state.counters.out_of_order += 1;
            }
        }

        state.digests.insert(digest, seq);
        state.seqs.insert(seq, digest);
        state.started = true;
        state.expected = state.expected.max(seq + 1);

        let floor = state.expected.saturating_sub(window_size);
        while let Some((&oldest, _)) = state.seqs.iter().next() {
            if oldest < floor {
                let (_, old_digest) = state.seqs.pop_first().expect("checked non-empty");
                state.digests.remove(&old_digest);
            } else {
                break;
            }
        }

        Ok(())
    }

    /// Return the running counters for `direction`.
    pub fn counters(&self, direction: Direction) -> ReplayCounters {
        match direction {
            Direction::Forward => self.forward.counters,
            Direction::Backward => self.backward.counters,
        }
    }

    /// Clear all retained state, for use when a circuit is torn down and
    /// its sequence space is no longer meaningful.
    pub fn reset(&mut self) {
        self.forward = DirState::default();
        self.backward = DirState::default();
    }
}

/// Compute the first 16 bytes of the SHA-256 digest of `bytes`.
fn truncated_digest(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let full = Sha256::digest(bytes);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&full[..DIGEST_LEN]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_digest() {
        let mut sieve = ReplaySieve::new(32);
        sieve
            .validate(Direction::Forward, 0, b"cell-0")
            .expect("first delivery accepted");
        let err = sieve
            .validate(Direction::Forward, 1, b"cell-0")
            .unwrap_err();
        assert_eq!(err, ReplayError::DuplicateDigest { prior_seq: 0 });
    }

    #[test]
    fn rejects_repeated_sequence_with_different_payload() {
        let mut sieve = ReplaySieve::new(32);
        sieve.validate(Direction::Forward, 5, b"a").unwrap();
        let err = sieve.validate(Direction::Forward, 5, b"b").unwrap_err();
        assert_eq!(err, ReplayError::SequenceReplayed { seq: 5 });
    }

    #[test]
    fn rejects_sequence_older_than_window() {
        let mut sieve = ReplaySieve::new(4);
        for seq in 0..10u64 {
            sieve
                .validate(Direction::Forward, seq, format!("cell-{seq}").as_bytes())
                .unwrap();
        }
        let err = sieve
            .validate(Direction::Forward, 0, b"cell-0-replayed")
            .unwrap_err();
        assert!(matches!(err, ReplayError::TooOld { seq: 0, .. }));
    }

    #[test]
    fn rejects_sequence_too_far_ahead() {
        let mut sieve = ReplaySieve::new(4);
        sieve.validate(Direction::Forward, 0, b"cell-0").unwrap();
        let err = sieve
            .validate(Direction::Forward, 1000, b"cell-far")
            .unwrap_err();
        assert!(matches!(err, ReplayError::TooFarAhead { .. }));
    }

    #[test]
    fn directions_are_independent() {
        let mut sieve = ReplaySieve::new(32);
        sieve.validate(Direction::Forward, 0, b"same").unwrap();
        sieve
            .validate(Direction::Backward, 0, b"same")
            .expect("backward direction has its own digest set");
    }

    #[test]
    fn counters_track_replay_attempts() {
        let mut sieve = ReplaySieve::new(32);
        sieve.validate(Direction::Forward, 0, b"x").unwrap();
        let _ = sieve.validate(Direction::Forward, 0, b"x");
        assert_eq!(sieve.counters(Direction::Forward).replay_attempts, 1);
    }

    #[test]
    fn reset_clears_state() {
        let mut sieve = ReplaySieve::new(32);
        sieve.validate(Direction::Forward, 0, b"x").unwrap();
        sieve.reset();
        sieve
            .validate(Direction::Forward, 0, b"x")
            .expect("state was cleared");
    }
}
