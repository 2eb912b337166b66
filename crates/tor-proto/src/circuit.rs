//! Circuits: a path of one to eight relays built one hop at a time over a
//! [`Channel`](crate::channel::Channel), and the onion-wrap/unwrap of
//! relay cells traveling over it.
//!
//! Grounded on the shape of the teacher's (pre-conflux) `circuit.rs` and
//! `circuit/celltypes.rs`: a reactor task owns the per-hop crypto and the
//! channel's inbound-message receiver, and callers talk to it through a
//! command channel. Collapsed here to a single path with no conflux, no
//! padding negotiation, and a concrete two-direction flow-control window
//! instead of the teacher's generic `sendme` accounting.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};

use tor_cell::chancell::msg::AnyChanMsg;
use tor_cell::chancell::{AnyChanCell, ChanCell, CircId};
use tor_cell::relaycell::msg::{AnyRelayMsg, Extend2};
use tor_cell::relaycell::{RelayCellFields, RelayCmd, RelayMsg, StreamId};
use tor_cell::replay::{Direction, ReplaySieve};
use tor_linkspec::{CircTarget, HasRelayIds};
use tor_llcrypto::pk::curve25519::PublicKey;
use tor_llcrypto::pk::rsa::RsaIdentity;
use tracing::trace;

use crate::channel::Channel;
use crate::crypto::cellcrypto::{InboundCrypt, OutboundCrypt};
use crate::crypto::handshake::NtorClientHandshake;
use crate::err::{Error, Result};

/// The largest number of hops this client will extend a circuit to.
pub const MAX_HOPS: usize = 8;

/// The largest number of `RELAY_EARLY` cells the link protocol allows per
/// circuit; every extension past this count is sent as a plain `RELAY`
/// cell instead (see SPEC_FULL.md §9, "Open Question decision 3").
pub const MAX_RELAY_EARLY_CELLS: u8 = 8;

/// The circuit-level flow-control window's starting size, in cells.
pub(crate) const CIRC_WINDOW_START: i32 = 1000;
/// How many cells the circuit-level window refills by on each `SENDME` we
/// receive, and how many cells we deliver before sending one ourselves.
pub(crate) const CIRC_WINDOW_INCREMENT: i32 = 100;
/// The stream-level flow-control window's starting size, in cells.
pub(crate) const STREAM_WINDOW_START: i32 = 500;
/// How many cells a stream's window refills by on each `SENDME`, and how
/// many cells are delivered before one is sent.
pub(crate) const STREAM_WINDOW_INCREMENT: i32 = 50;

/// True if the cell that is the `prior`-th `RELAY_EARLY`-eligible cell sent
/// on a circuit (0-indexed) still falls within [`MAX_RELAY_EARLY_CELLS`].
fn use_relay_early(prior: u8) -> bool {
    prior < MAX_RELAY_EARLY_CELLS
}

/// Per-hop state: the crypto layer and replay tracking for that hop.
struct Hop {
    /// Running replay-sequence counters for this hop, one per direction.
    seq: [u64; 2],
    /// The hop's own replay detector.
    replay: ReplaySieve,
}

impl Hop {
    fn new() -> Self {
        Hop {
            seq: [0, 0],
            replay: ReplaySieve::new(tor_cell::replay::DEFAULT_WINDOW),
        }
    }

    fn next_seq(&mut self, direction: Direction) -> u64 {
        let slot = match direction {
            Direction::Forward => &mut self.seq[0],
            Direction::Backward => &mut self.seq[1],
        };
        let seq = *slot;
        *slot += 1;
        seq
    }
}

/// Shared, lock-protected state of one circuit's reactor.
struct CircState {
    outbound: OutboundCrypt,
    inbound: InboundCrypt,
    hops: Vec<Hop>,
    /// Cells this client may still send before it must wait for a
    /// circuit-level `SENDME`.
    circ_send_window: i32,
    /// Cells delivered to streams since this client last sent a
    /// circuit-level `SENDME` of its own.
    circ_deliver_count: i32,
}

/// A built circuit: a path of relays over which streams can be opened.
///
/// A `ClientCirc` is cheap to clone; clones share the same path and
/// in-flight streams.
#[derive(Clone)]
pub struct ClientCirc(Arc<CircInner>);

impl PartialEq for ClientCirc {
    /// Two handles name the same circuit iff they share the same reactor
    /// state, not merely an equal path or circuit ID (which a channel could
    /// in principle reuse after teardown).
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ClientCirc {}

struct CircInner {
    channel: Channel,
    id: CircId,
    state: AsyncMutex<CircState>,
    /// Cells from the channel addressed to this circuit, other than the
    /// replies consumed directly while extending.
    from_channel: AsyncMutex<mpsc::UnboundedReceiver<AnyChanMsg>>,
    /// Routes an inbound `DATA`/`END`/`CONNECTED`/`SENDME` cell to the
    /// stream it belongs to.
    streams: std::sync::Mutex<HashMap<StreamId, mpsc::UnboundedSender<AnyRelayMsg>>>,
    /// The next raw stream ID value this side will try to allocate.
    next_stream_id: std::sync::atomic::AtomicU16,
    /// Wakes tasks blocked in [`ClientCirc::reserve_circ_window`] whenever
    /// the circuit-level send window grows.
    window_grew: tokio::sync::Notify,
    /// Whether any stream has ever been opened on this circuit; used to
    /// decide when the circuit becomes eligible for rotation out of the
    /// "clean" pool.
    used: std::sync::atomic::AtomicBool,
    /// How many `RELAY_EARLY` cells this circuit has sent so far, capped at
    /// [`MAX_RELAY_EARLY_CELLS`].
    relay_early_sent: std::sync::atomic::AtomicU8,
}

impl ClientCirc {
    /// Build a new circuit whose first hop is `(node_id, onion_key)`,
    /// reachable over `channel`.
    pub async fn create(
        channel: Channel,
        node_id: RsaIdentity,
        onion_key: PublicKey,
        rng: &mut (impl rand_core::RngCore + rand_core::CryptoRng),
    ) -> Result<ClientCirc> {
        let (id, from_channel, keys) = channel.create_first_hop(node_id, onion_key, rng).await?;

        let mut outbound = OutboundCrypt::new();
        let mut inbound = InboundCrypt::new();
        outbound.add_hop(&keys);
        inbound.add_hop(&keys);

        let state = CircState {
            outbound,
            inbound,
            hops: vec![Hop::new()],
            circ_send_window: CIRC_WINDOW_START,
            circ_deliver_count: 0,
        };

        Ok(ClientCirc(Arc::new(CircInner {
            channel,
            id,
            state: AsyncMutex::new(state),
            from_channel: AsyncMutex::new(from_channel),
            streams: std::sync::Mutex::new(HashMap::new()),
            next_stream_id: std::sync::atomic::AtomicU16::new(1),
            window_grew: tokio::sync::Notify::new(),
            used: std::sync::atomic::AtomicBool::new(false),
            relay_early_sent: std::sync::atomic::AtomicU8::new(0),
        })))
    }

    /// Start this circuit's background reactor (see [`Self::run`]).
    ///
    /// Call this once the circuit has reached its full length (after any
    /// [`Self::extend`] calls), and before opening any stream: the reactor
    /// and [`Self::extend`] both consume from the same inbound-cell
    /// receiver, so running them concurrently would race over who gets a
    /// given reply.
    pub fn activate(&self) {
        tokio::spawn(self.clone().run());
    }

    /// The number of hops currently on this circuit.
    pub async fn len(&self) -> usize {
        self.0.state.lock().await.hops.len()
    }

    /// Extend the circuit by one hop, reaching `target` through the
    /// current last hop via `EXTEND2`.
    pub async fn extend<T: CircTarget>(
        &self,
        target: &T,
        rng: &mut (impl rand_core::RngCore + rand_core::CryptoRng),
    ) -> Result<()> {
        let current_len = self.len().await;
        if current_len >= MAX_HOPS {
            return Err(Error::TooManyHops);
        }

        let hs = NtorClientHandshake::new(*target.rsa_identity(), *target.ntor_onion_key(), &mut *rng);
        let extend2 = Extend2 {
            link_specifiers: target.link_specifiers(),
            handshake_type: tor_cell::chancell::msg::HANDSHAKE_TYPE_NTOR,
            handshake: hs.client_handshake_bytes(),
        };
        self.send_relay_control(current_len - 1, AnyRelayMsg::Extend2(extend2))
            .await?;

        let fields = self.await_control_reply(current_len - 1).await?;
        if fields.cmd != RelayCmd::EXTENDED2 {
            return Err(Error::Protocol(format!(
                "expected EXTENDED2, got relay command {}",
                fields.cmd
            )));
        }
        let mut reader = tor_bytes::Reader::from_slice(&fields.data);
        let extended2 = match AnyRelayMsg::decode_from_reader(fields.cmd, &mut reader) {
            Ok(AnyRelayMsg::Extended2(e)) => e,
            Ok(_) | Err(_) => return Err(Error::Protocol("malformed EXTENDED2".into())),
        };
        let keys = hs.finish(&extended2.handshake)?;

        let mut state = self.0.state.lock().await;
        state.outbound.add_hop(&keys);
        state.inbound.add_hop(&keys);
        state.hops.push(Hop::new());
        trace!("{}: extended to {} hops", self.0.id, state.hops.len());
        Ok(())
    }

    /// Onion-wrap and send a circuit-extension cell to the given 0-based
    /// hop, as `RELAY_EARLY` until this circuit has used up its
    /// [`MAX_RELAY_EARLY_CELLS`] budget, then as plain `RELAY`.
    async fn send_relay_control(&self, hop: usize, msg: AnyRelayMsg) -> Result<()> {
        let cmd = msg.cmd();
        let mut buf = Vec::new();
        msg.encode_onto(&mut buf).map_err(|e| Error::Internal(format!("encoding relay message: {e}")))?;
        let fields = RelayCellFields::new(cmd, None, buf).map_err(Error::CellCodec)?;

        let mut state = self.0.state.lock().await;
        let wire = state.outbound.encrypt(hop, fields)?;
        drop(state);

        let raw = tor_cell::chancell::msg::Relay::from_raw(wire.to_vec());
        let prior = self.0.relay_early_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let chan_msg = if use_relay_early(prior) {
            AnyChanMsg::RelayEarly(raw)
        } else {
            trace!("{}: RELAY_EARLY budget exhausted, sending plain RELAY", self.0.id);
            AnyChanMsg::Relay(raw)
        };

        let cell = ChanCell::new(Some(self.0.id), chan_msg);
        self.0.channel.send_cell(cell)
    }

    /// Wait for the next relay cell addressed to this circuit as a whole
    /// (not to any open stream), used while a hop extension is pending.
    async fn await_control_reply(&self, expect_hop: usize) -> Result<RelayCellFields> {
        let mut from_channel = self.0.from_channel.lock().await;
        loop {
            let msg = from_channel.recv().await.ok_or(Error::Closed)?;
            match msg {
                AnyChanMsg::Relay(r) | AnyChanMsg::RelayEarly(r) => {
                    let body: [u8; tor_cell::chancell::CELL_DATA_LEN] = r
                        .into_bytes()
                        .try_into()
                        .map_err(|_| Error::Protocol("relay cell has the wrong length".into()))?;
                    let mut state = self.0.state.lock().await;
                    let Some((owner, fields)) = state.inbound.decrypt(body) else {
                        return Err(Error::NotRecognized);
                    };
                    if owner != expect_hop {
                        return Err(Error::Protocol(
                            "circuit extension reply came from the wrong hop".into(),
                        ));
                    }
                    let seq = state.hops[owner].next_seq(Direction::Backward);
                    state.hops[owner]
                        .replay
                        .validate(Direction::Backward, seq, &fields.data)
                        .map_err(Error::Replay)?;
                    return Ok(fields);
                }
                AnyChanMsg::Destroy(d) => return Err(Error::CircuitDestroyed(d.reason)),
                _ => continue,
            }
        }
    }

    /// Onion-wrap a stream-bound relay message and send it to `hop`.
    pub(crate) async fn send_relay_msg(&self, hop: usize, streamid: Option<StreamId>, msg: AnyRelayMsg) -> Result<()> {
        let cmd = msg.cmd();
        let mut buf = Vec::new();
        msg.encode_onto(&mut buf).map_err(|e| Error::Internal(format!("encoding relay message: {e}")))?;
        let fields = RelayCellFields::new(cmd, streamid, buf).map_err(Error::CellCodec)?;

        let mut state = self.0.state.lock().await;
        let wire = state.outbound.encrypt(hop, fields)?;
        drop(state);

        let cell = ChanCell::new(
            Some(self.0.id),
            AnyChanMsg::Relay(tor_cell::chancell::msg::Relay::from_raw(wire.to_vec())),
        );
        self.0.channel.send_cell(cell)
    }

    /// Allocate a stream ID not currently in use on this circuit and
    /// register its inbound route.
    pub(crate) fn new_stream(&self) -> (StreamId, mpsc::UnboundedReceiver<AnyRelayMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut streams = self.0.streams.lock().expect("not poisoned");
        loop {
            let raw = self.0.next_stream_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let Some(id) = StreamId::new(raw) else { continue };
            if let std::collections::hash_map::Entry::Vacant(e) = streams.entry(id) {
                e.insert(tx);
                self.0.used.store(true, std::sync::atomic::Ordering::Relaxed);
                return (id, rx);
            }
        }
    }

    /// Whether any stream has ever been opened on this circuit.
    pub fn is_used(&self) -> bool {
        self.0.used.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Send `DESTROY` for this circuit, per SPEC_FULL.md §4.9's shutdown
    /// sequence ("send DESTROY on all circuits").
    ///
    /// This only sends the cell; it does not wait for the link to
    /// acknowledge it, since a destroyed circuit's reactor is not expected
    /// to reply.
    pub fn destroy(&self, reason: u8) -> Result<()> {
        let cell = ChanCell::new(
            Some(self.0.id),
            AnyChanMsg::Destroy(tor_cell::chancell::msg::Destroy::new(reason)),
        );
        self.0.channel.send_cell(cell)
    }

    /// Wait until the circuit-level send window has room, then reserve one
    /// cell's worth of it.
    pub(crate) async fn reserve_circ_window(&self) -> Result<()> {
        loop {
            let notified = self.0.window_grew.notified();
            {
                let mut state = self.0.state.lock().await;
                if state.circ_send_window > 0 {
                    state.circ_send_window -= 1;
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Remove a stream's route once it is closed.
    pub(crate) fn forget_stream(&self, id: StreamId) {
        self.0.streams.lock().expect("not poisoned").remove(&id);
    }

    /// The index of the last hop, used as the exit hop for new streams.
    pub(crate) async fn last_hop(&self) -> usize {
        self.0.state.lock().await.hops.len() - 1
    }

    /// Run this circuit's reactor loop: decrypt each inbound `RELAY`/
    /// `RELAY_EARLY` cell and dispatch it to the stream it belongs to.
    ///
    /// Exits when the channel's route for this circuit closes (the link
    /// went away) or a `DESTROY` cell arrives.
    pub async fn run(self) {
        loop {
            let msg = {
                let mut from_channel = self.0.from_channel.lock().await;
                match from_channel.recv().await {
                    Some(m) => m,
                    None => break,
                }
            };
            match msg {
                AnyChanMsg::Relay(r) | AnyChanMsg::RelayEarly(r) => {
                    let Ok(body) = r.into_bytes().try_into() else {
                        continue;
                    };
                    if let Err(()) = self.dispatch_inbound(body).await {
                        break;
                    }
                }
                AnyChanMsg::Destroy(_) => break,
                _ => continue,
            }
        }
        self.0.channel.forget_circuit(self.0.id);
        let streams = std::mem::take(&mut *self.0.streams.lock().expect("not poisoned"));
        drop(streams);
    }

    /// Decrypt one inbound cell and route it to its stream, validating
    /// replay state along the way. Returns `Err(())` on an unrecoverable
    /// protocol error that should tear the circuit down.
    async fn dispatch_inbound(&self, body: [u8; tor_cell::chancell::CELL_DATA_LEN]) -> std::result::Result<(), ()> {
        let mut state = self.0.state.lock().await;
        let Some((owner, fields)) = state.inbound.decrypt(body) else {
            return Ok(());
        };
        let seq = state.hops[owner].next_seq(Direction::Backward);
        if state.hops[owner].replay.validate(Direction::Backward, seq, &fields.data).is_err() {
            return Err(());
        }
        drop(state);

        if fields.cmd == RelayCmd::SENDME && fields.streamid.is_none() {
            let mut state = self.0.state.lock().await;
            state.circ_send_window += CIRC_WINDOW_INCREMENT;
            drop(state);
            self.0.window_grew.notify_waiters();
            return Ok(());
        }

        if fields.cmd == RelayCmd::DATA {
            let send_sendme = {
                let mut state = self.0.state.lock().await;
                state.circ_deliver_count += 1;
                if state.circ_deliver_count >= CIRC_WINDOW_INCREMENT {
                    state.circ_deliver_count = 0;
                    true
                } else {
                    false
                }
            };
            if send_sendme {
                let _ = self.send_relay_msg(owner, None, AnyRelayMsg::Sendme(tor_cell::relaycell::msg::Sendme::empty())).await;
            }
        }

        let Some(streamid) = fields.streamid else {
            // A circuit-level cell this reactor does not otherwise handle.
            return Ok(());
        };
        let route = self.0.streams.lock().expect("not poisoned").get(&streamid).cloned();
        if let Some(route) = route {
            let mut reader = tor_bytes::Reader::from_slice(&fields.data);
            if let Ok(relay_msg) = AnyRelayMsg::decode_from_reader(fields.cmd, &mut reader) {
                let _ = route.send(relay_msg);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_early_budget_is_eight_cells_per_circuit() {
        for prior in 0..MAX_RELAY_EARLY_CELLS {
            assert!(use_relay_early(prior), "cell {prior} should still be RELAY_EARLY");
        }
        assert!(
            !use_relay_early(MAX_RELAY_EARLY_CELLS),
            "the 9th extension cell must fall back to plain RELAY"
        );
        assert!(!use_relay_early(MAX_RELAY_EARLY_CELLS + 1));
    }
}
