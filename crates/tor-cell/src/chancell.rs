//! Cells sent directly over a Tor link (a TLS connection to a relay).
//!
//! A channel is the direct connection between this client and a relay.
//! This module defines [`ChanCell`], the outermost framing used on that
//! connection, and the commands that distinguish one kind of cell from
//! another.

pub mod codec;
pub mod msg;

use std::num::NonZeroU32;

use caret::caret_int;

/// The amount of data carried in a fixed-length cell's payload.
///
/// Cells are 514 bytes on the wire: 4 bytes of circuit ID, 1 byte of
/// command, and 509 bytes of payload.
pub const CELL_DATA_LEN: usize = 509;

/// A fixed-length cell body, as a raw byte array.
pub type RawCellBody = [u8; CELL_DATA_LEN];

/// Channel-local identifier for a circuit.
///
/// Circuit IDs are 4 bytes under link protocol versions 4 and 5 (the only
/// versions this client speaks). Zero is reserved for cells that apply to
/// the channel itself rather than to any one circuit, so a `CircId` can
/// never be zero; use `Option<CircId>` to represent "no circuit".
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct CircId(NonZeroU32);

impl From<NonZeroU32> for CircId {
    fn from(item: NonZeroU32) -> Self {
        Self(item)
    }
}
impl From<CircId> for u32 {
    fn from(id: CircId) -> u32 {
        id.0.get()
    }
}
impl std::fmt::Display for CircId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl CircId {
    /// Construct a `CircId` from a nonzero `val`.
    ///
    /// Returns `None` when `val` is zero.
    pub fn new(val: u32) -> Option<Self> {
        NonZeroU32::new(val).map(Self)
    }

    /// Convert to a `u32`, mapping `None` to 0.
    pub fn get_or_zero(circ_id: Option<Self>) -> u32 {
        match circ_id {
            Some(circ_id) => circ_id.0.get(),
            None => 0,
        }
    }
}

caret_int! {
    /// The command byte of a channel cell, selecting its meaning and
    /// (for commands below 128) implying the fixed-length format.
    #[derive(Ord, PartialOrd)]
    pub struct ChanCmd(u8) {
        /// A fixed-length cell with no effect other than traffic padding.
        PADDING = 0,
        /// Relay cell, transmitted over a circuit.
        RELAY = 3,
        /// Destroy a circuit.
        DESTROY = 4,
        /// Finish a channel handshake with time and address information.
        NETINFO = 8,
        /// Relay cell, transmitted over a circuit, subject to the
        /// per-circuit cap on early cells.
        RELAY_EARLY = 9,
        /// Create a new circuit (current format).
        CREATE2 = 10,
        /// Finish a circuit-creation handshake (current format).
        CREATED2 = 11,

        /// Variable-length cell, despite its low number: negotiate link
        /// protocol versions.
        VERSIONS = 7,
        /// Variable-length channel-padding cell.
        VPADDING = 128,
        /// Certificates offered beyond those in the TLS handshake.
        CERTS = 129,
        /// Challenge material used in the relay-to-relay handshake.
        AUTH_CHALLENGE = 130,
        /// Response material used in the relay-to-relay handshake.
        AUTHENTICATE = 131,
    }
}

/// Which circuit IDs a given [`ChanCmd`] is allowed to carry.
enum CircIdReq {
    /// Only a zero (absent) circuit ID is allowed.
    WantNone,
    /// Only a nonzero circuit ID is allowed.
    WantSome,
    /// Any circuit ID, zero or not, is allowed.
    Any,
}

impl ChanCmd {
    /// Return true if cells with this command use the variable-length
    /// format (`Length(2) | bytes[Length]`) rather than the 509-byte
    /// fixed payload.
    pub fn is_var_cell(self) -> bool {
        self == ChanCmd::VERSIONS || self.0 >= 128
    }

    /// Return what kind of circuit ID this command expects.
    fn allows_circid(self) -> CircIdReq {
        match self {
            ChanCmd::PADDING
            | ChanCmd::NETINFO
            | ChanCmd::VERSIONS
            | ChanCmd::VPADDING
            | ChanCmd::CERTS
            | ChanCmd::AUTH_CHALLENGE
            | ChanCmd::AUTHENTICATE => CircIdReq::WantNone,
            ChanCmd::RELAY
            | ChanCmd::DESTROY
            | ChanCmd::RELAY_EARLY
            | ChanCmd::CREATE2
            | ChanCmd::CREATED2 => CircIdReq::WantSome,
            _ => CircIdReq::Any,
        }
    }

    /// Return true if this command accepts the circuit ID `id`.
    pub fn accepts_circid_val(self, id: Option<CircId>) -> bool {
        match self.allows_circid() {
            CircIdReq::WantNone => id.is_none(),
            CircIdReq::WantSome => id.is_some(),
            CircIdReq::Any => true,
        }
    }
}

/// A decoded and parsed channel cell carrying an unrestricted message type.
pub type AnyChanCell = ChanCell<msg::AnyChanMsg>;

/// Trait implemented by anything that can serve as the body of a channel
/// cell.
pub trait ChanMsg {
    /// Return the [`ChanCmd`] identifying this message's type.
    fn cmd(&self) -> ChanCmd;
    /// Write the body of this message, not including its length or command.
    fn encode_onto<W: tor_bytes::Writer + ?Sized>(self, w: &mut W) -> tor_bytes::EncodeResult<()>;
    /// Decode a message of the given command from a reader truncated to
    /// the exact length of the message body.
    fn decode_from_reader(cmd: ChanCmd, r: &mut tor_bytes::Reader<'_>) -> tor_bytes::Result<Self>
    where
        Self: Sized;
}

/// A channel cell: the unit of data exchanged directly over a Tor link.
#[derive(Clone, Debug, PartialEq)]
pub struct ChanCell<M> {
    /// The circuit this cell belongs to, or `None` for a cell addressed to
    /// the channel itself.
    circid: Option<CircId>,
    /// The cell's message.
    msg: M,
}

impl<M: ChanMsg> ChanCell<M> {
    /// Construct a new channel cell.
    pub fn new(circid: Option<CircId>, msg: M) -> Self {
        ChanCell { circid, msg }
    }
    /// Return the circuit ID for this cell.
    pub fn circid(&self) -> Option<CircId> {
        self.circid
    }
    /// Return a reference to this cell's message.
    pub fn msg(&self) -> &M {
        &self.msg
    }
    /// Consume this cell, returning its circuit ID and message.
    pub fn into_circid_and_msg(self) -> (Option<CircId>, M) {
        (self.circid, self.msg)
    }
}
