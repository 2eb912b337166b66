//! Relay cells: the inner frame carried inside a `RELAY`/`RELAY_EARLY`
//! channel cell, onion-encrypted one layer per hop on a circuit.
//!
//! A [`RelayCellFields`] is always exactly [`super::chancell::CELL_DATA_LEN`]
//! bytes once encoded, so that it fills a fixed-length channel cell exactly.

pub mod msg;

use std::num::NonZeroU16;

use caret::caret_int;
use tor_bytes::{EncodeResult, Reader, Result as BytesResult, Writer};
use tor_error::internal;

use crate::chancell::CELL_DATA_LEN;
use crate::{Error, Result};

/// Size of the relay cell header: `Cmd(1) | Recognized(2) | StreamID(2) |
/// Digest(4) | Length(2)`.
const RELAY_HEADER_LEN: usize = 1 + 2 + 2 + 4 + 2;

/// The largest `Data` payload a relay cell can carry.
pub const RELAY_PAYLOAD_LEN: usize = CELL_DATA_LEN - RELAY_HEADER_LEN;

caret_int! {
    /// The command byte of a relay cell, identifying its meaning.
    pub struct RelayCmd(u8) {
        /// Start a new stream on a circuit.
        BEGIN = 1,
        /// Carry stream data.
        DATA = 2,
        /// Close one direction of a stream.
        END = 3,
        /// Acknowledge a `BEGIN`; the stream is open.
        CONNECTED = 4,
        /// Refill a flow-control window.
        SENDME = 5,
        /// Extend a circuit to a new hop (current format).
        EXTEND2 = 14,
        /// Reply to an `EXTEND2`.
        EXTENDED2 = 15,
        /// Start a DNS lookup (including reverse lookups via the relay
        /// extension this client uses for `RESOLVE_PTR`).
        RESOLVE = 11,
        /// Reply to a `RESOLVE`.
        RESOLVED = 12,
        /// Start a stream to a directory cache's HTTP interface.
        BEGIN_DIR = 13,
    }
}

/// Which stream IDs a given [`RelayCmd`] is allowed to carry.
enum StreamIdReq {
    /// Only a zero (absent) stream ID is allowed.
    WantNone,
    /// Only a nonzero stream ID is allowed.
    WantSome,
}

impl RelayCmd {
    /// Return what kind of stream ID this command expects.
    fn expects_streamid(self) -> StreamIdReq {
        match self {
            RelayCmd::BEGIN
            | RelayCmd::DATA
            | RelayCmd::END
            | RelayCmd::CONNECTED
            | RelayCmd::RESOLVE
            | RelayCmd::RESOLVED
            | RelayCmd::BEGIN_DIR => StreamIdReq::WantSome,
            RelayCmd::SENDME | RelayCmd::EXTEND2 | RelayCmd::EXTENDED2 => StreamIdReq::WantNone,
            _ => StreamIdReq::WantSome,
        }
    }

    /// Return true if this command accepts the stream ID `id`.
    pub fn accepts_streamid_val(self, id: Option<StreamId>) -> bool {
        match self.expects_streamid() {
            StreamIdReq::WantNone => id.is_none(),
            StreamIdReq::WantSome => id.is_some(),
        }
    }
}

/// A circuit-local identifier for a stream multiplexed over that circuit.
///
/// Cannot be zero; a zero stream ID in the wire format means "this relay
/// cell is not about any one stream" and is represented as `None`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct StreamId(NonZeroU16);

impl StreamId {
    /// Construct a `StreamId` from a nonzero `val`.
    pub fn new(val: u16) -> Option<Self> {
        NonZeroU16::new(val).map(Self)
    }

    /// Convert to a `u16`, mapping `None` to 0.
    pub fn get_or_zero(id: Option<Self>) -> u16 {
        match id {
            Some(id) => id.0.get(),
            None => 0,
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Trait implemented by anything that can serve as the body of a relay
/// cell.
pub trait RelayMsg {
    /// Return the [`RelayCmd`] identifying this message's type.
    fn cmd(&self) -> RelayCmd;
    /// Write the body of this message (the `Data` field contents).
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> tor_bytes::EncodeResult<()>;
    /// Decode a message of the given command from a reader truncated to
    /// the exact declared `Length`.
    fn decode_from_reader(cmd: RelayCmd, r: &mut Reader<'_>) -> BytesResult<Self>
    where
        Self: Sized;
}

/// The decoded header and body of one relay cell, ready to be onion-wrapped
/// (encrypted and digest-stamped) or after having been onion-unwrapped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayCellFields {
    /// The relay command.
    pub cmd: RelayCmd,
    /// `0` unless this cell has been recognized by the hop that owns it.
    pub recognized: u16,
    /// The stream this cell belongs to, or `None` for circuit-level cells.
    pub streamid: Option<StreamId>,
    /// The rolling digest value stamped into this cell's `Digest` field.
    pub digest: [u8; 4],
    /// The cell's `Data` payload.
    pub data: Vec<u8>,
}

impl RelayCellFields {
    /// Build a relay cell ready for onion-wrapping: `recognized` and
    /// `digest` are left zeroed for the caller to fill in once it has
    /// computed the hop's rolling digest over this cell.
    pub fn new(cmd: RelayCmd, streamid: Option<StreamId>, data: Vec<u8>) -> Result<Self> {
        if data.len() > RELAY_PAYLOAD_LEN {
            return Err(Error::RelayDataTooLong(data.len()));
        }
        Ok(RelayCellFields {
            cmd,
            recognized: 0,
            streamid,
            digest: [0; 4],
            data,
        })
    }

    /// Return true if this cell is marked recognized, i.e. `recognized ==
    /// 0`. The actual ownership check also requires the digest to match;
    /// see the circuit crypto layer.
    pub fn is_recognized(&self) -> bool {
        self.recognized == 0
    }

    /// Encode this cell's fields into exactly [`CELL_DATA_LEN`] bytes,
    /// zero-padding the `Data` field out to [`RELAY_PAYLOAD_LEN`].
    pub fn encode(&self) -> Result<[u8; CELL_DATA_LEN]> {
        if self.data.len() > RELAY_PAYLOAD_LEN {
            return Err(Error::RelayDataTooLong(self.data.len()));
        }
        let mut buf = Vec::with_capacity(CELL_DATA_LEN);
        buf.write_u8(self.cmd.into());
        buf.write_u16(self.recognized);
        buf.write_u16(StreamId::get_or_zero(self.streamid));
        buf.write_all(&self.digest);
        buf.write_u16(self.data.len() as u16);
        buf.write_all(&self.data);
        buf.write_zeros(RELAY_PAYLOAD_LEN - self.data.len());
        buf.try_into()
            .map_err(|_| Error::Internal(internal!("relay cell encode produced wrong length")))
    }

    /// Decode a relay cell's fields from an onion-unwrapped, exactly
    /// [`CELL_DATA_LEN`]-byte payload.
    pub fn decode(body: &[u8; CELL_DATA_LEN]) -> Result<Self> {
        fn wrap_err(err: tor_bytes::Error) -> Error {
            Error::BytesErr {
                err,
                parsed: "relay cell",
            }
        }
        let mut r = Reader::from_slice(body);
        let cmd: RelayCmd = r.take_u8().map_err(wrap_err)?.into();
        let recognized = r.take_u16().map_err(wrap_err)?;
        let streamid = StreamId::new(r.take_u16().map_err(wrap_err)?);
        let digest: [u8; 4] = r.take(4).map_err(wrap_err)?.try_into().expect("checked length");
        let len = r.take_u16().map_err(wrap_err)? as usize;
        if len > RELAY_PAYLOAD_LEN || len > r.remaining() {
            return Err(Error::CircProto(format!(
                "relay cell claims length {len}, which does not fit"
            )));
        }
        let data = r.take(len).map_err(wrap_err)?.to_vec();

        if !cmd.accepts_streamid_val(streamid) {
            return Err(Error::CircProto(format!(
                "invalid stream ID {} for relay command {}",
                StreamId::get_or_zero(streamid),
                cmd
            )));
        }
        Ok(RelayCellFields {
            cmd,
            recognized,
            streamid,
            digest,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let cell = RelayCellFields::new(RelayCmd::DATA, StreamId::new(7), b"hello".to_vec()).unwrap();
        let bytes = cell.encode().unwrap();
        assert_eq!(bytes.len(), CELL_DATA_LEN);
        let decoded = RelayCellFields::decode(&bytes).unwrap();
        assert_eq!(decoded.cmd, RelayCmd::DATA);
        assert_eq!(decoded.streamid, StreamId::new(7));
        assert_eq!(decoded.data, b"hello");
    }

    #[test]
    fn data_too_long_is_rejected() {
        let data = vec![0u8; RELAY_PAYLOAD_LEN + 1];
        assert!(RelayCellFields::new(RelayCmd::DATA, StreamId::new(1), data).is_err());
    }

    #[test]
    fn decode_rejects_impossible_length() {
        let mut bytes = [0u8; CELL_DATA_LEN];
        bytes[0] = RelayCmd::DATA.into();
        // Claim a length far larger than what can fit.
        bytes[5] = 0xff;
        bytes[6] = 0xff;
        assert!(RelayCellFields::decode(&bytes).is_err());
    }
}
