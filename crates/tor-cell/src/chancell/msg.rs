//! The messages that can appear as the body of a [`super::ChanCell`].
//!
//! Only the commands this client profile needs to originate or understand
//! are decoded into structured form. `CERTS` and `AUTH_CHALLENGE` are
//! link-authentication material this client-only profile never verifies
//! (see the link connection's handshake notes), so they round-trip as
//! opaque payloads.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, SystemTime};

use tor_bytes::{EncodeResult, Reader, Result as BytesResult, Writer};

use super::{ChanCmd, ChanMsg};

/// A decoded channel cell message of any recognized kind, or an opaque
/// payload for kinds this client does not need to interpret.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AnyChanMsg {
    /// Traffic padding; the payload is meaningless and discarded on receipt.
    Padding,
    /// Offer or receive the set of link protocol versions a party supports.
    Versions(Versions),
    /// Carry timestamps and reported addresses exchanged after `VERSIONS`.
    Netinfo(Netinfo),
    /// Begin the `ntor` circuit-creation handshake for a new circuit.
    Create2(Create2),
    /// Respond to a `CREATE2` with the server's handshake reply.
    Created2(Created2),
    /// Carry an onion-encrypted relay cell.
    Relay(Relay),
    /// Carry an onion-encrypted relay cell, subject to the early-cell cap.
    RelayEarly(Relay),
    /// Tear down a circuit.
    Destroy(Destroy),
    /// A cell kind this client does not parse further: link-authentication
    /// material (`CERTS`, `AUTH_CHALLENGE`, `AUTHENTICATE`) or an unknown
    /// command.
    Unrecognized(ChanCmd, Vec<u8>),
}

impl ChanMsg for AnyChanMsg {
    fn cmd(&self) -> ChanCmd {
        match self {
            AnyChanMsg::Padding => ChanCmd::PADDING,
            AnyChanMsg::Versions(_) => ChanCmd::VERSIONS,
            AnyChanMsg::Netinfo(_) => ChanCmd::NETINFO,
            AnyChanMsg::Create2(_) => ChanCmd::CREATE2,
            AnyChanMsg::Created2(_) => ChanCmd::CREATED2,
            AnyChanMsg::Relay(_) => ChanCmd::RELAY,
            AnyChanMsg::RelayEarly(_) => ChanCmd::RELAY_EARLY,
            AnyChanMsg::Destroy(_) => ChanCmd::DESTROY,
            AnyChanMsg::Unrecognized(cmd, _) => *cmd,
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        match self {
            AnyChanMsg::Padding => {}
            AnyChanMsg::Versions(v) => v.encode_onto(w)?,
            AnyChanMsg::Netinfo(n) => n.encode_onto(w)?,
            AnyChanMsg::Create2(c) => c.encode_onto(w)?,
            AnyChanMsg::Created2(c) => c.encode_onto(w)?,
            AnyChanMsg::Relay(r) | AnyChanMsg::RelayEarly(r) => w.write_all(&r.0),
            AnyChanMsg::Destroy(d) => w.write_u8(d.reason),
            AnyChanMsg::Unrecognized(_, data) => w.write_all(&data),
        }
        Ok(())
    }

    fn decode_from_reader(cmd: ChanCmd, r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(match cmd {
            ChanCmd::PADDING => {
                r.take_rest();
                AnyChanMsg::Padding
            }
            ChanCmd::VERSIONS => AnyChanMsg::Versions(Versions::decode_from_reader(r)?),
            ChanCmd::NETINFO => AnyChanMsg::Netinfo(Netinfo::decode_from_reader(r)?),
            ChanCmd::CREATE2 => AnyChanMsg::Create2(Create2::decode_from_reader(r)?),
            ChanCmd::CREATED2 => AnyChanMsg::Created2(Created2::decode_from_reader(r)?),
            ChanCmd::RELAY => AnyChanMsg::Relay(Relay(r.take_rest().to_vec())),
            ChanCmd::RELAY_EARLY => AnyChanMsg::RelayEarly(Relay(r.take_rest().to_vec())),
            ChanCmd::DESTROY => AnyChanMsg::Destroy(Destroy {
                reason: r.take_u8()?,
            }),
            _ => AnyChanMsg::Unrecognized(cmd, r.take_rest().to_vec()),
        })
    }
}

/// The set of link protocol versions a party supports, as carried by a
/// `VERSIONS` cell (a list of big-endian `u16`s).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Versions(Vec<u16>);

impl Versions {
    /// Construct a `VERSIONS` message offering the given versions.
    pub fn new<I: IntoIterator<Item = u16>>(versions: I) -> Self {
        Versions(versions.into_iter().collect())
    }

    /// Return the highest version in both `self` and `other`, if any.
    pub fn shared_with(&self, other: &Versions) -> Option<u16> {
        self.0
            .iter()
            .filter(|v| other.0.contains(v))
            .copied()
            .max()
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        for v in self.0 {
            w.write_u16(v);
        }
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let mut versions = Vec::new();
        while r.remaining() >= 2 {
            versions.push(r.take_u16()?);
        }
        Ok(Versions(versions))
    }
}

/// One address as reported in a `NETINFO` cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetinfoAddr(IpAddr);

impl NetinfoAddr {
    /// The NETINFO address-type tag for IPv4.
    const TYPE_IPV4: u8 = 0x04;
    /// The NETINFO address-type tag for IPv6.
    const TYPE_IPV6: u8 = 0x06;

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        match self.0 {
            IpAddr::V4(v4) => {
                w.write_u8(Self::TYPE_IPV4);
                w.write_u8(4);
                w.write_all(&v4.octets());
            }
            IpAddr::V6(v6) => {
                w.write_u8(Self::TYPE_IPV6);
                w.write_u8(16);
                w.write_all(&v6.octets());
            }
        }
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let ty = r.take_u8()?;
        let len = r.take_u8()? as usize;
        let body = r.take(len)?;
        let addr = match (ty, len) {
            (Self::TYPE_IPV4, 4) => {
                let a: [u8; 4] = body.try_into().expect("checked length");
                IpAddr::V4(Ipv4Addr::from(a))
            }
            (Self::TYPE_IPV6, 16) => {
                let a: [u8; 16] = body.try_into().expect("checked length");
                IpAddr::V6(Ipv6Addr::from(a))
            }
            _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        Ok(NetinfoAddr(addr))
    }
}

impl From<IpAddr> for NetinfoAddr {
    fn from(addr: IpAddr) -> Self {
        NetinfoAddr(addr)
    }
}

/// The `NETINFO` cell: timestamps and address information exchanged once
/// link versions are negotiated.
///
/// This client treats the contents as informational only; neither
/// timestamp nor address is authenticated, and clock skew is not enforced.
#[derive(Clone, Debug, PartialEq)]
pub struct Netinfo {
    /// The sender's idea of the current time.
    pub timestamp: SystemTime,
    /// The address the sender believes it is being contacted at, if any.
    pub other_addr: Option<NetinfoAddr>,
    /// Addresses the sender believes are its own.
    pub my_addrs: Vec<NetinfoAddr>,
}

impl Netinfo {
    /// Construct a `NETINFO` message for `now`, as seen by us connecting to
    /// a relay at `other_addr`.
    pub fn new(now: SystemTime, other_addr: Option<IpAddr>, my_addrs: Vec<IpAddr>) -> Self {
        Netinfo {
            timestamp: now,
            other_addr: other_addr.map(NetinfoAddr::from),
            my_addrs: my_addrs.into_iter().map(NetinfoAddr::from).collect(),
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        let epoch = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as u32;
        w.write_u32(epoch);
        match self.other_addr {
            Some(a) => a.encode_onto(w),
            None => {
                w.write_u8(0);
                w.write_u8(0);
            }
        }
        w.write_u8(self.my_addrs.len() as u8);
        for a in self.my_addrs {
            a.encode_onto(w);
        }
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let epoch = r.take_u32()?;
        let timestamp = SystemTime::UNIX_EPOCH + Duration::from_secs(epoch as u64);
        let other_addr = Some(NetinfoAddr::decode_from_reader(r)?);
        let n_my_addrs = r.take_u8()?;
        let mut my_addrs = Vec::with_capacity(n_my_addrs as usize);
        for _ in 0..n_my_addrs {
            my_addrs.push(NetinfoAddr::decode_from_reader(r)?);
        }
        Ok(Netinfo {
            timestamp,
            other_addr,
            my_addrs,
        })
    }
}

/// Identifies which key-exchange protocol a `CREATE2`/`CREATED2` pair uses.
///
/// This client only ever sends `NTOR` (type `0x0002`); other values are
/// preserved verbatim if ever received so they can be rejected by the
/// caller rather than silently misparsed.
pub const HANDSHAKE_TYPE_NTOR: u16 = 0x0002;

/// Begin a circuit-creation (or circuit-extension) handshake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Create2 {
    /// The handshake type; always [`HANDSHAKE_TYPE_NTOR`] for this client.
    pub handshake_type: u16,
    /// The client's handshake material (for `ntor`: `NODEID | KEYID | X`).
    pub handshake: Vec<u8>,
}

impl Create2 {
    /// Construct a `CREATE2` message carrying `handshake` of the given type.
    pub fn new(handshake_type: u16, handshake: Vec<u8>) -> Self {
        Create2 {
            handshake_type,
            handshake,
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u16(self.handshake_type);
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake);
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let handshake_type = r.take_u16()?;
        let len = r.take_u16()? as usize;
        let handshake = r.take(len)?.to_vec();
        Ok(Create2 {
            handshake_type,
            handshake,
        })
    }
}

/// The reply to a `CREATE2`, completing the `ntor` handshake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Created2 {
    /// The server's handshake reply (for `ntor`: `Y | AUTH`).
    pub handshake: Vec<u8>,
}

impl Created2 {
    /// Wrap a raw handshake reply.
    pub fn new(handshake: Vec<u8>) -> Self {
        Created2 { handshake }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake);
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let len = r.take_u16()? as usize;
        let handshake = r.take(len)?.to_vec();
        Ok(Created2 { handshake })
    }
}

/// An onion-encrypted relay cell payload, exactly [`super::CELL_DATA_LEN`]
/// bytes, opaque at the channel-cell layer.
///
/// The channel codec treats this as a byte blob; interpreting and
/// onion-unwrapping it is the circuit layer's job, in `relaycell`.
#[derive(Clone, Eq, PartialEq)]
pub struct Relay(Vec<u8>);

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Relay({} bytes)", self.0.len())
    }
}

impl Relay {
    /// Wrap a fully-encoded and onion-encrypted relay payload.
    pub fn from_raw(body: Vec<u8>) -> Self {
        Relay(body)
    }

    /// View the raw bytes of this payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume this payload, returning its raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Reasons a circuit can be torn down, as carried by `DESTROY`.
pub mod destroy_reason {
    /// No reason was given.
    pub const NONE: u8 = 0;
    /// A protocol violation occurred.
    pub const PROTOCOL: u8 = 2;
    /// The relay ran out of resources.
    pub const RESOURCELIMIT: u8 = 4;
    /// The requested destination's exit policy forbade the request.
    pub const EXITPOLICY: u8 = 6;
    /// The circuit was torn down by its originator.
    pub const REQUESTED: u8 = 9;
}

/// Tear down a circuit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Destroy {
    /// Why the circuit is being destroyed; one of the `destroy_reason`
    /// constants, or an unrecognized value.
    pub reason: u8,
}

impl Destroy {
    /// Construct a `DESTROY` message with the given reason code.
    pub fn new(reason: u8) -> Self {
        Destroy { reason }
    }
}
