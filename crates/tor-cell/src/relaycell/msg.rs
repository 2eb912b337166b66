//! The structured relay messages this client originates or understands,
//! carried as the `Data` field of a [`super::RelayCellFields`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tor_bytes::{EncodeResult, Reader, Result as BytesResult, Writer};

use super::{RelayCmd, RelayMsg};

/// A decoded relay message of any recognized kind.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnyRelayMsg {
    /// Ask the far end of a circuit to open a TCP connection.
    Begin(Begin),
    /// Ask the far end to open a stream to a directory cache's HTTP
    /// interface, reusing the circuit's existing path.
    BeginDir,
    /// Carry stream data in either direction.
    Data(Data),
    /// Close one side of a stream.
    End(End),
    /// Acknowledge a `BEGIN`/`BEGIN_DIR`; the stream is open.
    Connected(Connected),
    /// Refill a flow-control window.
    Sendme(Sendme),
    /// Extend the circuit by one hop.
    Extend2(Extend2),
    /// Reply to an `EXTEND2`.
    Extended2(Extended2),
    /// Ask the far end to resolve a hostname, or perform a reverse lookup
    /// of an address encoded as an `in-addr.arpa`/`ip6.arpa` name.
    Resolve(Resolve),
    /// Reply to a `RESOLVE`.
    Resolved(Resolved),
    /// A command this client does not parse further.
    Unrecognized(RelayCmd, Vec<u8>),
}

impl RelayMsg for AnyRelayMsg {
    fn cmd(&self) -> RelayCmd {
        match self {
            AnyRelayMsg::Begin(_) => RelayCmd::BEGIN,
            AnyRelayMsg::BeginDir => RelayCmd::BEGIN_DIR,
            AnyRelayMsg::Data(_) => RelayCmd::DATA,
            AnyRelayMsg::End(_) => RelayCmd::END,
            AnyRelayMsg::Connected(_) => RelayCmd::CONNECTED,
            AnyRelayMsg::Sendme(_) => RelayCmd::SENDME,
            AnyRelayMsg::Extend2(_) => RelayCmd::EXTEND2,
            AnyRelayMsg::Extended2(_) => RelayCmd::EXTENDED2,
            AnyRelayMsg::Resolve(_) => RelayCmd::RESOLVE,
            AnyRelayMsg::Resolved(_) => RelayCmd::RESOLVED,
            AnyRelayMsg::Unrecognized(cmd, _) => *cmd,
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        match self {
            AnyRelayMsg::Begin(b) => b.encode_onto(w)?,
            AnyRelayMsg::BeginDir => {}
            AnyRelayMsg::Data(d) => w.write_all(&d.0),
            AnyRelayMsg::End(e) => w.write_u8(e.reason),
            AnyRelayMsg::Connected(c) => c.encode_onto(w)?,
            AnyRelayMsg::Sendme(s) => w.write_all(&s.digest),
            AnyRelayMsg::Extend2(e) => e.encode_onto(w)?,
            AnyRelayMsg::Extended2(e) => {
                w.write_u16(e.handshake.len() as u16);
                w.write_all(&e.handshake);
            }
            AnyRelayMsg::Resolve(r) => {
                w.write_all(r.query.as_bytes());
                w.write_u8(0);
            }
            AnyRelayMsg::Resolved(r) => r.encode_onto(w)?,
            AnyRelayMsg::Unrecognized(_, data) => w.write_all(&data),
        }
        Ok(())
    }

    fn decode_from_reader(cmd: RelayCmd, r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(match cmd {
            RelayCmd::BEGIN => AnyRelayMsg::Begin(Begin::decode_from_reader(r)?),
            RelayCmd::BEGIN_DIR => {
                r.take_rest();
                AnyRelayMsg::BeginDir
            }
            RelayCmd::DATA => AnyRelayMsg::Data(Data(r.take_rest().to_vec())),
            RelayCmd::END => AnyRelayMsg::End(End {
                reason: if r.remaining() > 0 { r.take_u8()? } else { end_reason::NONE },
            }),
            RelayCmd::CONNECTED => AnyRelayMsg::Connected(Connected::decode_from_reader(r)?),
            RelayCmd::SENDME => AnyRelayMsg::Sendme(Sendme {
                digest: r.take_rest().to_vec(),
            }),
            RelayCmd::EXTEND2 => AnyRelayMsg::Extend2(Extend2::decode_from_reader(r)?),
            RelayCmd::EXTENDED2 => {
                let len = r.take_u16()? as usize;
                AnyRelayMsg::Extended2(Extended2 {
                    handshake: r.take(len)?.to_vec(),
                })
            }
            RelayCmd::RESOLVE => {
                let query = r.take_until(0)?;
                AnyRelayMsg::Resolve(Resolve {
                    query: String::from_utf8_lossy(query).into_owned(),
                })
            }
            RelayCmd::RESOLVED => AnyRelayMsg::Resolved(Resolved::decode_from_reader(r)?),
            _ => AnyRelayMsg::Unrecognized(cmd, r.take_rest().to_vec()),
        })
    }
}

/// Per-stream flags sent with `BEGIN`.
pub mod begin_flags {
    /// The stream may be satisfied by an IPv6 connection.
    pub const IPV6_OK: u32 = 1 << 0;
    /// The stream must not be satisfied by an IPv4 connection.
    pub const IPV4_NOT_OK: u32 = 1 << 1;
    /// The stream must be satisfied by an IPv6 connection.
    pub const IPV6_PREFERRED: u32 = 1 << 2;
}

/// Ask the far end of a circuit to open a TCP connection to `addrport`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Begin {
    /// `"host:port"`, where `host` may be a DNS name or literal address.
    pub addrport: String,
    /// A bitwise-or of the `begin_flags` constants.
    pub flags: u32,
}

impl Begin {
    /// Construct a `BEGIN` message for `host:port`.
    pub fn new(host: &str, port: u16, flags: u32) -> Self {
        Begin {
            addrport: format!("{host}:{port}"),
            flags,
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(self.addrport.as_bytes());
        w.write_u8(0);
        w.write_u32(self.flags);
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let addrport = r.take_until(0)?;
        let addrport = String::from_utf8_lossy(addrport).into_owned();
        let flags = if r.remaining() >= 4 { r.take_u32()? } else { 0 };
        Ok(Begin { addrport, flags })
    }
}

/// Stream data, in either direction.
#[derive(Clone, Eq, PartialEq)]
pub struct Data(Vec<u8>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Data({} bytes)", self.0.len())
    }
}

impl Data {
    /// Wrap up to [`super::RELAY_PAYLOAD_LEN`] bytes of stream data.
    pub fn new(bytes: Vec<u8>) -> Self {
        Data(bytes)
    }
    /// View the wrapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    /// Consume this message, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Reasons a stream can be closed, as carried by `END`.
pub mod end_reason {
    /// No reason was given.
    pub const NONE: u8 = 0;
    /// The TCP connection was refused.
    pub const CONNECTREFUSED: u8 = 2;
    /// The exit's policy forbade the connection.
    pub const EXITPOLICY: u8 = 4;
    /// The circuit was destroyed for unrelated reasons.
    pub const DESTROY: u8 = 5;
    /// DNS resolution failed.
    pub const RESOLVEFAILED: u8 = 8;
    /// The stream timed out.
    pub const TIMEOUT: u8 = 9;
}

/// Close one direction of a stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct End {
    /// Why the stream is closing; one of the `end_reason` constants, or an
    /// unrecognized value.
    pub reason: u8,
}

impl End {
    /// Construct an `END` message with the given reason code.
    pub fn new(reason: u8) -> Self {
        End { reason }
    }
}

/// Acknowledge a `BEGIN`/`BEGIN_DIR`: the stream is open.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connected {
    /// The address the exit actually connected to, and how long that
    /// mapping should be cached by the client, if reported.
    pub address: Option<(IpAddr, u32)>,
}

impl Connected {
    /// Construct a `CONNECTED` carrying no address detail.
    pub fn empty() -> Self {
        Connected { address: None }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        match self.address {
            None => w.write_u32(0),
            Some((IpAddr::V4(v4), ttl)) => {
                w.write_all(&v4.octets());
                w.write_u32(ttl);
            }
            Some((IpAddr::V6(v6), ttl)) => {
                w.write_u32(0);
                w.write_u8(6);
                w.write_all(&v6.octets());
                w.write_u32(ttl);
            }
        }
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        if r.remaining() == 0 {
            return Ok(Connected { address: None });
        }
        let a = r.take_u32()?;
        let address = if a == 0 {
            if r.remaining() == 0 {
                None
            } else {
                let ty = r.take_u8()?;
                if ty == 6 {
                    let bytes: [u8; 16] = r.take(16)?.try_into().expect("checked length");
                    let ttl = r.take_u32()?;
                    Some((IpAddr::V6(Ipv6Addr::from(bytes)), ttl))
                } else {
                    None
                }
            }
        } else {
            let ttl = r.take_u32()?;
            Some((IpAddr::V4(Ipv4Addr::from(a)), ttl))
        };
        Ok(Connected { address })
    }
}

/// Refill a flow-control window; optionally carries an authenticated
/// digest of recently-received cells.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sendme {
    /// The raw digest bytes, or empty for the legacy un-authenticated form.
    pub digest: Vec<u8>,
}

impl Sendme {
    /// Construct an un-authenticated `SENDME`.
    pub fn empty() -> Self {
        Sendme { digest: Vec::new() }
    }
}

/// Extend the circuit by one hop via the `ntor` handshake.
///
/// `link_specifiers` identifies the next hop the way [`tor_linkspec`]
/// describes it; that crate, not this one, owns the wire format of a single
/// specifier, since directory and path-selection code need the same type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extend2 {
    /// How to reach the next hop.
    pub link_specifiers: Vec<tor_linkspec::LinkSpec>,
    /// The handshake type; [`super::super::chancell::msg::HANDSHAKE_TYPE_NTOR`]
    /// for this client.
    pub handshake_type: u16,
    /// The client's handshake material.
    pub handshake: Vec<u8>,
}

impl Extend2 {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u8(self.link_specifiers.len() as u8);
        for ls in &self.link_specifiers {
            tor_bytes::Writeable::write_onto(ls, w)?;
        }
        w.write_u16(self.handshake_type);
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake);
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let n = r.take_u8()?;
        let mut link_specifiers = Vec::with_capacity(n as usize);
        for _ in 0..n {
            link_specifiers.push(tor_bytes::Readable::take_from(r)?);
        }
        let handshake_type = r.take_u16()?;
        let len = r.take_u16()? as usize;
        let handshake = r.take(len)?.to_vec();
        Ok(Extend2 {
            link_specifiers,
            handshake_type,
            handshake,
        })
    }
}

/// Reply to an `EXTEND2`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Extended2 {
    /// The new hop's handshake reply.
    pub handshake: Vec<u8>,
}

/// Ask the far end to resolve a hostname, or to perform a reverse lookup
/// of an address already encoded in `query` as an `in-addr.arpa` or
/// `ip6.arpa` name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolve {
    /// The name to resolve.
    pub query: String,
}

impl Resolve {
    /// Build a `RESOLVE` for the forward lookup of `hostname`.
    pub fn for_hostname(hostname: &str) -> Self {
        Resolve {
            query: hostname.to_string(),
        }
    }

    /// Build a `RESOLVE` for the reverse lookup of `addr`, encoding it as
    /// the conventional `in-addr.arpa`/`ip6.arpa` query name.
    pub fn for_ptr(addr: IpAddr) -> Self {
        let query = match addr {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
            }
            IpAddr::V6(v6) => {
                let mut s = String::with_capacity(72);
                for byte in v6.octets().iter().rev() {
                    s.push_str(&format!("{:x}.{:x}.", byte & 0xf, byte >> 4));
                }
                s.push_str("ip6.arpa");
                s
            }
        };
        Resolve { query }
    }
}

/// One answer carried in a `RESOLVED` reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResolvedAddr {
    /// A resolved address, with its time-to-live in seconds.
    Ip(IpAddr, u32),
    /// A resolved hostname (for reverse lookups), with its TTL.
    Hostname(String, u32),
    /// The lookup failed transiently; the client may retry later.
    TransientError,
    /// The lookup failed permanently.
    NontransientError,
}

impl ResolvedAddr {
    /// Resolved-answer type tag for a hostname.
    const TY_HOSTNAME: u8 = 0;
    /// Resolved-answer type tag for an IPv4 address.
    const TY_IPV4: u8 = 4;
    /// Resolved-answer type tag for a transient error.
    const TY_ERROR_TRANSIENT: u8 = 0xF0;
    /// Resolved-answer type tag for a nontransient error.
    const TY_ERROR_NONTRANSIENT: u8 = 0xF1;
    /// Resolved-answer type tag for an IPv6 address.
    const TY_IPV6: u8 = 6;

    fn encode_onto<W: Writer + ?Sized>(&self, w: &mut W) {
        match self {
            ResolvedAddr::Ip(IpAddr::V4(v4), ttl) => {
                w.write_u8(Self::TY_IPV4);
                w.write_u8(4);
                w.write_all(&v4.octets());
                w.write_u32(*ttl);
            }
            ResolvedAddr::Ip(IpAddr::V6(v6), ttl) => {
                w.write_u8(Self::TY_IPV6);
                w.write_u8(16);
                w.write_all(&v6.octets());
                w.write_u32(*ttl);
            }
            ResolvedAddr::Hostname(name, ttl) => {
                w.write_u8(Self::TY_HOSTNAME);
                w.write_u8(name.len() as u8);
                w.write_all(name.as_bytes());
                w.write_u32(*ttl);
            }
            ResolvedAddr::TransientError => {
                w.write_u8(Self::TY_ERROR_TRANSIENT);
                w.write_u8(0);
                w.write_u32(0);
            }
            ResolvedAddr::NontransientError => {
                w.write_u8(Self::TY_ERROR_NONTRANSIENT);
                w.write_u8(0);
                w.write_u32(0);
            }
        }
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let ty = r.take_u8()?;
        let len = r.take_u8()? as usize;
        let body = r.take(len)?.to_vec();
        let ttl = r.take_u32()?;
        Ok(match ty {
            Self::TY_IPV4 if len == 4 => {
                let a: [u8; 4] = body.try_into().expect("checked length");
                ResolvedAddr::Ip(IpAddr::V4(Ipv4Addr::from(a)), ttl)
            }
            Self::TY_IPV6 if len == 16 => {
                let a: [u8; 16] = body.try_into().expect("checked length");
                ResolvedAddr::Ip(IpAddr::V6(Ipv6Addr::from(a)), ttl)
            }
            Self::TY_ERROR_TRANSIENT => ResolvedAddr::TransientError,
            Self::TY_ERROR_NONTRANSIENT => ResolvedAddr::NontransientError,
            _ => ResolvedAddr::Hostname(String::from_utf8_lossy(&body).into_owned(), ttl),
        })
    }
}

/// Reply to a `RESOLVE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolved {
    /// The answers, in the order received.
    pub answers: Vec<ResolvedAddr>,
}

impl Resolved {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        for a in &self.answers {
            a.encode_onto(w);
        }
        Ok(())
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        let mut answers = Vec::new();
        while r.remaining() >= 2 {
            answers.push(ResolvedAddr::decode_from_reader(r)?);
        }
        Ok(Resolved { answers })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn begin_round_trip() {
        let begin = Begin::new("example.onion", 80, begin_flags::IPV6_OK);
        let mut buf = Vec::new();
        begin.clone().encode_onto(&mut buf).unwrap();
        let mut r = Reader::from_slice(&buf);
        let decoded = Begin::decode_from_reader(&mut r).unwrap();
        assert_eq!(decoded, begin);
    }

    #[test]
    fn resolve_ptr_query_format() {
        let addr: IpAddr = "192.0.2.7".parse().unwrap();
        let resolve = Resolve::for_ptr(addr);
        assert_eq!(resolve.query, "7.2.0.192.in-addr.arpa");
    }

    #[test]
    fn resolved_round_trip() {
        let resolved = Resolved {
            answers: vec![ResolvedAddr::Ip("203.0.113.5".parse().unwrap(), 300)],
        };
        let mut buf = Vec::new();
        resolved.clone().encode_onto(&mut buf).unwrap();
        let mut r = Reader::from_slice(&buf);
        let decoded = Resolved::decode_from_reader(&mut r).unwrap();
        assert_eq!(decoded, resolved);
    }
}
