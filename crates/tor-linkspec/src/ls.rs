//! Link specifier objects: the pieces of information an `EXTEND2` cell
//! uses to tell the next-to-last hop of a circuit how to reach and
//! authenticate the hop being added.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use caret::caret_int;
use tor_bytes::{EncodeResult, Readable, Reader, Result as BytesResult, Writeable, Writer};
use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

use crate::RelayId;

caret_int! {
    /// The wire type tag of a [`LinkSpec`].
    pub struct LinkSpecType(u8) {
        /// An IPv4 ORPort address.
        ORPORT_V4 = 0,
        /// An IPv6 ORPort address.
        ORPORT_V6 = 1,
        /// An RSA identity fingerprint.
        RSA_ID = 2,
        /// An Ed25519 identity.
        ED25519_ID = 3,
    }
}

/// One piece of information about how to reach and authenticate a relay,
/// as carried in an `EXTEND2` cell's link specifier list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkSpec {
    /// A TCP address for a relay's OR port.
    OrPort(IpAddr, u16),
    /// The relay's RSA identity fingerprint.
    RsaId(RsaIdentity),
    /// The relay's Ed25519 identity.
    Ed25519Id(Ed25519Identity),
    /// A link specifier of a type this client does not recognize.
    Unrecognized(LinkSpecType, Vec<u8>),
}

impl From<&SocketAddr> for LinkSpec {
    fn from(sa: &SocketAddr) -> Self {
        LinkSpec::OrPort(sa.ip(), sa.port())
    }
}
impl From<SocketAddr> for LinkSpec {
    fn from(sa: SocketAddr) -> Self {
        (&sa).into()
    }
}
impl From<RsaIdentity> for LinkSpec {
    fn from(id: RsaIdentity) -> Self {
        LinkSpec::RsaId(id)
    }
}
impl From<Ed25519Identity> for LinkSpec {
    fn from(id: Ed25519Identity) -> Self {
        LinkSpec::Ed25519Id(id)
    }
}
impl From<RelayId> for LinkSpec {
    fn from(id: RelayId) -> Self {
        match id {
            RelayId::Ed25519(key) => LinkSpec::Ed25519Id(key),
            RelayId::Rsa(key) => LinkSpec::RsaId(key),
        }
    }
}

impl LinkSpec {
    /// Return this link specifier's wire type tag.
    fn lstype(&self) -> LinkSpecType {
        match self {
            LinkSpec::OrPort(IpAddr::V4(_), _) => LinkSpecType::ORPORT_V4,
            LinkSpec::OrPort(IpAddr::V6(_), _) => LinkSpecType::ORPORT_V6,
            LinkSpec::RsaId(_) => LinkSpecType::RSA_ID,
            LinkSpec::Ed25519Id(_) => LinkSpecType::ED25519_ID,
            LinkSpec::Unrecognized(t, _) => *t,
        }
    }

    /// Order link specifiers the way an `EXTEND2` cell conventionally
    /// lists them: IPv4 OR port, then RSA ID, then Ed25519 ID, then IPv6.
    pub fn sort_by_type(lst: &mut [Self]) {
        fn pos(ls: &LinkSpec) -> u8 {
            match ls {
                LinkSpec::OrPort(IpAddr::V4(_), _) => 0,
                LinkSpec::RsaId(_) => 1,
                LinkSpec::Ed25519Id(_) => 2,
                LinkSpec::OrPort(IpAddr::V6(_), _) => 3,
                LinkSpec::Unrecognized(t, _) => (*t).into(),
            }
        }
        lst.sort_by_key(pos);
    }

    /// Decode the body of a link specifier of type `lstype` from `r`.
    fn from_type_and_body(lstype: LinkSpecType, r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(match lstype {
            LinkSpecType::ORPORT_V4 => {
                let ip = Ipv4Addr::from(r.take_u32()?);
                let port = r.take_u16()?;
                LinkSpec::OrPort(ip.into(), port)
            }
            LinkSpecType::ORPORT_V6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(r.take(16)?);
                let ip = Ipv6Addr::from(octets);
                let port = r.take_u16()?;
                LinkSpec::OrPort(ip.into(), port)
            }
            LinkSpecType::RSA_ID => {
                let body = r.take(20)?;
                LinkSpec::RsaId(RsaIdentity::from_bytes(body).ok_or_else(|| {
                    tor_bytes::Error::InvalidMessage("wrong length for RSA identity".into())
                })?)
            }
            LinkSpecType::ED25519_ID => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(r.take(32)?);
                LinkSpec::Ed25519Id(Ed25519Identity::new(bytes))
            }
            other => LinkSpec::Unrecognized(other, r.take_rest().to_vec()),
        })
    }

    /// Encode the body (not the type tag or length prefix) of this link
    /// specifier onto `w`.
    fn encode_body<W: Writer + ?Sized>(&self, w: &mut W) -> EncodeResult<()> {
        match self {
            LinkSpec::OrPort(IpAddr::V4(ip), port) => {
                w.write_all(&ip.octets());
                w.write_u16(*port);
            }
            LinkSpec::OrPort(IpAddr::V6(ip), port) => {
                w.write_all(&ip.octets());
                w.write_u16(*port);
            }
            LinkSpec::RsaId(id) => w.write_all(id.as_bytes()),
            LinkSpec::Ed25519Id(id) => w.write_all(id.as_bytes()),
            LinkSpec::Unrecognized(_, body) => w.write_all(body),
        }
        Ok(())
    }
}

impl Readable for LinkSpec {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let lstype = r.take_u8()?.into();
        r.read_nested_u8len(|r| Self::from_type_and_body(lstype, r))
    }
}

impl Writeable for LinkSpec {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(self.lstype().into());
        {
            let mut inner = w.write_nested_u8len();
            self.encode_body(&mut *inner)?;
            inner.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tor_bytes::Reader;

    #[test]
    fn orport_v4_round_trip() {
        let ls = LinkSpec::OrPort("198.51.100.7".parse().unwrap(), 9001);
        let mut buf = Vec::new();
        ls.write_onto(&mut buf).unwrap();
        let mut r = Reader::from_slice(&buf);
        let decoded = LinkSpec::take_from(&mut r).unwrap();
        assert_eq!(decoded, ls);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn rsa_and_ed25519_round_trip() {
        let rsa = RsaIdentity::from_bytes(&[7u8; 20]).unwrap();
        let ed = Ed25519Identity::new([9u8; 32]);
        let mut specs = vec![LinkSpec::from(ed), LinkSpec::from(rsa)];
        LinkSpec::sort_by_type(&mut specs);
        assert_eq!(specs[0], LinkSpec::RsaId(rsa));
        assert_eq!(specs[1], LinkSpec::Ed25519Id(ed));
    }
}
