//! The wire types of a SOCKS5 negotiation: RFC 1928's method greeting and
//! CONNECT request, RFC 1929's username/password sub-negotiation, and the
//! two Tor extension commands that repurpose RFC 1928's reserved command
//! range for in-Tor hostname resolution.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use caret::caret_int;
use safelog::Sensitive;
use tor_bytes::{EncodeResult, Readable, Reader, Result as BytesResult, Writeable, Writer};

use crate::err::Error;

/// The only SOCKS version this crate speaks.
const VERSION: u8 = 5;

caret_int! {
    /// An authentication method offered in the greeting, or selected in the
    /// method-selection reply.
    pub struct AuthMethod(u8) {
        /// No authentication required.
        NO_AUTH = 0,
        /// RFC 1929 username/password.
        USERNAME_PASSWORD = 2,
        /// No method in the greeting was acceptable.
        NO_ACCEPTABLE_METHOD = 0xff,
    }
}

caret_int! {
    /// The command byte of a SOCKS5 request.
    pub struct Command(u8) {
        /// Open a TCP stream to the given address.
        CONNECT = 1,
        /// Listen for an inbound connection. Not supported.
        BIND = 2,
        /// Relay UDP datagrams. Not supported.
        UDP_ASSOCIATE = 3,
        /// Tor extension: resolve a hostname to an address, without
        /// opening a stream.
        RESOLVE = 0xf0,
        /// Tor extension: resolve an address to a hostname (reverse DNS),
        /// without opening a stream.
        RESOLVE_PTR = 0xf1,
    }
}

caret_int! {
    /// The address-type byte preceding an encoded [`SocksAddr`].
    pub struct AddrType(u8) {
        /// A 4-byte IPv4 address follows.
        IPV4 = 1,
        /// A length-prefixed domain name follows.
        DOMAINNAME = 3,
        /// A 16-byte IPv6 address follows.
        IPV6 = 4,
    }
}

caret_int! {
    /// The reply-code byte of a SOCKS5 reply.
    pub struct ReplyCode(u8) {
        /// The request succeeded.
        SUCCEEDED = 0,
        /// An unspecified failure occurred.
        GENERAL_FAILURE = 1,
        /// The ruleset forbids this connection.
        CONNECTION_NOT_ALLOWED = 2,
        /// The destination network is unreachable.
        NETWORK_UNREACHABLE = 3,
        /// The destination host is unreachable.
        HOST_UNREACHABLE = 4,
        /// The destination refused the connection.
        CONNECTION_REFUSED = 5,
        /// The circuit or path expired before completion.
        TTL_EXPIRED = 6,
        /// The command byte named an unsupported command.
        COMMAND_NOT_SUPPORTED = 7,
        /// The address-type byte named an unsupported address type.
        ADDRESS_TYPE_NOT_SUPPORTED = 8,
    }
}

/// A destination address, in either of the forms a SOCKS5 message can
/// carry: a literal IP, or a domain name (including a `.onion` name) to be
/// resolved on the exit side of the circuit.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SocksAddr {
    /// A literal IPv4 or IPv6 address.
    Ip(IpAddr),
    /// A domain name, not yet resolved. May name a `.onion` service.
    Domain(String),
}

impl SocksAddr {
    /// The `AddrType` byte this address would be encoded with.
    fn addr_type(&self) -> AddrType {
        match self {
            SocksAddr::Ip(IpAddr::V4(_)) => AddrType::IPV4,
            SocksAddr::Ip(IpAddr::V6(_)) => AddrType::IPV6,
            SocksAddr::Domain(_) => AddrType::DOMAINNAME,
        }
    }

    /// Decode an address of the given `atyp`, per SPEC_FULL.md §4.8's
    /// address-type table.
    fn decode_body(atyp: AddrType, r: &mut Reader<'_>) -> BytesResult<Self> {
        match atyp {
            AddrType::IPV4 => {
                let octets: [u8; 4] = r.extract()?;
                Ok(SocksAddr::Ip(IpAddr::V4(Ipv4Addr::from(octets))))
            }
            AddrType::IPV6 => {
                let octets: [u8; 16] = r.extract()?;
                Ok(SocksAddr::Ip(IpAddr::V6(Ipv6Addr::from(octets))))
            }
            AddrType::DOMAINNAME => {
                let len = r.take_u8()? as usize;
                let bytes = r.take(len)?;
                let name = std::str::from_utf8(bytes)
                    .map_err(|_| tor_bytes::Error::InvalidMessage("domain name is not UTF-8".into()))?;
                Ok(SocksAddr::Domain(name.to_string()))
            }
            _ => Err(tor_bytes::Error::InvalidMessage(
                "unrecognized SOCKS address type".into(),
            )),
        }
    }

    /// Encode this address' body (not its `AddrType` byte) onto `w`.
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        match self {
            SocksAddr::Ip(IpAddr::V4(ip)) => w.write_all(&ip.octets()),
            SocksAddr::Ip(IpAddr::V6(ip)) => w.write_all(&ip.octets()),
            SocksAddr::Domain(name) => {
                let len: u8 = name
                    .len()
                    .try_into()
                    .map_err(|_| tor_bytes::EncodeError::BadLengthValue)?;
                w.write_u8(len);
                w.write_all(name.as_bytes());
            }
        }
        Ok(())
    }
}

/// RFC 1928's opening greeting: the client's offered authentication
/// methods.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Greeting {
    /// The methods the client is willing to use, in the order offered.
    pub methods: Vec<AuthMethod>,
}

impl Readable for Greeting {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let ver = r.take_u8()?;
        if ver != VERSION {
            return Err(tor_bytes::Error::InvalidMessage(
                "unsupported SOCKS version in greeting".into(),
            ));
        }
        let nmethods = r.take_u8()? as usize;
        let methods = r.take(nmethods)?.iter().map(|&b| AuthMethod::from(b)).collect();
        Ok(Greeting { methods })
    }
}

impl Writeable for Greeting {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(VERSION);
        let nmethods = u8::try_from(self.methods.len())
            .map_err(|_| tor_bytes::EncodeError::BadLengthValue)?;
        w.write_u8(nmethods);
        for method in &self.methods {
            w.write_u8((*method).into());
        }
        Ok(())
    }
}

/// RFC 1928's method-selection reply: the server's chosen method, or
/// [`AuthMethod::NO_ACCEPTABLE_METHOD`] if none of the client's offers
/// would do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MethodSelection {
    /// The method the server selected.
    pub method: AuthMethod,
}

impl Writeable for MethodSelection {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(VERSION);
        w.write_u8(self.method.into());
        Ok(())
    }
}

/// RFC 1929's username/password sub-negotiation request.
///
/// The password is never validated against anything; per SPEC_FULL.md
/// §4.8 it (like the username) exists only to be folded into a circuit
/// pool isolation key by the caller, so both fields are wrapped in
/// [`Sensitive`] to keep them out of logs and `Debug` output.
#[derive(Clone, Debug)]
pub struct UsernamePassword {
    /// The offered username.
    pub username: Sensitive<String>,
    /// The offered password.
    pub password: Sensitive<String>,
}

impl Readable for UsernamePassword {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let ver = r.take_u8()?;
        if ver != 1 {
            return Err(tor_bytes::Error::InvalidMessage(
                "unsupported username/password sub-negotiation version".into(),
            ));
        }
        let ulen = r.take_u8()? as usize;
        let username = std::str::from_utf8(r.take(ulen)?)
            .map_err(|_| tor_bytes::Error::InvalidMessage("username is not UTF-8".into()))?
            .to_string();
        let plen = r.take_u8()? as usize;
        let password = std::str::from_utf8(r.take(plen)?)
            .map_err(|_| tor_bytes::Error::InvalidMessage("password is not UTF-8".into()))?
            .to_string();
        Ok(UsernamePassword {
            username: Sensitive::new(username),
            password: Sensitive::new(password),
        })
    }
}

/// RFC 1929's username/password sub-negotiation reply: zero for success,
/// any other byte for failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UsernamePasswordReply {
    /// Whether the server is willing to proceed.
    pub success: bool,
}

impl Writeable for UsernamePasswordReply {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(1);
        w.write_u8(if self.success { 0 } else { 1 });
        Ok(())
    }
}

/// RFC 1928's request: the command the client wants performed, and its
/// target address and port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    /// The requested command.
    pub command: Command,
    /// The target address.
    pub addr: SocksAddr,
    /// The target port.
    pub port: u16,
}

impl Readable for Request {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let ver = r.take_u8()?;
        if ver != VERSION {
            return Err(tor_bytes::Error::InvalidMessage(
                "unsupported SOCKS version in request".into(),
            ));
        }
        let command = Command::from(r.take_u8()?);
        let _reserved = r.take_u8()?;
        let atyp = AddrType::from(r.take_u8()?);
        let addr = SocksAddr::decode_body(atyp, r)?;
        let port = r.take_u16()?;
        Ok(Request { command, addr, port })
    }
}

impl Writeable for Request {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(VERSION);
        w.write_u8(self.command.into());
        w.write_u8(0);
        w.write_u8(self.addr.addr_type().into());
        self.addr.write_onto(w)?;
        w.write_u16(self.port);
        Ok(())
    }
}

/// RFC 1928's reply to a request: the outcome, and the address/port the
/// server is now sending/receiving from (usually the relay's own bound
/// address, which this client — like most SOCKS servers behind a NAT —
/// has no meaningful value for and fills with all-zeros).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    /// The outcome of the request.
    pub code: ReplyCode,
    /// The bound address reported back to the client.
    pub addr: SocksAddr,
    /// The bound port reported back to the client.
    pub port: u16,
}

impl Reply {
    /// Build a reply reporting `code`, with the conventional all-zeros
    /// IPv4 bound address used when the server has no real one to report.
    pub fn new(code: ReplyCode) -> Self {
        Reply {
            code,
            addr: SocksAddr::Ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: 0,
        }
    }
}

impl Writeable for Reply {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(VERSION);
        w.write_u8(self.code.into());
        w.write_u8(0);
        w.write_u8(self.addr.addr_type().into());
        self.addr.write_onto(w)?;
        w.write_u16(self.port);
        Ok(())
    }
}

impl Readable for Reply {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let ver = r.take_u8()?;
        if ver != VERSION {
            return Err(tor_bytes::Error::InvalidMessage(
                "unsupported SOCKS version in reply".into(),
            ));
        }
        let code = ReplyCode::from(r.take_u8()?);
        let _reserved = r.take_u8()?;
        let atyp = AddrType::from(r.take_u8()?);
        let addr = SocksAddr::decode_body(atyp, r)?;
        let port = r.take_u16()?;
        Ok(Reply { code, addr, port })
    }
}

/// Map a command the server will not perform onto the reply code that
/// should go back to the client, per SPEC_FULL.md §4.8 ("BIND and
/// UDP_ASSOCIATE always reply `CommandNotSupported`").
pub fn reply_code_for_unsupported_command(command: Command) -> Result<(), Error> {
    match command {
        Command::CONNECT | Command::RESOLVE | Command::RESOLVE_PTR => Ok(()),
        _ => Err(Error::CommandNotSupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn greeting_round_trips() {
        let bytes = hex!("05 02 00 02");
        let mut r = Reader::from_slice(&bytes);
        let greeting: Greeting = r.extract().unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(greeting.methods, vec![AuthMethod::NO_AUTH, AuthMethod::USERNAME_PASSWORD]);
    }

    #[test]
    fn method_selection_encodes() {
        let sel = MethodSelection { method: AuthMethod::NO_AUTH };
        let mut v = Vec::new();
        v.write(&sel).unwrap();
        assert_eq!(v, hex!("05 00"));
    }

    #[test]
    fn connect_request_to_ipv4_round_trips() {
        let bytes = hex!("05 01 00 01 7f 00 00 01 00 50");
        let mut r = Reader::from_slice(&bytes);
        let req: Request = r.extract().unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(req.command, Command::CONNECT);
        assert_eq!(req.addr, SocksAddr::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert_eq!(req.port, 80);

        let mut v = Vec::new();
        v.write(&req).unwrap();
        assert_eq!(v, bytes);
    }

    #[test]
    fn connect_request_to_onion_domain_round_trips() {
        let onion = "expyuzz4wqqyqhjn.onion";
        let req = Request {
            command: Command::CONNECT,
            addr: SocksAddr::Domain(onion.to_string()),
            port: 443,
        };
        let mut v = Vec::new();
        v.write(&req).unwrap();

        let mut r = Reader::from_slice(&v);
        let decoded: Request = r.extract().unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn truncated_request_reports_truncated_not_garbage() {
        let bytes = hex!("05 01 00 01 7f 00");
        let mut r = Reader::from_slice(&bytes);
        let err = r.extract::<Request>().unwrap_err();
        assert!(matches!(err, tor_bytes::Error::Truncated { .. }));
    }

    #[test]
    fn bind_and_udp_associate_are_unsupported() {
        assert!(reply_code_for_unsupported_command(Command::BIND).is_err());
        assert!(reply_code_for_unsupported_command(Command::UDP_ASSOCIATE).is_err());
        assert!(reply_code_for_unsupported_command(Command::CONNECT).is_ok());
    }

    #[test]
    fn username_password_does_not_validate_the_password() {
        let bytes = hex!("01 04 75736572 04 70617373");
        let mut r = Reader::from_slice(&bytes);
        let creds: UsernamePassword = r.extract().unwrap();
        assert_eq!(&*creds.username, "user");
        assert_eq!(&*creds.password, "pass");
    }

    #[test]
    fn reply_round_trips() {
        let reply = Reply::new(ReplyCode::SUCCEEDED);
        let mut v = Vec::new();
        v.write(&reply).unwrap();
        let mut r = Reader::from_slice(&v);
        let decoded: Reply = r.extract().unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(decoded, reply);
    }
}
