//! Drive one SOCKS5 negotiation to completion over an async stream.
//!
//! [`message`](crate::message) only knows how to decode a complete,
//! already-buffered message; this module does the actual incremental
//! reads a live connection needs — a fixed-size header first, then
//! whatever variable-length body that header implies — and hands the
//! assembled bytes to [`tor_bytes::Reader`] exactly as
//! [`tor_cell::chancell::codec::ChannelCodec`] hands a length-delimited
//! cell to its own reader.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tor_bytes::{Reader, Writer};

use crate::err::{Error, Result};
use crate::message::{
    reply_code_for_unsupported_command, AddrType, AuthMethod, Command, Greeting, MethodSelection,
    Reply, ReplyCode, Request, UsernamePassword, UsernamePasswordReply,
};

/// The outcome of a completed client greeting and request: what the client
/// wants done, and the credential it authenticated with, if any.
#[derive(Debug)]
pub struct Handshake {
    /// The parsed CONNECT/RESOLVE/RESOLVE_PTR request.
    pub request: Request,
    /// The username/password offered during sub-negotiation, if the client
    /// and server agreed to RFC 1929 authentication.
    pub auth: Option<UsernamePassword>,
}

/// Negotiate a SOCKS5 greeting, optional RFC 1929 authentication, and a
/// request, over `stream`.
///
/// `resolution_available` gates whether [`Command::RESOLVE`] and
/// [`Command::RESOLVE_PTR`] are accepted at all; per SPEC_FULL.md §4.8
/// they are still not actually implemented even when accepted, so callers
/// must reject them after this returns (see
/// [`reply_code_for_unimplemented_resolution`]).
pub async fn negotiate<S>(stream: &mut S, resolution_available: bool) -> Result<Handshake>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = read_greeting(stream).await?;
    let method = select_auth_method(&greeting);
    send(stream, &MethodSelection { method }).await?;
    if method == AuthMethod::NO_ACCEPTABLE_METHOD {
        return Err(Error::NoAcceptableAuthMethod);
    }

    let auth = if method == AuthMethod::USERNAME_PASSWORD {
        Some(run_username_password_auth(stream).await?)
    } else {
        None
    };

    let request = read_request(stream).await?;
    if !resolution_available && matches!(request.command, Command::RESOLVE | Command::RESOLVE_PTR) {
        send(stream, &Reply::new(ReplyCode::GENERAL_FAILURE)).await?;
        return Err(Error::ResolutionNotAvailable);
    }
    if reply_code_for_unsupported_command(request.command).is_err() {
        send(stream, &Reply::new(ReplyCode::COMMAND_NOT_SUPPORTED)).await?;
        return Err(Error::CommandNotSupported);
    }

    Ok(Handshake { request, auth })
}

/// Send `reply` to the client, ending the handshake either way.
pub async fn send_reply<S>(stream: &mut S, reply: &Reply) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    send(stream, reply).await
}

/// Encode `item` and write it onto `stream`.
async fn send<S, W>(stream: &mut S, item: &W) -> Result<()>
where
    S: AsyncWrite + Unpin,
    W: tor_bytes::Writeable,
{
    let mut buf = Vec::new();
    Writer::write(&mut buf, item).map_err(|_| {
        Error::Malformed(tor_bytes::Error::InvalidMessage("failed to encode reply".into()))
    })?;
    stream.write_all(&buf).await?;
    Ok(())
}

/// Read the fixed `ver`/`nmethods` header and then `nmethods` bytes.
async fn read_greeting<S>(stream: &mut S) -> Result<Greeting>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0_u8; 2];
    stream.read_exact(&mut header).await?;
    let nmethods = header[1] as usize;
    let mut body = Vec::with_capacity(2 + nmethods);
    body.extend_from_slice(&header);
    body.resize(2 + nmethods, 0);
    stream.read_exact(&mut body[2..]).await?;

    let mut r = Reader::from_slice(&body);
    let greeting = r.extract()?;
    r.should_be_exhausted()?;
    Ok(greeting)
}

/// Prefer RFC 1929 authentication whenever the client offers it, so that
/// a per-connection credential is always available to isolate on when one
/// is offered; otherwise fall back to no authentication.
fn select_auth_method(greeting: &Greeting) -> AuthMethod {
    if greeting.methods.contains(&AuthMethod::USERNAME_PASSWORD) {
        AuthMethod::USERNAME_PASSWORD
    } else if greeting.methods.contains(&AuthMethod::NO_AUTH) {
        AuthMethod::NO_AUTH
    } else {
        AuthMethod::NO_ACCEPTABLE_METHOD
    }
}

/// Run the RFC 1929 username/password sub-negotiation. The credential is
/// never checked against anything; a reply of success is always sent once
/// it parses, per SPEC_FULL.md §4.8 ("the password is not validated, only
/// used as an isolation key").
async fn run_username_password_auth<S>(stream: &mut S) -> Result<UsernamePassword>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0_u8; 2];
    stream.read_exact(&mut header).await?;
    let ulen = header[1] as usize;
    let mut rest = vec![0_u8; ulen + 1];
    stream.read_exact(&mut rest).await?;
    let plen = rest[ulen] as usize;
    let mut password = vec![0_u8; plen];
    stream.read_exact(&mut password).await?;

    let mut body = Vec::with_capacity(2 + rest.len() + password.len());
    body.extend_from_slice(&header);
    body.extend_from_slice(&rest);
    body.extend_from_slice(&password);

    let mut r = Reader::from_slice(&body);
    let creds: UsernamePassword = r.extract()?;
    r.should_be_exhausted()?;

    send(stream, &UsernamePasswordReply { success: true }).await?;
    Ok(creds)
}

/// Read the fixed `ver`/`cmd`/`rsv`/`atyp` header, then whatever address
/// body and port that header implies.
async fn read_request<S>(stream: &mut S) -> Result<Request>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0_u8; 4];
    stream.read_exact(&mut header).await?;
    let atyp = AddrType::from(header[3]);

    let mut body = Vec::from(header);
    match atyp {
        AddrType::IPV4 => {
            let mut addr = [0_u8; 4];
            stream.read_exact(&mut addr).await?;
            body.extend_from_slice(&addr);
        }
        AddrType::IPV6 => {
            let mut addr = [0_u8; 16];
            stream.read_exact(&mut addr).await?;
            body.extend_from_slice(&addr);
        }
        AddrType::DOMAINNAME => {
            let mut len = [0_u8; 1];
            stream.read_exact(&mut len).await?;
            body.push(len[0]);
            let mut name = vec![0_u8; len[0] as usize];
            stream.read_exact(&mut name).await?;
            body.extend_from_slice(&name);
        }
        _ => {
            return Err(Error::Malformed(tor_bytes::Error::InvalidMessage(
                "unrecognized SOCKS address type".into(),
            )))
        }
    }

    let mut port = [0_u8; 2];
    stream.read_exact(&mut port).await?;
    body.extend_from_slice(&port);

    let mut r = Reader::from_slice(&body);
    let request = r.extract()?;
    r.should_be_exhausted()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SocksAddr;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::duplex;

    #[tokio::test]
    async fn no_auth_connect_negotiates_end_to_end() {
        let (mut client, mut server) = duplex(256);

        let client_task = tokio::spawn(async move {
            let mut greeting = Vec::new();
            Writer::write(&mut greeting, &Greeting { methods: vec![AuthMethod::NO_AUTH] }).unwrap();
            client.write_all(&greeting).await.unwrap();

            let mut selection = [0_u8; 2];
            client.read_exact(&mut selection).await.unwrap();
            assert_eq!(selection, [5, 0]);

            let mut request = Vec::new();
            Writer::write(&mut request, &Request {
                    command: Command::CONNECT,
                    addr: SocksAddr::Ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))),
                    port: 80,
                })
                .unwrap();
            client.write_all(&request).await.unwrap();

            let mut reply = [0_u8; 10];
            client.read_exact(&mut reply).await.unwrap();
            reply
        });

        let handshake = negotiate(&mut server, false).await.unwrap();
        assert_eq!(handshake.request.command, Command::CONNECT);
        assert!(handshake.auth.is_none());
        send_reply(&mut server, &Reply::new(ReplyCode::SUCCEEDED)).await.unwrap();

        let reply_bytes = client_task.await.unwrap();
        assert_eq!(reply_bytes[1], u8::from(ReplyCode::SUCCEEDED));
    }

    #[tokio::test]
    async fn username_password_is_accepted_without_validation() {
        let (mut client, mut server) = duplex(256);

        let client_task = tokio::spawn(async move {
            let mut greeting = Vec::new();
            Writer::write(&mut greeting, &Greeting { methods: vec![AuthMethod::USERNAME_PASSWORD] })
                .unwrap();
            client.write_all(&greeting).await.unwrap();

            let mut selection = [0_u8; 2];
            client.read_exact(&mut selection).await.unwrap();
            assert_eq!(selection[1], u8::from(AuthMethod::USERNAME_PASSWORD));

            client.write_all(&[1, 4, b'u', b's', b'e', b'r', 4, b'p', b'a', b's', b's']).await.unwrap();
            let mut auth_reply = [0_u8; 2];
            client.read_exact(&mut auth_reply).await.unwrap();
            assert_eq!(auth_reply, [1, 0]);

            let mut request = Vec::new();
            Writer::write(&mut request, &Request {
                    command: Command::CONNECT,
                    addr: SocksAddr::Domain("example.com".to_string()),
                    port: 443,
                })
                .unwrap();
            client.write_all(&request).await.unwrap();
        });

        let handshake = negotiate(&mut server, false).await.unwrap();
        let auth = handshake.auth.expect("auth was negotiated");
        assert_eq!(&*auth.username, "user");
        assert_eq!(&*auth.password, "pass");

        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn bind_command_is_rejected() {
        let (mut client, mut server) = duplex(256);

        let client_task = tokio::spawn(async move {
            let mut greeting = Vec::new();
            Writer::write(&mut greeting, &Greeting { methods: vec![AuthMethod::NO_AUTH] }).unwrap();
            client.write_all(&greeting).await.unwrap();
            let mut selection = [0_u8; 2];
            client.read_exact(&mut selection).await.unwrap();

            let mut request = Vec::new();
            Writer::write(&mut request, &Request {
                    command: Command::BIND,
                    addr: SocksAddr::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                    port: 1,
                })
                .unwrap();
            client.write_all(&request).await.unwrap();

            let mut reply = [0_u8; 10];
            client.read_exact(&mut reply).await.unwrap();
            reply
        });

        let err = negotiate(&mut server, false).await.unwrap_err();
        assert!(matches!(err, Error::CommandNotSupported));

        let reply_bytes = client_task.await.unwrap();
        assert_eq!(reply_bytes[1], u8::from(ReplyCode::COMMAND_NOT_SUPPORTED));
    }
}
