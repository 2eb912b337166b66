//! The SOCKS5 front end: accepts local TCP connections, negotiates a
//! request via [`tor_socksproto`], and relays bytes over a stream opened
//! on a circuit drawn from the client's circuit pool.
//!
//! Grounded on the shape of the teacher's `arti/src/proxy/socks.rs`
//! per-connection handler (negotiate, open a stream, reply, then pump
//! bytes until either side closes), adapted to this workspace's
//! `tor_socksproto::negotiate`/[`tor_proto::stream::DataStream`] instead of
//! the teacher's own types. [`DataStream`] has no `AsyncRead`/`AsyncWrite`
//! impl to hand to `tokio::io::copy_bidirectional`, so [`pump`] drives both
//! directions itself with `tokio::select!` instead of two separate tasks.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tor_proto::stream::DataStream;
use tor_socksproto::{negotiate, send_reply, Command, Reply, ReplyCode, SocksAddr};

use crate::address::{DangerouslyIntoTorAddr, IntoTorAddr, TorAddr, TorAddrError};
use crate::client::TorClient;
use crate::err::Error;

/// How many candidate ports [`serve`] tries, starting at the configured
/// `socks_port`, before giving up.
const PORT_PROBE_ATTEMPTS: u16 = 16;

/// Bind a SOCKS5 listener for `client`, probing successive ports if the
/// configured one is occupied, and spawn its accept loop in the
/// background.
///
/// Returns the address actually bound, per SPEC_FULL.md §4.9's
/// `ProxyAddr()`.
pub async fn serve(client: TorClient) -> io::Result<SocketAddr> {
    let configured_port = client.config().socks_port;
    let listener = bind_with_port_probing(configured_port).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "SOCKS5 listener bound");

    let max_connections = client.config().conn_limit;
    let active = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(%e, "SOCKS5 accept failed");
                    continue;
                }
            };

            if max_connections != 0 && active.load(Ordering::SeqCst) >= max_connections {
                tracing::debug!(%peer, "SOCKS5 connection limit reached, dropping connection");
                continue;
            }

            active.fetch_add(1, Ordering::SeqCst);
            let client = client.clone();
            let active = active.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(client, stream, peer).await {
                    tracing::debug!(%peer, %e, "SOCKS5 connection ended with an error");
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    Ok(addr)
}

/// Bind `configured_port`, or — if it is already in use — the next
/// `PORT_PROBE_ATTEMPTS - 1` ports above it.
///
/// `configured_port == 0` asks the OS to auto-pick, so there is nothing to
/// probe in that case.
async fn bind_with_port_probing(configured_port: u16) -> io::Result<TcpListener> {
    let mut last_err = None;
    let candidates: Vec<u16> = if configured_port == 0 {
        vec![0]
    } else {
        (configured_port..configured_port.saturating_add(PORT_PROBE_ATTEMPTS)).collect()
    };

    for port in candidates {
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                tracing::debug!(port, %e, "SOCKS5 port probe failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no candidate SOCKS5 port available")))
}

/// Negotiate and serve one SOCKS5 connection to completion.
async fn handle_connection(
    client: TorClient,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> tor_socksproto::Result<()> {
    let resolution_available = client.config().enable_dns_resolution;
    let handshake = negotiate(&mut stream, resolution_available).await?;

    if matches!(handshake.request.command, Command::RESOLVE | Command::RESOLVE_PTR) {
        // Negotiation accepts these when DNS-via-Tor is enabled, but the
        // RELAY_RESOLVE cell exchange itself is not implemented (an open
        // question carried forward rather than resolved); every accepted
        // resolution request still ends in GeneralFailure.
        send_reply(&mut stream, &Reply::new(ReplyCode::GENERAL_FAILURE)).await?;
        return Ok(());
    }

    let target = match target_addr(&handshake.request.addr, handshake.request.port) {
        Ok(target) => target,
        Err(_) => {
            send_reply(&mut stream, &Reply::new(ReplyCode::ADDRESS_TYPE_NOT_SUPPORTED)).await?;
            return Ok(());
        }
    };

    if target.is_onion_address() {
        send_reply(&mut stream, &Reply::new(ReplyCode::HOST_UNREACHABLE)).await?;
        return Ok(());
    }

    let credential = handshake
        .auth
        .as_ref()
        .map(|auth| auth.username.as_str().to_string());
    let key = client.isolation_key(&target, credential.as_deref(), Some(peer.port()));

    let data_stream = match client.connect_with_isolation(target, key).await {
        Ok(data_stream) => data_stream,
        Err(e) => {
            tracing::debug!(%peer, %e, "failed to open circuit stream for SOCKS5 client");
            send_reply(&mut stream, &Reply::new(reply_code_for(&e))).await?;
            return Ok(());
        }
    };

    send_reply(&mut stream, &Reply::new(ReplyCode::SUCCEEDED)).await?;
    pump(stream, data_stream).await;
    Ok(())
}

/// Build a [`TorAddr`] from a decoded SOCKS5 request's address and port.
///
/// A literal IP goes through [`DangerouslyIntoTorAddr`], since it reached
/// this proxy already resolved by whatever local process dialed it; a
/// domain name goes through the ordinary [`IntoTorAddr`] path so
/// resolution happens on the exit relay's side.
fn target_addr(addr: &SocksAddr, port: u16) -> Result<TorAddr, TorAddrError> {
    match addr {
        SocksAddr::Ip(ip) => (*ip, port).into_tor_addr_dangerously(),
        SocksAddr::Domain(host) => (host.clone(), port).into_tor_addr(),
        _ => unreachable!("SocksAddr has no variants beyond Ip and Domain"),
    }
}

/// Map a failure to open a circuit stream onto the nearest SOCKS5 reply
/// code, per SPEC_FULL.md §7's "unreachable target" row.
fn reply_code_for(err: &Error) -> ReplyCode {
    match err {
        Error::OnionServiceNotSupported => ReplyCode::HOST_UNREACHABLE,
        Error::Address(_) => ReplyCode::ADDRESS_TYPE_NOT_SUPPORTED,
        Error::NotBootstrapped
        | Error::Guard(_)
        | Error::Directory(_)
        | Error::Circuit(_)
        | Error::Stream(_)
        | Error::Bootstrap(_)
        | Error::Io(_)
        | Error::Config(_)
        | Error::Socks(_) => ReplyCode::GENERAL_FAILURE,
    }
}

/// Relay bytes between `tcp` and `data_stream` until either side closes,
/// then send `RELAY_END` and drop the local socket.
///
/// A single task alternates between the two directions with
/// `tokio::select!` rather than splitting across two tasks, since
/// [`DataStream`]'s `read`/`write_all` both take `&mut self` and cannot be
/// driven concurrently from two owners.
async fn pump(tcp: TcpStream, mut data_stream: DataStream) {
    let (mut tcp_read, mut tcp_write) = tcp.into_split();
    let mut buf = [0_u8; 4096];
    loop {
        tokio::select! {
            result = tcp_read.read(&mut buf) => {
                match result {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if data_stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            result = data_stream.read() => {
                match result {
                    Ok(data) if data.is_empty() => break,
                    Ok(data) => {
                        if tcp_write.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
    let _ = data_stream.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn ip_targets_use_the_dangerous_conversion() {
        let target = target_addr(&SocksAddr::Ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))), 80).unwrap();
        assert_eq!(target.host(), "93.184.216.34");
        assert_eq!(target.port(), 80);
    }

    #[test]
    fn domain_targets_are_recognized_as_onion_when_applicable() {
        let target = target_addr(&SocksAddr::Domain("abc.onion".to_string()), 80).unwrap();
        assert!(target.is_onion_address());
    }

    #[tokio::test]
    async fn port_probing_finds_a_free_port_when_the_first_choice_is_taken() {
        let blocker = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken_port = blocker.local_addr().unwrap().port();

        let listener = bind_with_port_probing(taken_port).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), taken_port);
    }

    #[test]
    fn reply_code_for_onion_is_host_unreachable() {
        assert_eq!(
            reply_code_for(&Error::OnionServiceNotSupported),
            ReplyCode::HOST_UNREACHABLE
        );
    }
}
