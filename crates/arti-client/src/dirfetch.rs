//! A minimal [`ConsensusFetcher`] that dials a fallback directory's
//! directory port directly and issues a plain HTTP GET.
//!
//! Real Tor's first consensus fetch (before any circuit exists to relay
//! the request anonymously) goes straight to a directory cache's DirPort
//! over plain HTTP, exactly as this does; every later refresh happens the
//! same way in the teacher's own bootstrap path before `tor-dirmgr` takes
//! over. `tor-netdir`'s `dirclient` module already defines the seam
//! ([`ConsensusFetcher`]) and the parsing/staleness policy around it; this
//! module is the transport side of that seam, kept deliberately small
//! since relaying this fetch anonymously through a circuit is out of
//! scope for a client's very first directory fetch.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tor_netdir::{ConsensusFetcher, Error, FallbackDir};

/// How long to wait for a TCP connection and the whole HTTP response.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a consensus document over plain HTTP from a fallback
/// directory's address.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConsensusFetcher;

impl ConsensusFetcher for TcpConsensusFetcher {
    fn fetch_consensus(&self, fallback: &FallbackDir) -> Result<String, Error> {
        fetch(fallback).map_err(|err| {
            tracing::debug!(addr = %fallback.addr, %err, "consensus fetch failed");
            Error::DirFetchFailed
        })
    }
}

/// Perform the actual blocking GET; collapsed to `std::io::Error` since
/// the caller only distinguishes "succeeded" from "try the next
/// fallback".
fn fetch(fallback: &FallbackDir) -> std::io::Result<String> {
    let mut stream = TcpStream::connect_timeout(&fallback.addr, FETCH_TIMEOUT)?;
    stream.set_read_timeout(Some(FETCH_TIMEOUT))?;
    stream.set_write_timeout(Some(FETCH_TIMEOUT))?;

    let request = format!(
        "GET /tor/status-vote/current/consensus HTTP/1.0\r\nHost: {}\r\n\r\n",
        fallback.addr.ip()
    );
    stream.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let response = String::from_utf8_lossy(&response);

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or(&response);
    Ok(body.to_string())
}
