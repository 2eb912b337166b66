//! Types for converting objects into addresses a [`TorClient`](crate::TorClient)
//! can connect to.
//!
//! Grounded on the teacher's `arti-client/src/address.rs` split between
//! [`IntoTorAddr`] (hostnames, which it's safe to resolve on the far side
//! of the network) and [`DangerouslyIntoTorAddr`] (IP addresses, which a
//! caller most likely obtained via a local, traffic-leaking DNS lookup).
//! The teacher's `.onion` parsing (`tor_hscrypto::pk::HsId`) is dropped
//! entirely: onion-service hosting and client connection are both outside
//! this core's scope, so a `.onion` hostname is recognized only well
//! enough to be rejected, per SPEC_FULL.md §4.8.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// The suffix that marks a hostname as a hidden-service address.
pub const ONION_SUFFIX: &str = ".onion";

/// An object that can be converted to a [`TorAddr`] with a minimum of risk.
///
/// Implement this for hostnames and similar name-based addressing; do not
/// implement it for IP addresses (see [`DangerouslyIntoTorAddr`] instead).
pub trait IntoTorAddr {
    /// Try to make a [`TorAddr`] to represent connecting to this address.
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError>;
}

/// An object that can be converted to a [`TorAddr`], but which may leak
/// the target address to a local resolver if it wasn't obtained safely.
pub trait DangerouslyIntoTorAddr {
    /// Try to make a [`TorAddr`] to represent connecting to `self`.
    ///
    /// By calling this, the caller asserts that `self` was not obtained
    /// from a local DNS lookup.
    fn into_tor_addr_dangerously(self) -> Result<TorAddr, TorAddrError>;
}

/// A validated `host:port` pair to connect to over the Tor network.
///
/// DNS resolution (if any) happens on the exit relay's side, not locally:
/// this type exists so a hostname can travel all the way to the circuit
/// layer as a string rather than being resolved too early.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TorAddr {
    host: String,
    port: u16,
}

impl TorAddr {
    /// The hostname or IP address literal half of this address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port half of this address.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True if this address names a hidden service.
    pub fn is_onion_address(&self) -> bool {
        self.host.ends_with(ONION_SUFFIX)
    }

    fn new(host: String, port: u16) -> Result<Self, TorAddrError> {
        if host.is_empty() {
            return Err(TorAddrError::InvalidHostname);
        }
        if port == 0 {
            return Err(TorAddrError::BadPort);
        }
        Ok(TorAddr { host, port })
    }
}

impl fmt::Display for TorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An address could not be turned into a [`TorAddr`].
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum TorAddrError {
    /// The hostname half was empty or otherwise not a valid name.
    #[error("invalid hostname")]
    InvalidHostname,
    /// No `:port` was present, and none was implied.
    #[error("no port given")]
    NoPort,
    /// The port was `0`, which Tor cannot dial.
    #[error("invalid port")]
    BadPort,
}

impl IntoTorAddr for TorAddr {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        Ok(self)
    }
}

impl IntoTorAddr for &str {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        let (host, port) = self.rsplit_once(':').ok_or(TorAddrError::NoPort)?;
        let port: u16 = port.parse().map_err(|_| TorAddrError::BadPort)?;
        TorAddr::new(host.to_string(), port)
    }
}

impl IntoTorAddr for (&str, u16) {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::new(self.0.to_string(), self.1)
    }
}

impl IntoTorAddr for (String, u16) {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::new(self.0, self.1)
    }
}

impl DangerouslyIntoTorAddr for SocketAddr {
    fn into_tor_addr_dangerously(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::new(self.ip().to_string(), self.port())
    }
}

impl DangerouslyIntoTorAddr for (IpAddr, u16) {
    fn into_tor_addr_dangerously(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::new(self.0.to_string(), self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let addr = "example.com:443".into_tor_addr().unwrap();
        assert_eq!(addr.host(), "example.com");
        assert_eq!(addr.port(), 443);
    }

    #[test]
    fn missing_port_is_an_error() {
        assert_eq!("example.com".into_tor_addr().unwrap_err(), TorAddrError::NoPort);
    }

    #[test]
    fn zero_port_is_rejected() {
        assert_eq!("example.com:0".into_tor_addr().unwrap_err(), TorAddrError::BadPort);
    }

    #[test]
    fn onion_hostnames_are_recognized() {
        let addr = "expyuzz4wqqyqhjn.onion:80".into_tor_addr().unwrap();
        assert!(addr.is_onion_address());
    }

    #[test]
    fn dangerous_socket_addr_round_trips() {
        let sock: SocketAddr = "192.0.2.1:9001".parse().unwrap();
        let addr = sock.into_tor_addr_dangerously().unwrap();
        assert_eq!(addr.host(), "192.0.2.1");
        assert_eq!(addr.port(), 9001);
    }
}
