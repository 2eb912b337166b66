//! Encode and decode the SOCKS5 protocol, as extended in Tor.
//!
//! [`message`] holds the wire types of RFC 1928's greeting/request/reply
//! and RFC 1929's username/password sub-negotiation, plus the two Tor
//! extension commands (`RESOLVE`/`RESOLVE_PTR`); [`handshake`] drives a
//! complete negotiation over an async stream, reading each message's
//! variable-length body the way this workspace's chancell codec reads a
//! cell's; [`err`] holds this crate's error type.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod err;
mod handshake;
mod message;

pub use err::{Error, Result};
pub use handshake::{negotiate, send_reply, Handshake};
pub use message::{
    reply_code_for_unsupported_command, AddrType, AuthMethod, Command, Greeting, MethodSelection,
    Reply, ReplyCode, Request, SocksAddr, UsernamePassword, UsernamePasswordReply,
};
