//! Low-level UDP socket operations and the query exchange seam

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::trace;

use crate::message::{DecodeError, EncodeError, Message, Qr, MESSAGE_LIMIT};

/// Represents a socket transmitting DNS messages.
pub struct DnsSocket {
    sock: UdpSocket,
}

impl DnsSocket {
    /// Returns a `DnsSocket` bound to an ephemeral port of the unspecified
    /// address in the same family as `peer`.
    pub fn for_peer(peer: &SocketAddr) -> io::Result<DnsSocket> {
        let local = match *peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        DnsSocket::bind(local)
    }

    /// Returns a `DnsSocket`, bound to the given address.
    pub fn bind(addr: SocketAddr) -> io::Result<DnsSocket> {
        Ok(DnsSocket { sock: UdpSocket::bind(addr)? })
    }

    /// Sends a message to the given address.
    pub fn send_message(&self, message: &Message, addr: &SocketAddr) -> Result<(), Error> {
        let mut buf = [0; MESSAGE_LIMIT];
        let data = message.encode(&mut buf)?;
        self.sock.send_to(data, addr)?;
        Ok(())
    }

    /// Attempts to read a DNS message. The message will only be decoded if the
    /// remote address matches `addr`. If a packet is received from a non-matching
    /// address, the message is not decoded and `Ok(None)` is returned.
    pub fn recv_message(&self, addr: &SocketAddr) -> Result<Option<Message>, Error> {
        let mut buf = [0; MESSAGE_LIMIT];
        let (n, recv_addr) = self.sock.recv_from(&mut buf)?;
        if !addresses_match(&recv_addr, addr) {
            return Ok(None);
        }
        Ok(Some(Message::decode(&buf[..n])?))
    }

    /// Sends `query` to `server` and waits up to `timeout` in total for the
    /// matching response. Packets from other addresses or with another ID are
    /// discarded without resetting the clock.
    pub fn exchange(&self, query: &Message, server: &SocketAddr, timeout: Duration)
            -> Result<Message, Error> {
        self.send_message(query, server)?;
        let deadline = Instant::now() + timeout;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(Error::Timeout(*server));
            }
            self.sock.set_read_timeout(Some(left))?;

            match self.recv_message(server) {
                Ok(Some(msg)) => {
                    if msg.header.id == query.header.id && msg.header.qr == Qr::Response {
                        return Ok(msg);
                    }
                    trace!("discarding unrelated message id {} from {}", msg.header.id, server);
                }
                Ok(None) => (),
                Err(ref e) if e.is_timeout() => return Err(Error::Timeout(*server)),
                // A garbled datagram is not the end of the exchange
                Err(Error::Decode(e)) => trace!("discarding undecodable message from {}: {}", server, e),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Represents an error in sending or receiving a DNS message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The response could not be decoded
    #[error("error decoding message: {0}")]
    Decode(#[from] DecodeError),
    /// The query could not be encoded
    #[error("error encoding message: {0}")]
    Encode(#[from] EncodeError),
    /// No matching response arrived in time
    #[error("timed out waiting for response from {0}")]
    Timeout(SocketAddr),
    /// Socket failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns whether the error is a read timeout.
    pub fn is_timeout(&self) -> bool {
        match *self {
            Error::Timeout(_) => true,
            Error::Io(ref e) => matches!(e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
            _ => false,
        }
    }
}

/// Performs one query/response round trip with a name server.
pub trait Exchange {
    /// Sends `query` to `server` and returns its response, whatever the
    /// response code.
    fn exchange(&self, query: &Message, server: &SocketAddr) -> Result<Message, Error>;
}

/// `Exchange` over plain UDP, opening a fresh socket for each query.
#[derive(Copy, Clone, Debug)]
pub struct UdpExchange {
    /// Time allowed for a response to arrive
    pub timeout: Duration,
}

impl UdpExchange {
    /// Returns a `UdpExchange` waiting at most `timeout` per query.
    pub fn new(timeout: Duration) -> UdpExchange {
        UdpExchange { timeout }
    }
}

impl Exchange for UdpExchange {
    fn exchange(&self, query: &Message, server: &SocketAddr) -> Result<Message, Error> {
        let sock = DnsSocket::for_peer(server)?;
        sock.exchange(query, server, self.timeout)
    }
}

/// Compares two `SocketAddr`s, checking for IPv4-in-IPv6 addresses
fn addresses_match(a: &SocketAddr, b: &SocketAddr) -> bool {
    match (*a, *b) {
        // Simple comparisons; (V4 == V4) or (V6 == V6)
        (SocketAddr::V4(ref a), SocketAddr::V4(ref b)) => a == b,
        (SocketAddr::V6(ref a), SocketAddr::V6(ref b)) => a == b,
        // Not-so-simple comparison; V4 == maybe-V6-wrapped-V4
        (SocketAddr::V6(ref a), SocketAddr::V4(ref b)) => {
            match a.ip().to_ipv4_mapped() {
                Some(ref a4) => a4 == b.ip() && a.port() == b.port(),
                None => false,
            }
        }
        (SocketAddr::V4(..), SocketAddr::V6(..)) => addresses_match(b, a),
    }
}
