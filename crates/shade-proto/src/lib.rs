//! Tunnel greeting wire format.
//!
//! Every proxied connection opens with a greeting inside the encrypted
//! stream. A plain target greeting is a SOCKS-style address: one atyp
//! byte, the host encoding, and a big-endian port. Two marker bits widen
//! the scheme for cascade mode:
//!
//! * [`MARKER_COMMAND`] as the whole first byte announces a command
//!   channel; nothing follows.
//! * [`MARKER_CLAIM`] OR-ed into the atyp marks the address as a claim
//!   for a parked connection rather than a dial target.
//!
//! Parsing is incremental: [`parse_greeting`] reports how many total
//! bytes it needs when the buffer is short, so callers can read from the
//! wire without framing.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Single-byte greeting announcing a command channel.
pub const MARKER_COMMAND: u8 = 0x80;
/// Atyp flag bit marking an address as a parked-connection claim.
pub const MARKER_CLAIM: u8 = 0x40;

pub const MAX_DOMAIN_LEN: usize = 255;
/// Largest possible greeting: atyp, length byte, 255 domain bytes, port.
pub const MAX_GREETING_LEN: usize = 4 + MAX_DOMAIN_LEN;

/// Why a buffer failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    InvalidAtyp(u8),
    InvalidDomainLen,
    InvalidUtf8,
}

/// Outcome of parsing a (possibly short) buffer.
///
/// `Incomplete(n)` asks the caller to retry once the buffer holds at
/// least `n` bytes in total. `n` is a lower bound; the retry may report a
/// larger one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(ParseError),
}

/// A proxied connection's destination host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

/// Host and port, as carried in greetings and used as the parked
/// connection cache key via its `Display` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: Host,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{}:{}", ip, self.port),
            Host::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            Host::Domain(d) => write!(f, "{}:{}", d, self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAddress;

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid host:port address")
    }
}

impl std::error::Error for InvalidAddress {}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(sock) = SocketAddr::from_str(s) {
            let host = match sock {
                SocketAddr::V4(v4) => Host::Ipv4(*v4.ip()),
                SocketAddr::V6(v6) => Host::Ipv6(*v6.ip()),
            };
            return Ok(Address {
                host,
                port: sock.port(),
            });
        }
        let (host, port) = s.rsplit_once(':').ok_or(InvalidAddress)?;
        if host.is_empty() || host.len() > MAX_DOMAIN_LEN {
            return Err(InvalidAddress);
        }
        let port = port.parse::<u16>().map_err(|_| InvalidAddress)?;
        Ok(Address {
            host: Host::Domain(host.to_string()),
            port,
        })
    }
}

/// The first thing a connection says after the cipher handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Greeting {
    /// Dial this address and relay.
    Target(Address),
    /// Hand over the connection parked under this address.
    Claim(Address),
    /// Park this connection as the node's command channel.
    Command,
}

/// Atyp byte for a host, without marker bits.
pub fn address_atyp(host: &Host) -> u8 {
    match host {
        Host::Ipv4(_) => ATYP_IPV4,
        Host::Domain(_) => ATYP_DOMAIN,
        Host::Ipv6(_) => ATYP_IPV6,
    }
}

fn parse_host(atyp: u8, rest: &[u8]) -> ParseResult<(Address, usize)> {
    match atyp {
        ATYP_IPV4 => {
            if rest.len() < 6 {
                return ParseResult::Incomplete(6);
            }
            let ip = Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
            let port = u16::from_be_bytes([rest[4], rest[5]]);
            ParseResult::Complete((
                Address {
                    host: Host::Ipv4(ip),
                    port,
                },
                6,
            ))
        }
        ATYP_IPV6 => {
            if rest.len() < 18 {
                return ParseResult::Incomplete(18);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&rest[..16]);
            let port = u16::from_be_bytes([rest[16], rest[17]]);
            ParseResult::Complete((
                Address {
                    host: Host::Ipv6(Ipv6Addr::from(octets)),
                    port,
                },
                18,
            ))
        }
        ATYP_DOMAIN => {
            if rest.is_empty() {
                return ParseResult::Incomplete(2);
            }
            let len = rest[0] as usize;
            if len == 0 {
                return ParseResult::Invalid(ParseError::InvalidDomainLen);
            }
            let total = 1 + len + 2;
            if rest.len() < total {
                return ParseResult::Incomplete(total);
            }
            let domain = match std::str::from_utf8(&rest[1..1 + len]) {
                Ok(s) => s.to_string(),
                Err(_) => return ParseResult::Invalid(ParseError::InvalidUtf8),
            };
            let port = u16::from_be_bytes([rest[1 + len], rest[2 + len]]);
            ParseResult::Complete((
                Address {
                    host: Host::Domain(domain),
                    port,
                },
                total,
            ))
        }
        other => ParseResult::Invalid(ParseError::InvalidAtyp(other)),
    }
}

/// Parse a bare address (no marker bits) from the front of `buf`.
///
/// On success returns the address and the number of bytes consumed.
pub fn parse_address(buf: &[u8]) -> ParseResult<(Address, usize)> {
    let Some(&atyp) = buf.first() else {
        return ParseResult::Incomplete(1);
    };
    match parse_host(atyp, &buf[1..]) {
        ParseResult::Complete((addr, used)) => ParseResult::Complete((addr, used + 1)),
        ParseResult::Incomplete(need) => ParseResult::Incomplete(need + 1),
        ParseResult::Invalid(err) => ParseResult::Invalid(err),
    }
}

/// Parse a greeting from the front of `buf`.
///
/// On success returns the greeting and the number of bytes consumed;
/// trailing bytes belong to the proxied stream.
pub fn parse_greeting(buf: &[u8]) -> ParseResult<(Greeting, usize)> {
    let Some(&first) = buf.first() else {
        return ParseResult::Incomplete(1);
    };
    if first == MARKER_COMMAND {
        return ParseResult::Complete((Greeting::Command, 1));
    }
    let claim = first & MARKER_CLAIM != 0;
    let atyp = if claim { first & !MARKER_CLAIM } else { first };
    match parse_host(atyp, &buf[1..]) {
        ParseResult::Complete((addr, used)) => {
            let greeting = if claim {
                Greeting::Claim(addr)
            } else {
                Greeting::Target(addr)
            };
            ParseResult::Complete((greeting, used + 1))
        }
        ParseResult::Incomplete(need) => ParseResult::Incomplete(need + 1),
        ParseResult::Invalid(err) => ParseResult::Invalid(err),
    }
}

fn write_host(buf: &mut BytesMut, addr: &Address) {
    match &addr.host {
        Host::Ipv4(ip) => buf.put_slice(&ip.octets()),
        Host::Ipv6(ip) => buf.put_slice(&ip.octets()),
        Host::Domain(d) => {
            debug_assert!(d.len() <= MAX_DOMAIN_LEN);
            buf.put_u8(d.len() as u8);
            buf.put_slice(d.as_bytes());
        }
    }
    buf.put_u16(addr.port);
}

/// Append a bare address. Domains longer than [`MAX_DOMAIN_LEN`] bytes
/// are not representable; callers validate before writing.
pub fn write_address(buf: &mut BytesMut, addr: &Address) {
    buf.put_u8(address_atyp(&addr.host));
    write_host(buf, addr);
}

/// Append a greeting, marker bits included.
pub fn write_greeting(buf: &mut BytesMut, greeting: &Greeting) {
    match greeting {
        Greeting::Target(addr) => write_address(buf, addr),
        Greeting::Claim(addr) => {
            buf.put_u8(address_atyp(&addr.host) | MARKER_CLAIM);
            write_host(buf, addr);
        }
        Greeting::Command => buf.put_u8(MARKER_COMMAND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn encode(greeting: &Greeting) -> BytesMut {
        let mut buf = BytesMut::new();
        write_greeting(&mut buf, greeting);
        buf
    }

    #[test]
    fn ipv4_target_round_trips() {
        let greeting = Greeting::Target(addr("10.1.2.3:8080"));
        let wire = encode(&greeting);
        assert_eq!(wire[0], ATYP_IPV4);
        assert_eq!(wire.len(), 7);
        assert_eq!(
            parse_greeting(&wire),
            ParseResult::Complete((greeting, 7))
        );
    }

    #[test]
    fn ipv6_target_round_trips() {
        let greeting = Greeting::Target(addr("[2001:db8::1]:443"));
        let wire = encode(&greeting);
        assert_eq!(wire[0], ATYP_IPV6);
        assert_eq!(wire.len(), 19);
        assert_eq!(
            parse_greeting(&wire),
            ParseResult::Complete((greeting, 19))
        );
    }

    #[test]
    fn domain_target_round_trips() {
        let greeting = Greeting::Target(addr("example.com:80"));
        let wire = encode(&greeting);
        assert_eq!(wire[0], ATYP_DOMAIN);
        assert_eq!(wire[1], 11);
        assert_eq!(wire.len(), 1 + 1 + 11 + 2);
        assert_eq!(
            parse_greeting(&wire),
            ParseResult::Complete((greeting, wire.len()))
        );
    }

    #[test]
    fn claim_sets_the_marker_bit() {
        let greeting = Greeting::Claim(addr("example.com:80"));
        let wire = encode(&greeting);
        assert_eq!(wire[0], ATYP_DOMAIN | MARKER_CLAIM);
        assert_eq!(
            parse_greeting(&wire),
            ParseResult::Complete((greeting, wire.len()))
        );
    }

    #[test]
    fn command_is_a_single_byte() {
        let wire = encode(&Greeting::Command);
        assert_eq!(&wire[..], &[MARKER_COMMAND]);
        assert_eq!(
            parse_greeting(&wire),
            ParseResult::Complete((Greeting::Command, 1))
        );
    }

    #[test]
    fn trailing_bytes_are_left_alone() {
        let mut wire = encode(&Greeting::Target(addr("10.0.0.1:9000")));
        wire.put_slice(b"payload after the greeting");
        match parse_greeting(&wire) {
            ParseResult::Complete((Greeting::Target(a), consumed)) => {
                assert_eq!(a, addr("10.0.0.1:9000"));
                assert_eq!(consumed, 7);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncated_buffers_report_needed_length() {
        let wire = encode(&Greeting::Target(addr("example.com:80")));
        assert_eq!(parse_greeting(&[]), ParseResult::Incomplete(1));
        for cut in 1..wire.len() {
            match parse_greeting(&wire[..cut]) {
                ParseResult::Incomplete(need) => {
                    assert!(need > cut, "need {need} should exceed cut {cut}");
                    assert!(need <= wire.len());
                }
                other => panic!("cut {cut}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn truncated_claim_reports_needed_length() {
        let wire = encode(&Greeting::Claim(addr("[2001:db8::1]:443")));
        match parse_greeting(&wire[..5]) {
            ParseResult::Incomplete(need) => assert_eq!(need, 19),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_atyp_is_invalid() {
        assert_eq!(
            parse_greeting(&[0x05, 0, 0, 0, 0, 0, 0]),
            ParseResult::Invalid(ParseError::InvalidAtyp(0x05))
        );
        // A claim marker over an unknown atyp is still invalid.
        assert_eq!(
            parse_greeting(&[MARKER_CLAIM | 0x05, 0, 0]),
            ParseResult::Invalid(ParseError::InvalidAtyp(0x05))
        );
    }

    #[test]
    fn zero_length_domain_is_invalid() {
        assert_eq!(
            parse_greeting(&[ATYP_DOMAIN, 0x00, 0x1f, 0x90]),
            ParseResult::Invalid(ParseError::InvalidDomainLen)
        );
    }

    #[test]
    fn non_utf8_domain_is_invalid() {
        assert_eq!(
            parse_greeting(&[ATYP_DOMAIN, 0x02, 0xff, 0xfe, 0x1f, 0x90]),
            ParseResult::Invalid(ParseError::InvalidUtf8)
        );
    }

    #[test]
    fn display_and_parse_agree() {
        for text in ["1.2.3.4:80", "[::1]:8080", "example.com:443"] {
            assert_eq!(addr(text).to_string(), text);
        }
    }

    #[test]
    fn address_from_str_rejects_garbage() {
        for text in ["", "no-port", ":80", "host:", "host:notaport", "host:70000"] {
            assert!(text.parse::<Address>().is_err(), "accepted {text:?}");
        }
    }

    #[test]
    fn longest_greeting_fits_the_bound() {
        let greeting = Greeting::Target(Address {
            host: Host::Domain("x".repeat(MAX_DOMAIN_LEN)),
            port: 1,
        });
        let wire = encode(&greeting);
        assert_eq!(wire.len(), MAX_GREETING_LEN);
        assert_eq!(
            parse_greeting(&wire),
            ParseResult::Complete((greeting, MAX_GREETING_LEN))
        );
    }
}
