//! TCP socket options and outbound dialing.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use shade_proto::{Address, Host};

use crate::defaults::{DEFAULT_TCP_KEEPALIVE_SECS, DEFAULT_TCP_NO_DELAY};

/// Socket options applied to every accepted and dialed connection.
#[derive(Debug, Clone, Copy)]
pub struct TcpOptions {
    pub no_delay: bool,
    /// Keep-alive probe interval in seconds; 0 disables keep-alive.
    pub keepalive_secs: u64,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            no_delay: DEFAULT_TCP_NO_DELAY,
            keepalive_secs: DEFAULT_TCP_KEEPALIVE_SECS,
        }
    }
}

pub fn apply_tcp_options(stream: &TcpStream, options: &TcpOptions) -> io::Result<()> {
    stream.set_nodelay(options.no_delay)?;
    if options.keepalive_secs > 0 {
        let keepalive =
            TcpKeepalive::new().with_time(Duration::from_secs(options.keepalive_secs));
        SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    }
    Ok(())
}

/// Dial a proxied destination. Domains resolve through the system
/// resolver.
pub async fn dial(addr: &Address) -> io::Result<TcpStream> {
    match &addr.host {
        Host::Ipv4(ip) => TcpStream::connect(SocketAddr::new((*ip).into(), addr.port)).await,
        Host::Ipv6(ip) => TcpStream::connect(SocketAddr::new((*ip).into(), addr.port)).await,
        Host::Domain(domain) => TcpStream::connect((domain.as_str(), addr.port)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dials_ipv4_addresses_and_applies_options() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let addr = Address::from_str(&format!("127.0.0.1:{port}")).unwrap();
        let stream = dial(&addr).await.unwrap();
        apply_tcp_options(&stream, &TcpOptions::default()).unwrap();

        let (_peer, _) = listener.accept().await.unwrap();
    }

    #[tokio::test]
    async fn keepalive_zero_skips_the_socket_option() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let addr = Address::from_str(&format!("127.0.0.1:{port}")).unwrap();
        let stream = dial(&addr).await.unwrap();
        let options = TcpOptions {
            no_delay: false,
            keepalive_secs: 0,
        };
        apply_tcp_options(&stream, &options).unwrap();
    }
}
