//! Configuration type definitions for the node secret, role sections,
//! replay guard, TCP options, and logging.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shade_core::TcpOptions;
use shade_crypto::ReplayGuard;

use crate::defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cipher and secret shared by every role.
    #[serde(default)]
    pub node: NodeConfig,
    /// Remote terminator settings (`shade server`).
    pub server: Option<ServerConfig>,
    /// Local agent settings (`shade client`).
    pub client: Option<ClientConfig>,
    /// Intermediate hop settings (`shade jumper`).
    pub jumper: Option<JumperConfig>,
    /// Reverse cascade settings (`shade reverse`).
    pub reverse: Option<ReverseConfig>,
    #[serde(default)]
    pub replay: ReplayConfig,
    /// TCP socket options
    #[serde(default)]
    pub tcp: TcpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cipher method and secret material shared by all roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cipher method name (e.g. "aead_chacha20_poly1305", "aes-256-ctr").
    #[serde(default = "default_cipher")]
    pub cipher: String,
    /// Password, expanded to a key of the right size.
    pub password: Option<String>,
    /// Explicit key, base64url. Takes precedence over `password`.
    pub key: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cipher: default_cipher(),
            password: None,
            key: None,
        }
    }
}

/// Remote terminator listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:8488".
    pub listen: String,
    /// How long an unclaimed parked connection is kept, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: String::new(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Local agent: SOCKS5 front end plus static tunnels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address, flat "host:port" or an ss:// URL.
    pub server: String,
    /// SOCKS5 listen address. Empty disables the SOCKS front end.
    #[serde(default = "default_socks_listen")]
    pub socks_listen: String,
    /// Static tunnels, "local_addr=remote_host:port" pairs.
    #[serde(default)]
    pub tunnels: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            socks_listen: default_socks_listen(),
            tunnels: Vec::new(),
        }
    }
}

/// Intermediate hop: accepts tunnel traffic and re-encrypts it onward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JumperConfig {
    /// Listen address for the previous hop.
    pub listen: String,
    /// Next hop address, flat "host:port" or an ss:// URL.
    pub next_hop: String,
}

/// Reverse cascade claimant: dials out to the server and serves claims
/// for targets reachable from inside.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverseConfig {
    /// Server address to dial, flat "host:port" or an ss:// URL.
    pub server: String,
}

/// Replay guard sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_enabled")]
    pub enabled: bool,
    /// Bloom filter generations kept before the oldest is recycled.
    #[serde(default = "default_replay_generations")]
    pub generations: usize,
    /// Total salt capacity across all generations.
    #[serde(default = "default_replay_capacity")]
    pub capacity: usize,
    /// Bloom filter false positive rate.
    #[serde(default = "default_replay_fpr")]
    pub false_positive_rate: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            enabled: default_replay_enabled(),
            generations: default_replay_generations(),
            capacity: default_replay_capacity(),
            false_positive_rate: default_replay_fpr(),
        }
    }
}

impl ReplayConfig {
    /// Build the guard this configuration describes.
    pub fn build(&self) -> ReplayGuard {
        if self.enabled {
            ReplayGuard::new(self.generations, self.capacity, self.false_positive_rate)
        } else {
            ReplayGuard::disabled()
        }
    }
}

/// TCP socket configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Disable Nagle's algorithm (TCP_NODELAY) for lower latency.
    #[serde(default = "default_tcp_no_delay")]
    pub no_delay: bool,
    /// TCP Keep-Alive interval in seconds (0 = disabled).
    #[serde(default = "default_tcp_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            no_delay: default_tcp_no_delay(),
            keepalive_secs: default_tcp_keepalive_secs(),
        }
    }
}

impl TcpConfig {
    pub fn to_options(&self) -> TcpOptions {
        TcpOptions {
            no_delay: self.no_delay,
            keepalive_secs: self.keepalive_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Log format: json, pretty, or compact. Default: pretty.
    pub format: Option<String>,
    /// Output target: stdout or stderr. Default: stderr.
    pub output: Option<String>,
    /// Per-module log level filters (e.g., {"shade_server": "debug"}).
    #[serde(default)]
    pub filters: HashMap<String, String>,
}
