//! # shade-rs
//!
//! A Shadowsocks-compatible encrypted TCP tunnel.
//!
//! The workspace splits along the protocol's layers:
//!
//! - [`shade_crypto`] - cipher suites, key derivation, replay guard
//! - [`shade_proto`] - greeting and address wire format
//! - [`shade_core`] - cipher stream, header coalescing, relay engine
//! - [`shade_config`] - configuration loading and validation
//! - [`shade_client`] - local agent (SOCKS5 front end, static tunnels)
//! - [`shade_server`] - remote terminator, jumper, reverse claimant

pub use shade_client as client;
pub use shade_config as config;
pub use shade_core as core;
pub use shade_crypto as crypto;
pub use shade_proto as proto;
pub use shade_server as server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use shade_client::ClientError;
    pub use shade_config::{Config, load_config};
    pub use shade_crypto::{CipherSuite, Method, ReplayGuard};
    pub use shade_server::{CancellationToken, ServerError};
}
