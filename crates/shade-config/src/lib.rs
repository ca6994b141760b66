//! Configuration for the shade tunnel: file loading, validation, endpoint
//! resolution, and tracing setup.

mod defaults;
mod endpoint;
mod loader;
mod logging;
mod types;
mod validate;

pub use endpoint::{Endpoint, Secret, node_cipher_suite, resolve_endpoint, split_tunnel_spec};
pub use loader::{ConfigError, load_config};
pub use logging::init_tracing;
pub use types::{
    ClientConfig, Config, JumperConfig, LoggingConfig, NodeConfig, ReplayConfig, ReverseConfig,
    ServerConfig, TcpConfig,
};
pub use validate::{validate_client, validate_jumper, validate_reverse, validate_server};
