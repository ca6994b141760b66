//! Shared tunnel runtime.
//!
//! This crate holds the pieces every mode of the tunnel is built from:
//! the encrypted stream adapter ([`CipherStream`]), the header-coalescing
//! writer ([`HeaderStream`]), the leftover-bytes adapter
//! ([`PrefixedStream`]), the bidirectional relay loop, TCP socket
//! options, and the process shutdown signal.

pub mod defaults;
pub mod io;
pub mod net;
pub mod shutdown;

pub use io::crypt::{CipherStream, CipherStreamError};
pub use io::header::HeaderStream;
pub use io::prefixed::PrefixedStream;
pub use io::relay::{relay_bidirectional, RelayOutcome};
pub use net::{apply_tcp_options, dial, TcpOptions};
