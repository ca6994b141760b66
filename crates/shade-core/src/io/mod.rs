//! Stream adapters and the relay loop.

pub mod crypt;
pub mod header;
pub mod prefixed;
pub mod relay;
