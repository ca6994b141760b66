//! Cipher suites, key derivation, and salt replay protection.
//!
//! This crate provides the cryptographic core of shade:
//! - [`Method`] - the registry of supported cipher methods (stream and AEAD)
//! - [`CipherSuite`] - a method plus its master key, from which per-session
//!   cipher state is derived
//! - [`ReplayGuard`] - a rotating bloom filter that rejects replayed salts
//!
//! Session state comes in two flavors: [`Keystream`] for stream ciphers
//! (byte-for-byte XOR style) and [`Sealer`]/[`Opener`] for AEAD methods
//! (chunked, authenticated). Callers obtain either through
//! [`CipherSuite::encrypter`] / [`CipherSuite::decrypter`].

mod aead;
mod error;
mod stream;

pub mod kdf;
pub mod replay;
pub mod suite;

pub use aead::{Opener, Sealer, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use replay::ReplayGuard;
pub use stream::Keystream;
pub use suite::{CipherSuite, Decrypter, Encrypter, Method};
