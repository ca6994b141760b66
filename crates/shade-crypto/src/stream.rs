//! Stream cipher keystreams.
//!
//! Each side of a connection owns one `Keystream`, keyed with the master
//! key and the plaintext salt exchanged at session start. CTR and ChaCha20
//! keystreams are direction-agnostic; CFB keeps separate encrypt and
//! decrypt state.

use cfb_mode::{BufDecryptor, BufEncryptor};
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::error::CryptoError;
use crate::suite::Method;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

type Aes128CfbEnc = BufEncryptor<aes::Aes128>;
type Aes192CfbEnc = BufEncryptor<aes::Aes192>;
type Aes256CfbEnc = BufEncryptor<aes::Aes256>;
type Aes128CfbDec = BufDecryptor<aes::Aes128>;
type Aes192CfbDec = BufDecryptor<aes::Aes192>;
type Aes256CfbDec = BufDecryptor<aes::Aes256>;

/// One direction's stream cipher state.
pub enum Keystream {
    Aes128Ctr(Box<Aes128Ctr>),
    Aes192Ctr(Box<Aes192Ctr>),
    Aes256Ctr(Box<Aes256Ctr>),
    Chacha20(Box<chacha20::ChaCha20>),
    Aes128CfbEnc(Box<Aes128CfbEnc>),
    Aes192CfbEnc(Box<Aes192CfbEnc>),
    Aes256CfbEnc(Box<Aes256CfbEnc>),
    Aes128CfbDec(Box<Aes128CfbDec>),
    Aes192CfbDec(Box<Aes192CfbDec>),
    Aes256CfbDec(Box<Aes256CfbDec>),
}

fn not_a_stream_method(method: Method) -> CryptoError {
    CryptoError::UnknownCipher(method.name().to_string())
}

impl Keystream {
    pub(crate) fn encrypter(method: Method, key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let bad = || CryptoError::InvalidKeySize {
            expected: method.key_len(),
            got: key.len(),
        };
        match method {
            Method::Aes128Ctr => Aes128Ctr::new_from_slices(key, iv)
                .map(|c| Keystream::Aes128Ctr(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes192Ctr => Aes192Ctr::new_from_slices(key, iv)
                .map(|c| Keystream::Aes192Ctr(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes256Ctr => Aes256Ctr::new_from_slices(key, iv)
                .map(|c| Keystream::Aes256Ctr(Box::new(c)))
                .map_err(|_| bad()),
            Method::Chacha20Ietf => chacha20::ChaCha20::new_from_slices(key, iv)
                .map(|c| Keystream::Chacha20(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes128Cfb => Aes128CfbEnc::new_from_slices(key, iv)
                .map(|c| Keystream::Aes128CfbEnc(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes192Cfb => Aes192CfbEnc::new_from_slices(key, iv)
                .map(|c| Keystream::Aes192CfbEnc(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes256Cfb => Aes256CfbEnc::new_from_slices(key, iv)
                .map(|c| Keystream::Aes256CfbEnc(Box::new(c)))
                .map_err(|_| bad()),
            _ => Err(not_a_stream_method(method)),
        }
    }

    pub(crate) fn decrypter(method: Method, key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let bad = || CryptoError::InvalidKeySize {
            expected: method.key_len(),
            got: key.len(),
        };
        match method {
            // CTR and ChaCha20 are symmetric, the decrypter is the same
            // keystream as the encrypter.
            Method::Aes128Ctr | Method::Aes192Ctr | Method::Aes256Ctr | Method::Chacha20Ietf => {
                Self::encrypter(method, key, iv)
            }
            Method::Aes128Cfb => Aes128CfbDec::new_from_slices(key, iv)
                .map(|c| Keystream::Aes128CfbDec(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes192Cfb => Aes192CfbDec::new_from_slices(key, iv)
                .map(|c| Keystream::Aes192CfbDec(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes256Cfb => Aes256CfbDec::new_from_slices(key, iv)
                .map(|c| Keystream::Aes256CfbDec(Box::new(c)))
                .map_err(|_| bad()),
            _ => Err(not_a_stream_method(method)),
        }
    }

    /// Transform `data` in place, advancing the keystream.
    pub fn apply(&mut self, data: &mut [u8]) {
        match self {
            Keystream::Aes128Ctr(c) => c.apply_keystream(data),
            Keystream::Aes192Ctr(c) => c.apply_keystream(data),
            Keystream::Aes256Ctr(c) => c.apply_keystream(data),
            Keystream::Chacha20(c) => c.apply_keystream(data),
            Keystream::Aes128CfbEnc(c) => c.encrypt(data),
            Keystream::Aes192CfbEnc(c) => c.encrypt(data),
            Keystream::Aes256CfbEnc(c) => c.encrypt(data),
            Keystream::Aes128CfbDec(c) => c.decrypt(data),
            Keystream::Aes192CfbDec(c) => c.decrypt(data),
            Keystream::Aes256CfbDec(c) => c.decrypt(data),
        }
    }
}
