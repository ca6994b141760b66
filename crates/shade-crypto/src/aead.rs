//! AEAD chunk sealing and opening.
//!
//! Each direction of an AEAD session counts its own 96-bit nonce starting
//! at zero, incremented little-endian after every seal or open. The nonce
//! advances even when opening fails so that a corrupted chunk cannot be
//! retried against the same counter value.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

use crate::error::CryptoError;
use crate::suite::Method;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

enum AeadCipher {
    Aes128Gcm(Box<Aes128Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    Chacha20Poly1305(Box<ChaCha20Poly1305>),
}

impl AeadCipher {
    fn new(method: Method, subkey: &[u8]) -> Result<Self, CryptoError> {
        let bad = || CryptoError::InvalidKeySize {
            expected: method.key_len(),
            got: subkey.len(),
        };
        match method {
            Method::Aes128Gcm => Aes128Gcm::new_from_slice(subkey)
                .map(|c| AeadCipher::Aes128Gcm(Box::new(c)))
                .map_err(|_| bad()),
            Method::Aes256Gcm => Aes256Gcm::new_from_slice(subkey)
                .map(|c| AeadCipher::Aes256Gcm(Box::new(c)))
                .map_err(|_| bad()),
            Method::Chacha20Poly1305 => ChaCha20Poly1305::new_from_slice(subkey)
                .map(|c| AeadCipher::Chacha20Poly1305(Box::new(c)))
                .map_err(|_| bad()),
            other => Err(CryptoError::UnknownCipher(other.name().to_string())),
        }
    }

    fn seal(&self, nonce: &[u8; NONCE_LEN], plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            AeadCipher::Aes128Gcm(c) => c.encrypt(nonce, plain),
            AeadCipher::Aes256Gcm(c) => c.encrypt(nonce, plain),
            AeadCipher::Chacha20Poly1305(c) => c.encrypt(nonce, plain),
        }
        .map_err(|_| CryptoError::Authentication)
    }

    fn open(&self, nonce: &[u8; NONCE_LEN], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            AeadCipher::Aes128Gcm(c) => c.decrypt(nonce, sealed),
            AeadCipher::Aes256Gcm(c) => c.decrypt(nonce, sealed),
            AeadCipher::Chacha20Poly1305(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| CryptoError::Authentication)
    }
}

fn increment(nonce: &mut [u8; NONCE_LEN]) {
    for byte in nonce.iter_mut() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            return;
        }
    }
}

/// Write-side AEAD state: seals chunks under an incrementing nonce.
pub struct Sealer {
    cipher: AeadCipher,
    nonce: [u8; NONCE_LEN],
}

impl Sealer {
    pub(crate) fn new(method: Method, subkey: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: AeadCipher::new(method, subkey)?,
            nonce: [0u8; NONCE_LEN],
        })
    }

    /// Seal one chunk, returning ciphertext with the tag appended.
    pub fn seal(&mut self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sealed = self.cipher.seal(&self.nonce, plain);
        increment(&mut self.nonce);
        sealed
    }
}

/// Read-side AEAD state: opens chunks under an incrementing nonce.
pub struct Opener {
    cipher: AeadCipher,
    nonce: [u8; NONCE_LEN],
}

impl Opener {
    pub(crate) fn new(method: Method, subkey: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: AeadCipher::new(method, subkey)?,
            nonce: [0u8; NONCE_LEN],
        })
    }

    /// Open one sealed chunk. The nonce advances whether or not the tag
    /// verifies.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plain = self.cipher.open(&self.nonce, sealed);
        increment(&mut self.nonce);
        plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(method: Method) -> (Sealer, Opener) {
        let subkey = vec![0x5au8; method.key_len()];
        (
            Sealer::new(method, &subkey).unwrap(),
            Opener::new(method, &subkey).unwrap(),
        )
    }

    #[test]
    fn seal_open_round_trips_every_method() {
        for method in [
            Method::Aes128Gcm,
            Method::Aes256Gcm,
            Method::Chacha20Poly1305,
        ] {
            let (mut sealer, mut opener) = pair(method);
            for msg in [&b"a"[..], b"", b"hello world", &[0u8; 4096]] {
                let sealed = sealer.seal(msg).unwrap();
                assert_eq!(sealed.len(), msg.len() + TAG_LEN);
                assert_eq!(opener.open(&sealed).unwrap(), msg);
            }
        }
    }

    #[test]
    fn identical_chunks_seal_differently() {
        let (mut sealer, _) = pair(Method::Chacha20Poly1305);
        let a = sealer.seal(b"repeat").unwrap();
        let b = sealer.seal(b"repeat").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_chunk_fails_authentication() {
        let (mut sealer, mut opener) = pair(Method::Aes256Gcm);
        let mut sealed = sealer.seal(b"payload").unwrap();
        sealed[0] ^= 0x01;
        assert!(matches!(
            opener.open(&sealed),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn nonce_advances_past_failed_open() {
        let (mut sealer, mut opener) = pair(Method::Aes128Gcm);
        let first = sealer.seal(b"one").unwrap();
        let second = sealer.seal(b"two").unwrap();

        let mut garbled = first.clone();
        garbled[0] ^= 0xff;
        assert!(opener.open(&garbled).is_err());

        // The counter moved past the failed chunk, so the second chunk
        // opens in sequence while the intact first never can again.
        assert_eq!(opener.open(&second).unwrap(), b"two");
        assert!(opener.open(&first).is_err());
    }

    #[test]
    fn nonce_increment_carries() {
        let mut nonce = [0xffu8, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        increment(&mut nonce);
        assert_eq!(&nonce[..3], &[0x00, 0x01, 0x00]);

        let mut wrap = [0xffu8; NONCE_LEN];
        increment(&mut wrap);
        assert_eq!(wrap, [0u8; NONCE_LEN]);
    }
}
