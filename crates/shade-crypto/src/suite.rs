//! Cipher method registry and per-connection key material.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::aead::{Opener, Sealer};
use crate::error::CryptoError;
use crate::kdf;
use crate::stream::Keystream;

/// A supported cipher method.
///
/// Stream methods XOR a keystream over the wire bytes after a plaintext
/// IV exchange; AEAD methods authenticate fixed-size chunks under a
/// salt-derived subkey. `Plain` disables encryption entirely and carries
/// no salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Aes128Ctr,
    Aes192Ctr,
    Aes256Ctr,
    Aes128Cfb,
    Aes192Cfb,
    Aes256Cfb,
    Chacha20Ietf,
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
    Plain,
}

impl Method {
    /// Master key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Method::Aes128Ctr | Method::Aes128Cfb | Method::Aes128Gcm => 16,
            Method::Aes192Ctr | Method::Aes192Cfb => 24,
            Method::Aes256Ctr
            | Method::Aes256Cfb
            | Method::Chacha20Ietf
            | Method::Aes256Gcm
            | Method::Chacha20Poly1305 => 32,
            Method::Plain => 0,
        }
    }

    /// Length of the per-direction salt sent in clear at session start.
    ///
    /// For stream methods this is the cipher IV; for AEAD methods it is the
    /// HKDF salt and matches the key length.
    pub fn salt_len(self) -> usize {
        match self {
            Method::Aes128Ctr
            | Method::Aes192Ctr
            | Method::Aes256Ctr
            | Method::Aes128Cfb
            | Method::Aes192Cfb
            | Method::Aes256Cfb => 16,
            Method::Chacha20Ietf => 12,
            Method::Aes128Gcm => 16,
            Method::Aes256Gcm | Method::Chacha20Poly1305 => 32,
            Method::Plain => 0,
        }
    }

    /// Authentication tag length appended to each AEAD chunk.
    pub fn tag_len(self) -> usize {
        if self.is_aead() {
            crate::aead::TAG_LEN
        } else {
            0
        }
    }

    pub fn is_aead(self) -> bool {
        matches!(
            self,
            Method::Aes128Gcm | Method::Aes256Gcm | Method::Chacha20Poly1305
        )
    }

    /// Canonical method name.
    pub fn name(self) -> &'static str {
        match self {
            Method::Aes128Ctr => "aes-128-ctr",
            Method::Aes192Ctr => "aes-192-ctr",
            Method::Aes256Ctr => "aes-256-ctr",
            Method::Aes128Cfb => "aes-128-cfb",
            Method::Aes192Cfb => "aes-192-cfb",
            Method::Aes256Cfb => "aes-256-cfb",
            Method::Chacha20Ietf => "chacha20-ietf",
            Method::Aes128Gcm => "aead_aes_128_gcm",
            Method::Aes256Gcm => "aead_aes_256_gcm",
            Method::Chacha20Poly1305 => "aead_chacha20_poly1305",
            Method::Plain => "plain",
        }
    }

    /// All supported methods, for help text and validation messages.
    pub fn all() -> &'static [Method] {
        &[
            Method::Aes128Ctr,
            Method::Aes192Ctr,
            Method::Aes256Ctr,
            Method::Aes128Cfb,
            Method::Aes192Cfb,
            Method::Aes256Cfb,
            Method::Chacha20Ietf,
            Method::Aes128Gcm,
            Method::Aes256Gcm,
            Method::Chacha20Poly1305,
            Method::Plain,
        ]
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = CryptoError;

    /// Parse a method name, case-insensitively, accepting the common
    /// aliases other implementations use for the AEAD methods.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-128-ctr" => Ok(Method::Aes128Ctr),
            "aes-192-ctr" => Ok(Method::Aes192Ctr),
            "aes-256-ctr" => Ok(Method::Aes256Ctr),
            "aes-128-cfb" => Ok(Method::Aes128Cfb),
            "aes-192-cfb" => Ok(Method::Aes192Cfb),
            "aes-256-cfb" => Ok(Method::Aes256Cfb),
            "chacha20-ietf" => Ok(Method::Chacha20Ietf),
            "aead_aes_128_gcm" | "aes-128-gcm" => Ok(Method::Aes128Gcm),
            "aead_aes_256_gcm" | "aes-256-gcm" => Ok(Method::Aes256Gcm),
            "aead_chacha20_poly1305" | "chacha20-ietf-poly1305" => Ok(Method::Chacha20Poly1305),
            "plain" | "dummy" => Ok(Method::Plain),
            other => Err(CryptoError::UnknownCipher(other.to_string())),
        }
    }
}

/// Write-side session state derived from a fresh salt.
pub enum Encrypter {
    Stream(Keystream),
    Aead(Sealer),
    Plain,
}

/// Read-side session state derived from the peer's salt.
pub enum Decrypter {
    Stream(Keystream),
    Aead(Opener),
    Plain,
}

/// A cipher method bound to its master key.
///
/// Cloning is cheap and gives each connection its own handle; per-session
/// state is derived on demand from a salt.
#[derive(Clone)]
pub struct CipherSuite {
    method: Method,
    key: Vec<u8>,
}

impl CipherSuite {
    /// Build a suite from a raw master key.
    pub fn new(method: Method, key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != method.key_len() {
            return Err(CryptoError::InvalidKeySize {
                expected: method.key_len(),
                got: key.len(),
            });
        }
        Ok(Self {
            method,
            key: key.to_vec(),
        })
    }

    /// Build a suite by deriving the master key from a password.
    pub fn from_password(method: Method, password: &str) -> Self {
        let key = kdf::key_from_password(password, method.key_len());
        Self { method, key }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn salt_len(&self) -> usize {
        self.method.salt_len()
    }

    pub fn tag_len(&self) -> usize {
        self.method.tag_len()
    }

    pub fn is_aead(&self) -> bool {
        self.method.is_aead()
    }

    /// Generate a random salt of the method's salt length.
    pub fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; self.method.salt_len()];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Derive write-side session state from `salt`.
    pub fn encrypter(&self, salt: &[u8]) -> Result<Encrypter, CryptoError> {
        match self.method {
            Method::Plain => Ok(Encrypter::Plain),
            m if m.is_aead() => {
                let subkey = kdf::session_subkey(&self.key, salt, self.key.len())?;
                Ok(Encrypter::Aead(Sealer::new(m, &subkey)?))
            }
            m => Ok(Encrypter::Stream(Keystream::encrypter(m, &self.key, salt)?)),
        }
    }

    /// Derive read-side session state from `salt`.
    pub fn decrypter(&self, salt: &[u8]) -> Result<Decrypter, CryptoError> {
        match self.method {
            Method::Plain => Ok(Decrypter::Plain),
            m if m.is_aead() => {
                let subkey = kdf::session_subkey(&self.key, salt, self.key.len())?;
                Ok(Decrypter::Aead(Opener::new(m, &subkey)?))
            }
            m => Ok(Decrypter::Stream(Keystream::decrypter(m, &self.key, salt)?)),
        }
    }
}

impl fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("CipherSuite")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases_case_insensitively() {
        assert_eq!("AES-256-CTR".parse::<Method>().unwrap(), Method::Aes256Ctr);
        assert_eq!(
            "AEAD_CHACHA20_POLY1305".parse::<Method>().unwrap(),
            Method::Chacha20Poly1305
        );
        assert_eq!(
            "chacha20-ietf-poly1305".parse::<Method>().unwrap(),
            Method::Chacha20Poly1305
        );
        assert_eq!("aes-128-gcm".parse::<Method>().unwrap(), Method::Aes128Gcm);
        assert_eq!("DUMMY".parse::<Method>().unwrap(), Method::Plain);
        assert!(matches!(
            "rot13".parse::<Method>(),
            Err(CryptoError::UnknownCipher(_))
        ));
    }

    #[test]
    fn canonical_names_round_trip() {
        for &m in Method::all() {
            assert_eq!(m.name().parse::<Method>().unwrap(), m);
        }
    }

    #[test]
    fn key_and_salt_sizes() {
        assert_eq!(Method::Aes128Gcm.key_len(), 16);
        assert_eq!(Method::Aes128Gcm.salt_len(), 16);
        assert_eq!(Method::Aes256Gcm.salt_len(), 32);
        assert_eq!(Method::Chacha20Ietf.key_len(), 32);
        assert_eq!(Method::Chacha20Ietf.salt_len(), 12);
        assert_eq!(Method::Aes192Cfb.key_len(), 24);
        assert_eq!(Method::Plain.salt_len(), 0);
        assert_eq!(Method::Plain.tag_len(), 0);
        assert_eq!(Method::Chacha20Poly1305.tag_len(), 16);
    }

    #[test]
    fn suite_rejects_wrong_key_size() {
        let err = CipherSuite::new(Method::Aes256Gcm, &[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeySize {
                expected: 32,
                got: 16
            }
        ));
    }

    #[test]
    fn generated_salts_are_unique_per_session() {
        let suite = CipherSuite::from_password(Method::Chacha20Poly1305, "pw");
        let a = suite.generate_salt();
        let b = suite.generate_salt();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn stream_session_round_trips() {
        for method in [
            Method::Aes128Ctr,
            Method::Aes192Ctr,
            Method::Aes256Ctr,
            Method::Aes128Cfb,
            Method::Aes192Cfb,
            Method::Aes256Cfb,
            Method::Chacha20Ietf,
        ] {
            let suite = CipherSuite::from_password(method, "pw");
            let salt = suite.generate_salt();

            let mut data = b"the quick brown fox jumps over the lazy dog".to_vec();
            let original = data.clone();

            match suite.encrypter(&salt).unwrap() {
                Encrypter::Stream(mut ks) => {
                    // Encrypt in two segments to exercise keystream state.
                    let (a, b) = data.split_at_mut(10);
                    ks.apply(a);
                    ks.apply(b);
                }
                _ => panic!("expected stream encrypter for {method}"),
            }
            assert_ne!(data, original);

            match suite.decrypter(&salt).unwrap() {
                Decrypter::Stream(mut ks) => ks.apply(&mut data),
                _ => panic!("expected stream decrypter for {method}"),
            }
            assert_eq!(data, original);
        }
    }

    #[test]
    fn aead_session_round_trips() {
        for method in [
            Method::Aes128Gcm,
            Method::Aes256Gcm,
            Method::Chacha20Poly1305,
        ] {
            let suite = CipherSuite::from_password(method, "pw");
            let salt = suite.generate_salt();

            let mut sealer = match suite.encrypter(&salt).unwrap() {
                Encrypter::Aead(s) => s,
                _ => panic!("expected aead sealer for {method}"),
            };
            let mut opener = match suite.decrypter(&salt).unwrap() {
                Decrypter::Aead(o) => o,
                _ => panic!("expected aead opener for {method}"),
            };

            let first = sealer.seal(b"hello").unwrap();
            let second = sealer.seal(b"world").unwrap();
            assert_eq!(first.len(), 5 + method.tag_len());

            assert_eq!(opener.open(&first).unwrap(), b"hello");
            assert_eq!(opener.open(&second).unwrap(), b"world");
        }
    }

    #[test]
    fn aead_rejects_out_of_order_chunks() {
        let suite = CipherSuite::from_password(Method::Chacha20Poly1305, "pw");
        let salt = suite.generate_salt();

        let mut sealer = match suite.encrypter(&salt).unwrap() {
            Encrypter::Aead(s) => s,
            _ => unreachable!(),
        };
        let mut opener = match suite.decrypter(&salt).unwrap() {
            Decrypter::Aead(o) => o,
            _ => unreachable!(),
        };

        let _first = sealer.seal(b"hello").unwrap();
        let second = sealer.seal(b"world").unwrap();

        // Opening the second chunk first uses the wrong nonce.
        assert!(matches!(
            opener.open(&second),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn plain_suite_has_no_session_state() {
        let suite = CipherSuite::from_password(Method::Plain, "ignored");
        assert_eq!(suite.salt_len(), 0);
        assert!(matches!(suite.encrypter(&[]).unwrap(), Encrypter::Plain));
        assert!(matches!(suite.decrypter(&[]).unwrap(), Decrypter::Plain));
    }

    #[test]
    fn debug_hides_key_material() {
        let suite = CipherSuite::from_password(Method::Aes256Gcm, "hunter2");
        let rendered = format!("{suite:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("Aes256Gcm"));
    }
}
