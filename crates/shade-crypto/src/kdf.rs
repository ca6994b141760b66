//! Password and per-session key derivation.
//!
//! Master keys come from passwords via the OpenSSL `EVP_BytesToKey` scheme
//! (an MD5 chain with no salt), which keeps keys compatible with every other
//! implementation of this protocol family. AEAD sessions then derive a
//! per-connection subkey from the master key and the session salt using
//! HKDF-SHA1 with a fixed info string.

use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;

use crate::error::CryptoError;

/// HKDF info string for AEAD session subkeys.
const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// Derive a master key of `key_len` bytes from a password.
///
/// Implements `EVP_BytesToKey` with MD5 and no salt: each 16-byte block is
/// `MD5(previous_block || password)`, concatenated until `key_len` bytes are
/// available.
pub fn key_from_password(password: &str, key_len: usize) -> Vec<u8> {
    let mut derived = Vec::with_capacity(key_len + 16);
    let mut prev: Option<[u8; 16]> = None;

    while derived.len() < key_len {
        let mut hasher = Md5::new();
        if let Some(block) = prev {
            hasher.update(block);
        }
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        derived.extend_from_slice(&digest);
        prev = Some(digest.into());
    }

    derived.truncate(key_len);
    derived
}

/// Derive an AEAD session subkey from the master key and a session salt.
pub fn session_subkey(master: &[u8], salt: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha1>::new(Some(salt), master);
    let mut okm = vec![0u8; out_len];
    hk.expand(SUBKEY_INFO, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_block_is_plain_md5() {
        // EVP_BytesToKey's first block is MD5(password).
        assert_eq!(
            hex::encode(key_from_password("foobar", 16)),
            "3858f62230ac3c915f300c664312c63f"
        );
        assert_eq!(
            hex::encode(key_from_password("password", 16)),
            "5f4dcc3b5aa765d61d8327deb882cf99"
        );
    }

    #[test]
    fn longer_keys_extend_the_chain() {
        let short = key_from_password("foobar", 16);
        let long = key_from_password("foobar", 32);
        assert_eq!(long.len(), 32);
        assert_eq!(&long[..16], &short[..]);
        // Second block must depend on the first.
        assert_ne!(&long[16..], &short[..]);
    }

    #[test]
    fn odd_key_lengths_truncate() {
        let key = key_from_password("foobar", 24);
        assert_eq!(key.len(), 24);
        assert_eq!(&key[..16], &key_from_password("foobar", 16)[..]);
    }

    #[test]
    fn subkey_is_deterministic() {
        let master = key_from_password("secret", 32);
        let salt = [7u8; 32];
        let a = session_subkey(&master, &salt, 32).unwrap();
        let b = session_subkey(&master, &salt, 32).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn subkey_depends_on_salt_and_master() {
        let master = key_from_password("secret", 32);
        let a = session_subkey(&master, &[1u8; 32], 32).unwrap();
        let b = session_subkey(&master, &[2u8; 32], 32).unwrap();
        assert_ne!(a, b);

        let other = key_from_password("other", 32);
        let c = session_subkey(&other, &[1u8; 32], 32).unwrap();
        assert_ne!(a, c);
    }
}
