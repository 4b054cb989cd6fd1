//! Reversible credential encryption for remote sources.
//!
//! Credentials must be recoverable to reconnect, so they are encrypted with
//! AES-256-GCM under a key derived from the server secret (SHA-256). The
//! stored blob is `base64(nonce || ciphertext)`. Plaintext never reaches
//! logs; use [`fingerprint`] when a credential needs to be referenced.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use streambox_core::{Error, Result};

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

fn derive_key(secret: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encrypt a plaintext credential for storage.
pub fn encrypt_credential(secret: &str, plaintext: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(&derive_key(secret));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| Error::Internal("credential encryption failed".into()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a stored credential blob.
pub fn decrypt_credential(secret: &str, blob: &str) -> Result<String> {
    let raw = STANDARD
        .decode(blob)
        .map_err(|_| Error::Validation("malformed credential blob".into()))?;
    if raw.len() <= NONCE_LEN {
        return Err(Error::Validation("malformed credential blob".into()));
    }

    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&derive_key(secret));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Validation("credential decryption failed (wrong secret?)".into()))?;

    String::from_utf8(plaintext)
        .map_err(|_| Error::Validation("credential is not valid UTF-8".into()))
}

/// Short non-reversible fingerprint of a secret value, safe for logs.
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let blob = encrypt_credential("server-secret", "p@ssw0rd").unwrap();
        let back = decrypt_credential("server-secret", &blob).unwrap();
        assert_eq!(back, "p@ssw0rd");
    }

    #[test]
    fn ciphertext_is_not_plaintext() {
        let blob = encrypt_credential("s", "visible-password").unwrap();
        assert!(!blob.contains("visible-password"));
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let a = encrypt_credential("s", "same").unwrap();
        let b = encrypt_credential("s", "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_fails() {
        let blob = encrypt_credential("right", "pw").unwrap();
        assert!(decrypt_credential("wrong", &blob).is_err());
    }

    #[test]
    fn garbage_blob_fails() {
        assert!(decrypt_credential("s", "not-base64!!!").is_err());
        assert!(decrypt_credential("s", "AAAA").is_err());
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        let fp = fingerprint("token-value");
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, fingerprint("token-value"));
        assert_ne!(fp, fingerprint("other"));
    }
}
