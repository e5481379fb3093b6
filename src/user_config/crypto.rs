//! Credential encryption and the one-way ownership hash (spec §3
//! `encryptedApiKey` / `apiKeyIdHash`, §4.4 "Credential unwrap").
//!
//! Grounded on `enterprise::crypto::symmetric::Aes256GcmCipher`
//! (AES-256-GCM, random 96-bit nonce, `aead::Payload`) for the
//! authenticated-encryption blob, and `enterprise::crypto::kdf`'s PBKDF2
//! usage for the one-way, iterated key-stretching hash used for
//! ownership checks without ever reversing back to the credential.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::error::ConfigError;
use super::model::EncryptedBlob;

const NONCE_SIZE: usize = 12;
/// Iteration count for the ownership-hash KDF. High enough to be slow
/// against offline guessing of a stolen hash; this value only ever has
/// to run at login and config-mutation time, not per request.
const HASH_ITERATIONS: u32 = 100_000;

/// Encrypt an upstream API credential with the server-held key.
pub fn encrypt_api_key(key: &[u8; 32], plaintext: &str) -> Result<EncryptedBlob, ConfigError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ConfigError::Invalid("bad encryption key".into()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext.as_bytes(), aad: b"" })
        .map_err(|_| ConfigError::Invalid("credential encryption failed".into()))?;

    Ok(EncryptedBlob { nonce: nonce_bytes.to_vec(), ciphertext })
}

/// Decrypt a stored credential blob. A decryption failure (bad key,
/// tampered ciphertext, truncated nonce) is always a permanent error
/// for that configuration (spec §4.4).
pub fn decrypt_api_key(key: &[u8; 32], blob: &EncryptedBlob) -> Result<String, ConfigError> {
    if blob.nonce.len() != NONCE_SIZE {
        return Err(ConfigError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ConfigError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&blob.nonce);

    // Zeroizing wrapper so the decrypted credential bytes don't linger
    // in memory past the `String` conversion below (spec §4.4 handles
    // this value once per request; it is never logged or cached).
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(nonce, Payload { msg: &blob.ciphertext, aad: b"" })
            .map_err(|_| ConfigError::DecryptionFailed)?,
    );

    String::from_utf8(plaintext.to_vec()).map_err(|_| ConfigError::DecryptionFailed)
}

/// One-way, iterated derivation of an upstream credential used for
/// ownership assertions (spec §3 `apiKeyIdHash`). The salt is the
/// server-held encryption key's first 16 bytes — fixed and private to
/// this deployment, so the same raw credential always derives the same
/// hash without needing a separately persisted per-user salt.
pub fn derive_api_key_id_hash(server_key: &[u8; 32], raw_api_key: &str) -> String {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(raw_api_key.as_bytes(), &server_key[..16], HASH_ITERATIONS, &mut out);
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let blob = encrypt_api_key(&key(), "sk-live-abc123").unwrap();
        let recovered = decrypt_api_key(&key(), &blob).unwrap();
        assert_eq!(recovered, "sk-live-abc123");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let mut blob = encrypt_api_key(&key(), "sk-live-abc123").unwrap();
        blob.ciphertext[0] ^= 0xFF;
        assert!(matches!(decrypt_api_key(&key(), &blob), Err(ConfigError::DecryptionFailed)));
    }

    #[test]
    fn hash_is_deterministic_and_distinguishes_keys() {
        let h1 = derive_api_key_id_hash(&key(), "sk-live-abc123");
        let h2 = derive_api_key_id_hash(&key(), "sk-live-abc123");
        let h3 = derive_api_key_id_hash(&key(), "sk-live-xyz789");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}
