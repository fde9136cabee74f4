// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Vault
//!
//! Encrypts custodial private keys at rest with AES-256-GCM under a
//! process-wide master key. The master key is loaded once at startup and
//! is read-only afterwards; decrypted key material is handed out only for
//! the duration of a single signing operation and must not be cached.

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Error type for vault operations.
///
/// Any `EncryptionFailure` is fatal for the affected operation: it signals
/// either master-key misconfiguration or corrupted ciphertext, and callers
/// must abort without partial ledger mutation.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    #[error("invalid master key: {0}")]
    InvalidMasterKey(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Ciphertext + nonce for a custodial private key, stored alongside the
/// wallet address and never alongside plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedKey {
    /// Base64 AES-256-GCM ciphertext (tag appended).
    pub ciphertext: String,
    /// Base64 96-bit nonce, unique per sealing.
    pub nonce: String,
}

/// Process-wide vault sealing custodial signing keys.
pub struct KeyVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl KeyVault {
    /// Build a vault from a base64-encoded 32-byte master key.
    pub fn from_base64(master_key_b64: &str) -> VaultResult<Self> {
        let key_bytes = Base64::decode_vec(master_key_b64.trim())
            .map_err(|e| VaultError::InvalidMasterKey(format!("base64 decode: {e}")))?;
        if key_bytes.len() != AES_256_GCM.key_len() {
            return Err(VaultError::InvalidMasterKey(format!(
                "expected {} bytes, got {}",
                AES_256_GCM.key_len(),
                key_bytes.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| VaultError::InvalidMasterKey("unusable key material".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Generate a random master key, base64-encoded. Used by operators to
    /// provision `MASTER_KEY` and by tests.
    pub fn generate_master_key() -> VaultResult<String> {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes)
            .map_err(|_| VaultError::EncryptionFailure("rng failure".to_string()))?;
        Ok(Base64::encode_string(&bytes))
    }

    /// Seal plaintext key material. A fresh random nonce is used for every
    /// call; reusing a nonce under GCM would be catastrophic.
    pub fn seal(&self, plaintext: &[u8]) -> VaultResult<EncryptedKey> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::EncryptionFailure("rng failure".to_string()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| VaultError::EncryptionFailure("seal failed".to_string()))?;

        Ok(EncryptedKey {
            ciphertext: Base64::encode_string(&buffer),
            nonce: Base64::encode_string(&nonce_bytes),
        })
    }

    /// Open a sealed key. The returned plaintext wipes itself on drop;
    /// callers hold it only for the duration of one signing operation.
    pub fn open(&self, sealed: &EncryptedKey) -> VaultResult<Zeroizing<Vec<u8>>> {
        let nonce_bytes = Base64::decode_vec(&sealed.nonce)
            .map_err(|e| VaultError::EncryptionFailure(format!("nonce decode: {e}")))?;
        let nonce_arr: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::EncryptionFailure("bad nonce length".to_string()))?;

        let mut buffer = Base64::decode_vec(&sealed.ciphertext)
            .map_err(|e| VaultError::EncryptionFailure(format!("ciphertext decode: {e}")))?;

        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_arr),
                Aad::empty(),
                &mut buffer,
            )
            .map_err(|_| {
                VaultError::EncryptionFailure("authentication failed (wrong key or corrupted data)".to_string())
            })?;

        Ok(Zeroizing::new(plaintext.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> KeyVault {
        let master = KeyVault::generate_master_key().unwrap();
        KeyVault::from_base64(&master).unwrap()
    }

    #[test]
    fn seal_and_open_round_trip() {
        let vault = test_vault();
        let secret = b"super secret signing key material";

        let sealed = vault.seal(secret).unwrap();
        assert_ne!(sealed.ciphertext.as_bytes(), secret.as_slice());

        let opened = vault.open(&sealed).unwrap();
        assert_eq!(opened.as_slice(), secret.as_slice());
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let vault = test_vault();
        let a = vault.seal(b"key").unwrap();
        let b = vault.seal(b"key").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn open_with_wrong_vault_fails() {
        let vault_a = test_vault();
        let vault_b = test_vault();

        let sealed = vault_a.seal(b"key material").unwrap();
        let result = vault_b.open(&sealed);
        assert!(matches!(result, Err(VaultError::EncryptionFailure(_))));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let vault = test_vault();
        let mut sealed = vault.seal(b"key material").unwrap();

        let mut raw = Base64::decode_vec(&sealed.ciphertext).unwrap();
        raw[0] ^= 0xFF;
        sealed.ciphertext = Base64::encode_string(&raw);

        assert!(vault.open(&sealed).is_err());
    }

    #[test]
    fn rejects_short_master_key() {
        let short = Base64::encode_string(&[0u8; 16]);
        assert!(matches!(
            KeyVault::from_base64(&short),
            Err(VaultError::InvalidMasterKey(_))
        ));
    }

    #[test]
    fn opened_key_is_drop_wiping() {
        let vault = test_vault();
        let sealed = vault.seal(b"key material").unwrap();

        let opened = vault.open(&sealed).unwrap();
        // The wrapper guarantees the wipe; here we only check the plaintext
        // is intact while held.
        let _: &Zeroizing<Vec<u8>> = &opened;
        assert_eq!(opened.as_slice(), b"key material");
    }
}
