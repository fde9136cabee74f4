// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit-address key material: generation, address derivation, signing.
//!
//! Private keys exist in plaintext only inside [`generate_keypair`] and
//! [`sign_payload`]; everywhere else they are sealed by the vault. Every
//! plaintext buffer, the stack sampling array included, is wiped once the
//! operation completes.

use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use super::ChainError;

pub struct GeneratedKeypair {
    /// 32-byte secp256k1 scalar; wiped on drop.
    pub private_key: Zeroizing<Vec<u8>>,
    pub address: String,
}

/// Generate a fresh secp256k1 keypair and derive its deposit address.
pub fn generate_keypair() -> Result<GeneratedKeypair, ChainError> {
    let rng = SystemRandom::new();
    // Rejection-sample until the bytes form a valid scalar.
    for _ in 0..16 {
        let mut candidate = [0u8; 32];
        rng.fill(&mut candidate)
            .map_err(|_| ChainError::Signing("rng failure".to_string()))?;
        if let Ok(signing_key) = SigningKey::from_slice(&candidate) {
            let address = derive_address(&signing_key);
            let private_key = Zeroizing::new(candidate.to_vec());
            candidate.zeroize();
            return Ok(GeneratedKeypair {
                private_key,
                address,
            });
        }
        candidate.zeroize();
    }
    Err(ChainError::Signing("could not sample a valid key".to_string()))
}

/// Address = `0x` + first 20 bytes of SHA-256 over the compressed pubkey.
fn derive_address(signing_key: &SigningKey) -> String {
    let compressed = signing_key.verifying_key().to_encoded_point(true);
    let digest = Sha256::digest(compressed.as_bytes());
    format!("0x{}", hex::encode(&digest[..20]))
}

/// Sign a transaction payload with a plaintext private key; returns the
/// DER-encoded signature as hex.
pub fn sign_payload(private_key: &[u8], payload: &[u8]) -> Result<String, ChainError> {
    let signing_key = SigningKey::from_slice(private_key)
        .map_err(|e| ChainError::Signing(format!("invalid private key: {e}")))?;
    let signature: Signature = signing_key.sign(payload);
    Ok(hex::encode(signature.to_der().as_bytes()))
}
