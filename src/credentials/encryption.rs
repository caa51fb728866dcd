//! Credential encryption using AES-256-GCM
//!
//! Credential payloads are encrypted at rest under a single server-held master
//! key. Every call draws a fresh random nonce, which is stored in front of the
//! ciphertext:
//!
//! ```text
//! | nonce (12 bytes) | ciphertext | tag (16 bytes) |
//! ```
//!
//! There is no per-workspace key derivation; rotating the master key means
//! re-encrypting every stored credential.

use crate::config::EncryptionConfig;
use crate::errors::{Error, Result};
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

/// Size of AES-256-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
const TAG_SIZE: usize = 16;

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Authenticated encryption of credential payloads under the master key
#[derive(Clone)]
pub struct CredentialEncryptor {
    key_bytes: Arc<Zeroizing<[u8; 32]>>,
    key_version: String,
    rng: Arc<SystemRandom>,
}

impl CredentialEncryptor {
    /// Create a new encryptor from configuration
    pub fn new(config: &EncryptionConfig) -> Result<Self> {
        let key_bytes = Zeroizing::new(config.key_bytes()?);

        debug!(key_version = %config.key_version, "Credential encryptor initialized");

        Ok(Self {
            key_bytes: Arc::new(key_bytes),
            key_version: config.key_version.clone(),
            rng: Arc::new(SystemRandom::new()),
        })
    }

    /// Create an encryptor with the fixed development key
    pub fn for_testing() -> Self {
        Self {
            key_bytes: Arc::new(Zeroizing::new([0x42u8; 32])),
            key_version: "test".to_string(),
            rng: Arc::new(SystemRandom::new()),
        }
    }

    /// Get the current key version
    pub fn key_version(&self) -> &str {
        &self.key_version
    }

    /// Encrypt plaintext, returning `nonce || ciphertext || tag`
    #[instrument(skip(self, plaintext), fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            Error::internal("Failed to generate random nonce for encryption")
        })?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key_bytes[..]).map_err(|_| {
            error!("Failed to create encryption key");
            Error::internal("Failed to create encryption key")
        })?;

        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut sealed = Vec::with_capacity(NONCE_SIZE + plaintext.len() + TAG_SIZE);
        sealed.extend_from_slice(&nonce_bytes);
        let mut in_out = plaintext.to_vec();

        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut in_out).map_err(|_| {
            error!("Encryption failed");
            Error::internal("Failed to encrypt credential data")
        })?;

        sealed.extend_from_slice(&in_out);

        debug!(sealed_len = sealed.len(), "Successfully encrypted credential data");

        Ok(sealed)
    }

    /// Decrypt a `nonce || ciphertext || tag` blob
    ///
    /// Empty input is rejected as a bad request before any key material is touched.
    #[instrument(skip(self, sealed), fields(sealed_len = sealed.len()))]
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if sealed.is_empty() {
            return Err(Error::bad_request("encrypted data is empty"));
        }

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::internal(
                "Ciphertext too short (missing nonce or authentication tag)",
            ));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key_bytes[..]).map_err(|_| {
            error!("Failed to create decryption key");
            Error::internal("Failed to create decryption key")
        })?;

        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut buffer = Zeroizing::new(ciphertext.to_vec());

        let plaintext_len = opening_key
            .open_in_place(Aad::empty(), &mut buffer[..])
            .map_err(|_| {
                error!("Decryption failed - possible tampering or wrong key");
                Error::internal("Failed to decrypt credential data - authentication failed")
            })?
            .len();

        buffer.truncate(plaintext_len);

        debug!(plaintext_len, "Successfully decrypted credential data");

        Ok(buffer)
    }
}

impl std::fmt::Debug for CredentialEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEncryptor")
            .field("key_version", &self.key_version)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}
