//! Authenticated payload encryption for the vault and the cache.
//!
//! ChaCha20-Poly1305 with a fresh random 96-bit nonce per operation, so two
//! seals of identical plaintext never produce identical ciphertext. The wire
//! form is `enc:v1:` + base64(nonce ‖ ciphertext); the prefix lets readers
//! distinguish sealed payloads from legacy plaintext without guessing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chacha20poly1305::{
  ChaCha20Poly1305, Key, KeyInit, Nonce,
  aead::{Aead, AeadCore, OsRng},
};

use crate::error::{Error, Result};

/// Marker prefix on every sealed payload.
pub const SEALED_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;

/// A symmetric payload cipher. Cloning is cheap — it holds only the key.
#[derive(Clone)]
pub struct SecretCipher {
  key: Key,
}

impl SecretCipher {
  /// Build a cipher from a raw 32-byte key.
  pub fn from_key_bytes(bytes: [u8; 32]) -> Self {
    Self { key: Key::from(bytes) }
  }

  /// Build a cipher from a base64-encoded 32-byte key, as configured.
  pub fn from_base64(encoded: &str) -> Result<Self> {
    let raw = B64
      .decode(encoded.trim())
      .map_err(|e| Error::BadKey(format!("invalid base64: {e}")))?;
    let bytes: [u8; 32] = raw
      .try_into()
      .map_err(|_| Error::BadKey("expected a 32-byte key".to_string()))?;
    Ok(Self::from_key_bytes(bytes))
  }

  /// Whether a stored payload carries the sealed marker.
  pub fn is_sealed(payload: &str) -> bool {
    payload.starts_with(SEALED_PREFIX)
  }

  /// Encrypt `plaintext` under a fresh random nonce.
  pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(&self.key);
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
      .encrypt(&nonce, plaintext)
      .map_err(|_| Error::Decryption("encryption failed"))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(format!("{SEALED_PREFIX}{}", B64.encode(combined)))
  }

  /// Decrypt a sealed payload. Fails loudly on a wrong key or tampered
  /// ciphertext — never returns garbage.
  pub fn open(&self, sealed: &str) -> Result<Vec<u8>> {
    let encoded = sealed
      .strip_prefix(SEALED_PREFIX)
      .ok_or(Error::Decryption("payload is not sealed"))?;
    let combined = B64
      .decode(encoded)
      .map_err(|_| Error::Decryption("invalid base64 payload"))?;
    if combined.len() < NONCE_LEN {
      return Err(Error::Decryption("payload too short"));
    }

    let (nonce_raw, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(&self.key);
    cipher
      .decrypt(Nonce::from_slice(nonce_raw), ciphertext)
      .map_err(|_| Error::Decryption("payload did not authenticate"))
  }
}

// Never print key material.
impl std::fmt::Debug for SecretCipher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("SecretCipher(<redacted>)")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cipher(byte: u8) -> SecretCipher {
    SecretCipher::from_key_bytes([byte; 32])
  }

  #[test]
  fn seal_open_round_trips() {
    let c = cipher(1);
    let sealed = c.seal(b"hello vault").unwrap();
    assert!(SecretCipher::is_sealed(&sealed));
    assert_eq!(c.open(&sealed).unwrap(), b"hello vault");
  }

  #[test]
  fn identical_plaintexts_seal_differently() {
    let c = cipher(1);
    let a = c.seal(b"same").unwrap();
    let b = c.seal(b"same").unwrap();
    assert_ne!(a, b);
    assert_eq!(c.open(&a).unwrap(), c.open(&b).unwrap());
  }

  #[test]
  fn wrong_key_fails_loudly() {
    let sealed = cipher(1).seal(b"secret").unwrap();
    let err = cipher(2).open(&sealed).unwrap_err();
    assert!(matches!(err, Error::Decryption(_)));
  }

  #[test]
  fn tampered_ciphertext_fails() {
    let c = cipher(1);
    let sealed = c.seal(b"secret").unwrap();
    // Flip a character in the base64 body.
    let mut chars: Vec<char> = sealed.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
    let tampered: String = chars.into_iter().collect();
    assert!(c.open(&tampered).is_err());
  }

  #[test]
  fn opening_unsealed_payload_fails() {
    assert!(matches!(
      cipher(1).open("{\"plain\": true}"),
      Err(Error::Decryption(_))
    ));
  }

  #[test]
  fn key_from_base64() {
    use base64::Engine as _;
    let encoded = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
    let c = SecretCipher::from_base64(&encoded).unwrap();
    let sealed = c.seal(b"x").unwrap();
    assert_eq!(c.open(&sealed).unwrap(), b"x");

    assert!(SecretCipher::from_base64("too-short").is_err());
  }
}
