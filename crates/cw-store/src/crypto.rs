use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::{Result, StoreError};

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with AES-256-GCM under `key` (32 raw bytes). The
/// returned ciphertext is `nonce || tag+ciphertext`, so `key` is the only
/// secret the caller must keep track of.
pub fn encrypt_message(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| StoreError::Crypto(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`encrypt_message`].
pub fn decrypt_message(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(StoreError::Crypto("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| StoreError::Crypto(e.to_string()))
}

/// Parse a 32-byte key out of a config string. Accepts 64-char hex or a raw
/// 32-byte string, matching `messageEncryptionKey`'s "bytes" config shape.
pub fn parse_key(raw: &str) -> Result<[u8; 32]> {
    if raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&raw[i * 2..i * 2 + 2], 16)
                .map_err(|e| StoreError::Crypto(e.to_string()))?;
        }
        return Ok(key);
    }
    if raw.len() == 32 {
        let mut key = [0u8; 32];
        key.copy_from_slice(raw.as_bytes());
        return Ok(key);
    }
    Err(StoreError::Crypto(
        "messageEncryptionKey must be 64 hex chars or 32 raw bytes".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        parse_key(&"a".repeat(64)).unwrap()
    }

    #[test]
    fn roundtrip_simple_text() {
        let key = test_key();
        let plaintext = b"hello, world";
        let ct = encrypt_message(&key, plaintext).unwrap();
        let pt = decrypt_message(&key, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn roundtrip_empty() {
        let key = test_key();
        let ct = encrypt_message(&key, b"").unwrap();
        let pt = decrypt_message(&key, &ct).unwrap();
        assert!(pt.is_empty());
    }

    #[test]
    fn roundtrip_unicode() {
        let key = test_key();
        let plaintext = "héllo wörld 🎉".as_bytes();
        let ct = encrypt_message(&key, plaintext).unwrap();
        let pt = decrypt_message(&key, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key();
        let mut ct = encrypt_message(&key, b"secret").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(decrypt_message(&key, &ct).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let key = test_key();
        let other = parse_key(&"b".repeat(64)).unwrap();
        let ct = encrypt_message(&key, b"secret").unwrap();
        assert!(decrypt_message(&other, &ct).is_err());
    }
}
