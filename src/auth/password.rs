//! Password transport decryption and storage hashing.
//!
//! Clients send passwords AES-256-CBC encrypted with a pre-shared secret
//! (key = secret bytes, IV = first 16 bytes of the secret, PKCS#7, base64).
//! Stored passwords are bcrypt hashes.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::config::SecurityConfig;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AES secret must be exactly 32 bytes")]
    InvalidSecret,

    #[error("ciphertext is not valid base64")]
    Base64(#[from] base64::DecodeError),

    #[error("ciphertext could not be decrypted")]
    Decrypt,

    #[error("decrypted password is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("hashing failed: {0}")]
    Hash(String),
}

pub struct PasswordService {
    secret: Vec<u8>,
    bcrypt_cost: u32,
}

impl PasswordService {
    pub fn new(security: &SecurityConfig) -> Self {
        Self {
            secret: security.aes_secret.as_bytes().to_vec(),
            bcrypt_cost: security.bcrypt_cost,
        }
    }

    fn key_iv(&self) -> Result<(&[u8], &[u8]), CryptoError> {
        if self.secret.len() != 32 {
            return Err(CryptoError::InvalidSecret);
        }
        Ok((&self.secret, &self.secret[..16]))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let (key, iv) = self.key_iv()?;
        let raw = STANDARD.decode(ciphertext.trim())?;
        let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidSecret)?;
        let plain = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&raw)
            .map_err(|_| CryptoError::Decrypt)?;
        Ok(String::from_utf8(plain)?)
    }

    /// Inverse of [`decrypt`](Self::decrypt); used by the CLI and tests to
    /// produce client payloads.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let (key, iv) = self.key_iv()?;
        let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidSecret)?;
        let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        Ok(STANDARD.encode(encrypted))
    }

    pub async fn hash(&self, plaintext: String) -> Result<String, CryptoError> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| CryptoError::Hash(e.to_string()))?
            .map_err(|e| CryptoError::Hash(e.to_string()))
    }

    pub async fn verify(&self, plaintext: String, hash: String) -> Result<bool, CryptoError> {
        tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash))
            .await
            .map_err(|e| CryptoError::Hash(e.to_string()))?
            .map_err(|e| CryptoError::Hash(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> PasswordService {
        PasswordService {
            secret: secret.as_bytes().to_vec(),
            bcrypt_cost: 4,
        }
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn decrypts_what_it_encrypts() {
        let svc = service(SECRET);
        let ct = svc.encrypt("hunter2!").unwrap();
        assert_ne!(ct, "hunter2!");
        assert_eq!(svc.decrypt(&ct).unwrap(), "hunter2!");
    }

    #[test]
    fn rejects_short_secret() {
        let svc = service("too-short");
        assert!(matches!(svc.decrypt("AAAA"), Err(CryptoError::InvalidSecret)));
    }

    #[test]
    fn garbage_ciphertext_is_an_error_not_a_panic() {
        let svc = service(SECRET);
        assert!(matches!(svc.decrypt("%%%"), Err(CryptoError::Base64(_))));
        // valid base64, wrong block length
        assert!(matches!(svc.decrypt("AAAA"), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn wrong_secret_does_not_yield_plaintext() {
        let ct = service(SECRET).encrypt("secret-password").unwrap();
        let other = service("fedcba9876543210fedcba9876543210");
        match other.decrypt(&ct) {
            Ok(plain) => assert_ne!(plain, "secret-password"),
            Err(_) => {}
        }
    }

    #[tokio::test]
    async fn bcrypt_round_trip() {
        let svc = service(SECRET);
        let hash = svc.hash("pw".to_string()).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(svc.verify("pw".to_string(), hash.clone()).await.unwrap());
        assert!(!svc.verify("nope".to_string(), hash).await.unwrap());
    }
}
