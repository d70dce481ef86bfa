//! AES-256-GCM for snapshot files and password properties.
//!
//! - KeyProvider (KID -> 32-byte key), StaticKeyProvider for tests,
//!   EnvKeyProvider reading the key from ENV (HEX or BASE64).
//! - CryptoService: text-in/text-out encryption. The ciphertext text form is
//!   base64(nonce12 || ciphertext || tag16), nonce from OsRng, fixed AAD.
//! - Key material is zeroized on drop.
//!
//! Usage:
//!   let crypto = CryptoService::new(Arc::new(EnvKeyProvider::from_env()?));
//!   let ct = crypto.encrypt_aes("secret")?;
//!   assert_eq!(crypto.decrypt_aes(&ct)?, "secret");

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Result};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use zeroize::Zeroize;

use crate::consts::{AES_AAD, AES_NONCE_LEN};

pub mod password;
pub use password::PasswordCodec;

/// Key handed out by a provider; wiped on drop.
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    pub kid: String,
    pub key: [u8; 32],
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// KID -> 32-byte key. Thread-safe.
pub trait KeyProvider: Send + Sync {
    fn key(&self, kid: &str) -> Result<KeyMaterial>;
    fn default_kid(&self) -> &str;
}

/// One fixed key under one KID (tests, embedding).
#[derive(Clone)]
pub struct StaticKeyProvider {
    kid: String,
    key: [u8; 32],
}

impl StaticKeyProvider {
    pub fn new<S: Into<String>>(kid: S, key: [u8; 32]) -> Self {
        Self {
            kid: kid.into(),
            key,
        }
    }
}

impl std::fmt::Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyProvider")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key(&self, kid: &str) -> Result<KeyMaterial> {
        if kid != self.kid {
            return Err(anyhow!("no key for KID '{}'", kid));
        }
        Ok(KeyMaterial {
            kid: kid.to_string(),
            key: self.key,
        })
    }

    fn default_kid(&self) -> &str {
        &self.kid
    }
}

impl Drop for StaticKeyProvider {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Where an env key was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    Hex,
    Base64,
}

/// Key from the environment:
/// - CV_KEY_HEX: 64 hex digits
/// - CV_KEY_BASE64: 32 bytes in base64 (used when CV_KEY_HEX is unset)
/// - CV_KID: key id, "default" when unset
#[derive(Clone, Debug)]
pub struct EnvKeyProvider {
    inner: StaticKeyProvider,
    source: KeySource,
}

impl EnvKeyProvider {
    pub fn from_env() -> Result<Self> {
        let kid = std::env::var("CV_KID").unwrap_or_else(|_| "default".to_string());
        let (raw, source) = match (std::env::var("CV_KEY_HEX"), std::env::var("CV_KEY_BASE64")) {
            (Ok(hex), _) => (decode_hex(&hex)?, KeySource::Hex),
            (Err(_), Ok(b64)) => (decode_b64(&b64)?, KeySource::Base64),
            _ => return Err(anyhow!("no key: set CV_KEY_HEX or CV_KEY_BASE64")),
        };
        let key = into_key(raw)?;
        Ok(Self {
            inner: StaticKeyProvider::new(kid, key),
            source,
        })
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl KeyProvider for EnvKeyProvider {
    fn key(&self, kid: &str) -> Result<KeyMaterial> {
        self.inner.key(kid)
    }

    fn default_kid(&self) -> &str {
        self.inner.default_kid()
    }
}

/// Symmetric text encryption with the provider's default key.
#[derive(Clone)]
pub struct CryptoService {
    provider: Arc<dyn KeyProvider>,
}

impl CryptoService {
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self { provider }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let km = self.provider.key(self.provider.default_kid())?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&km.key)))
    }

    /// Encrypt UTF-8 text; returns base64(nonce || ct || tag).
    pub fn encrypt_aes(&self, plain: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let mut nonce = [0u8; AES_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ct = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plain.as_bytes(),
                    aad: AES_AAD,
                },
            )
            .map_err(|e| anyhow!("aes-gcm encrypt: {}", e))?;

        let mut out = Vec::with_capacity(AES_NONCE_LEN + ct.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        Ok(self.encode_base64_bytes(&out))
    }

    /// Inverse of `encrypt_aes`. Fails on bad base64, short input, wrong key or tampering.
    pub fn decrypt_aes(&self, encoded: &str) -> Result<String> {
        let raw = decode_b64(encoded)?;
        if raw.len() < AES_NONCE_LEN + 16 {
            return Err(anyhow!("ciphertext too short ({} B)", raw.len()));
        }
        let cipher = self.cipher()?;
        let (nonce, ct) = raw.split_at(AES_NONCE_LEN);
        let mut pt = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ct,
                    aad: AES_AAD,
                },
            )
            .map_err(|e| anyhow!("aes-gcm decrypt: {}", e))?;
        let text = String::from_utf8(pt.clone()).map_err(|e| anyhow!("plaintext utf8: {}", e));
        pt.zeroize();
        text
    }

    pub fn encode_base64(&self, text: &str) -> String {
        self.encode_base64_bytes(text.as_bytes())
    }

    pub fn decode_base64(&self, encoded: &str) -> Result<String> {
        let bytes = decode_b64(encoded)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("base64 payload utf8: {}", e))
    }

    fn encode_base64_bytes(&self, bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }
}

/// Generate a fresh random 32-byte key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

fn into_key(mut raw: Vec<u8>) -> Result<[u8; 32]> {
    let res = <[u8; 32]>::try_from(raw.as_slice())
        .map_err(|_| anyhow!("key must be 32 bytes, got {}", raw.len()));
    raw.zeroize();
    res
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 || !s.is_ascii() {
        return Err(anyhow!("hex key: expected an even number of hex digits"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|e| anyhow!("hex key at {}: {}", i, e))
        })
        .collect()
}

fn decode_b64(s: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|e| anyhow!("base64: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(byte: u8) -> CryptoService {
        CryptoService::new(Arc::new(StaticKeyProvider::new("t", [byte; 32])))
    }

    #[test]
    fn aes_roundtrip() {
        let c = svc(0x11);
        let ct = c.encrypt_aes("s3cr3t").expect("encrypt");
        assert_ne!(ct, "s3cr3t");
        assert_eq!(c.decrypt_aes(&ct).expect("decrypt"), "s3cr3t");
    }

    #[test]
    fn wrong_key_fails() {
        let ct = svc(0x11).encrypt_aes("x").unwrap();
        assert!(svc(0x22).decrypt_aes(&ct).is_err());
        assert!(svc(0x11).decrypt_aes("not base64 at all!").is_err());
    }

    #[test]
    fn base64_text_helpers() {
        let c = svc(0x11);
        let enc = c.encode_base64("pässword");
        assert_eq!(c.decode_base64(&enc).expect("decode"), "pässword");
        assert!(c.decode_base64("%%%").is_err());
    }

    #[test]
    fn env_provider_hex() {
        std::env::set_var("CV_KID", "dev");
        std::env::set_var("CV_KEY_HEX", "33".repeat(32));
        let p = EnvKeyProvider::from_env().expect("env provider");
        assert_eq!(p.default_kid(), "dev");
        assert_eq!(p.source(), KeySource::Hex);
        assert_eq!(p.key("dev").unwrap().key, [0x33; 32]);
    }
}
