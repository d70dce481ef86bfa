//! Field-level encryption of password properties.
//!
//! Policy:
//! - encrypt(): a password that fails to encrypt is dropped from the map,
//!   never left in plaintext.
//! - decrypt(): never fails; values that do not decrypt stay as they are.
//! - is_encrypted(): checked by attempting decryption (no format tag).

use log::warn;
use std::sync::Arc;

use super::CryptoService;
use crate::consts::PASSWORD_PLACEHOLDER;
use crate::value::{Password, Properties, ScalarValue, Value};

#[derive(Clone)]
pub struct PasswordCodec {
    crypto: Arc<CryptoService>,
}

impl PasswordCodec {
    pub fn new(crypto: Arc<CryptoService>) -> Self {
        Self { crypto }
    }

    pub fn is_placeholder(pw: &Password) -> bool {
        pw.as_str() == PASSWORD_PLACEHOLDER
    }

    pub fn is_encrypted(&self, pw: &Password) -> bool {
        self.crypto.decrypt_aes(pw.as_str()).is_ok()
    }

    /// Encrypt one password; already-encrypted values and the placeholder pass through.
    pub fn encrypt_password(&self, pw: &Password) -> anyhow::Result<Password> {
        if Self::is_placeholder(pw) || self.is_encrypted(pw) {
            return Ok(pw.clone());
        }
        Ok(Password::new(self.crypto.encrypt_aes(pw.as_str())?))
    }

    /// Decrypt one password; on failure the input is returned unchanged.
    pub fn decrypt_password(&self, pw: &Password) -> Password {
        match self.crypto.decrypt_aes(pw.as_str()) {
            Ok(plain) => Password::new(plain),
            Err(_) => pw.clone(),
        }
    }

    pub fn encrypt(&self, props: &mut Properties) {
        let keys: Vec<String> = props.keys().cloned().collect();
        for key in keys {
            let Some(value) = props.get(&key) else {
                continue;
            };
            if value.scalar_type() != crate::value::Scalar::Password {
                continue;
            }
            match self.encrypt_value(value) {
                Ok(v) => {
                    props.insert(key, v);
                }
                Err(e) => {
                    warn!("failed to encrypt password property '{}': {}", key, e);
                    props.remove(&key);
                }
            }
        }
    }

    pub fn decrypt(&self, props: &mut Properties) {
        for value in props.values_mut() {
            if value.scalar_type() != crate::value::Scalar::Password {
                continue;
            }
            *value = map_passwords(value, |pw| self.decrypt_password(pw));
        }
    }

    /// Replace every password with the placeholder.
    pub fn mask(props: &mut Properties) {
        for value in props.values_mut() {
            if value.scalar_type() == crate::value::Scalar::Password {
                *value = map_passwords(value, |_| Password::new(PASSWORD_PLACEHOLDER));
            }
        }
    }

    fn encrypt_value(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Scalar(ScalarValue::Password(pw)) => {
                Ok(Value::Scalar(ScalarValue::Password(self.encrypt_password(pw)?)))
            }
            Value::Array(ty, items) => {
                let mut out = Vec::with_capacity(items.len());
                for it in items {
                    match it {
                        ScalarValue::Password(pw) => {
                            out.push(ScalarValue::Password(self.encrypt_password(pw)?))
                        }
                        other => out.push(other.clone()),
                    }
                }
                Ok(Value::Array(*ty, out))
            }
            other => Ok(other.clone()),
        }
    }
}

fn map_passwords<F: Fn(&Password) -> Password>(value: &Value, f: F) -> Value {
    let conv = |v: &ScalarValue| match v {
        ScalarValue::Password(pw) => ScalarValue::Password(f(pw)),
        other => other.clone(),
    };
    match value {
        Value::Scalar(v) => Value::Scalar(conv(v)),
        Value::Array(ty, items) => Value::Array(*ty, items.iter().map(conv).collect()),
    }
}
