//! Typed configuration values.
//!
//! A property is either a single `ScalarValue` or a homogeneous array of them.
//! `Password` carries credential text; what it holds at rest is ciphertext,
//! and it never shows up in `Debug` output.

use anyhow::{anyhow, Result};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroize;

/// Property map of a component configuration.
pub type Properties = BTreeMap<String, Value>;

/// Type tag of a value. Names match the XML `type` attribute and metatype AD types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Scalar {
    String,
    Long,
    Double,
    Float,
    Integer,
    Byte,
    Char,
    Boolean,
    Short,
    Password,
}

impl Scalar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scalar::String => "String",
            Scalar::Long => "Long",
            Scalar::Double => "Double",
            Scalar::Float => "Float",
            Scalar::Integer => "Integer",
            Scalar::Byte => "Byte",
            Scalar::Char => "Char",
            Scalar::Boolean => "Boolean",
            Scalar::Short => "Short",
            Scalar::Password => "Password",
        }
    }

    /// Parse a type name. Case-insensitive, so both `Integer` and `integer` work.
    pub fn parse(name: &str) -> Option<Scalar> {
        let n = name.trim().to_ascii_lowercase();
        let s = match n.as_str() {
            "string" => Scalar::String,
            "long" => Scalar::Long,
            "double" => Scalar::Double,
            "float" => Scalar::Float,
            "integer" => Scalar::Integer,
            "byte" => Scalar::Byte,
            "char" => Scalar::Char,
            "boolean" => Scalar::Boolean,
            "short" => Scalar::Short,
            "password" => Scalar::Password,
            _ => return None,
        };
        Some(s)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential value. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Password(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Serialize for Password {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    String(String),
    Long(i64),
    Double(f64),
    Float(f32),
    Integer(i32),
    Byte(i8),
    Char(char),
    Boolean(bool),
    Short(i16),
    Password(Password),
}

impl ScalarValue {
    pub fn scalar(&self) -> Scalar {
        match self {
            ScalarValue::String(_) => Scalar::String,
            ScalarValue::Long(_) => Scalar::Long,
            ScalarValue::Double(_) => Scalar::Double,
            ScalarValue::Float(_) => Scalar::Float,
            ScalarValue::Integer(_) => Scalar::Integer,
            ScalarValue::Byte(_) => Scalar::Byte,
            ScalarValue::Char(_) => Scalar::Char,
            ScalarValue::Boolean(_) => Scalar::Boolean,
            ScalarValue::Short(_) => Scalar::Short,
            ScalarValue::Password(_) => Scalar::Password,
        }
    }

    /// Parse the textual form of a value of type `ty`.
    pub fn parse(ty: Scalar, text: &str) -> Result<ScalarValue> {
        let v = match ty {
            Scalar::String => ScalarValue::String(text.to_string()),
            Scalar::Long => ScalarValue::Long(
                text.trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid Long '{}': {}", text, e))?,
            ),
            Scalar::Double => ScalarValue::Double(
                text.trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid Double '{}': {}", text, e))?,
            ),
            Scalar::Float => ScalarValue::Float(
                text.trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid Float '{}': {}", text, e))?,
            ),
            Scalar::Integer => ScalarValue::Integer(
                text.trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid Integer '{}': {}", text, e))?,
            ),
            Scalar::Byte => ScalarValue::Byte(
                text.trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid Byte '{}': {}", text, e))?,
            ),
            Scalar::Char => ScalarValue::Char(
                text.chars()
                    .next()
                    .ok_or_else(|| anyhow!("empty Char value"))?,
            ),
            Scalar::Boolean => ScalarValue::Boolean(text.trim().eq_ignore_ascii_case("true")),
            Scalar::Short => ScalarValue::Short(
                text.trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid Short '{}': {}", text, e))?,
            ),
            Scalar::Password => ScalarValue::Password(Password::new(text)),
        };
        Ok(v)
    }

    /// Textual form (as stored in XML). Passwords yield their stored text.
    pub fn to_text(&self) -> String {
        match self {
            ScalarValue::String(s) => s.clone(),
            ScalarValue::Long(v) => v.to_string(),
            ScalarValue::Double(v) => v.to_string(),
            ScalarValue::Float(v) => v.to_string(),
            ScalarValue::Integer(v) => v.to_string(),
            ScalarValue::Byte(v) => v.to_string(),
            ScalarValue::Char(c) => c.to_string(),
            ScalarValue::Boolean(b) => b.to_string(),
            ScalarValue::Short(v) => v.to_string(),
            ScalarValue::Password(p) => p.as_str().to_string(),
        }
    }

    /// Numeric view used for min/max checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Long(v) => Some(*v as f64),
            ScalarValue::Double(v) => Some(*v),
            ScalarValue::Float(v) => Some(*v as f64),
            ScalarValue::Integer(v) => Some(*v as f64),
            ScalarValue::Byte(v) => Some(*v as f64),
            ScalarValue::Short(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// A property value: one scalar, or an array whose elements share one type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(ScalarValue),
    Array(Scalar, Vec<ScalarValue>),
}

impl Value {
    /// Build an array, checking that every element has type `ty`.
    pub fn array(ty: Scalar, items: Vec<ScalarValue>) -> Result<Value> {
        if let Some(bad) = items.iter().find(|v| v.scalar() != ty) {
            return Err(anyhow!(
                "array of {} contains a {} element",
                ty,
                bad.scalar()
            ));
        }
        Ok(Value::Array(ty, items))
    }

    pub fn password<S: Into<String>>(s: S) -> Value {
        Value::Scalar(ScalarValue::Password(Password::new(s)))
    }

    pub fn scalar_type(&self) -> Scalar {
        match self {
            Value::Scalar(v) => v.scalar(),
            Value::Array(ty, _) => *ty,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(..))
    }

    /// Elements as a slice (a scalar is a one-element view).
    pub fn items(&self) -> &[ScalarValue] {
        match self {
            Value::Scalar(v) => std::slice::from_ref(v),
            Value::Array(_, items) => items,
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.items().iter().map(|v| v.to_text()).collect()
    }

    /// Parse textual values into a scalar (first text) or an array.
    pub fn parse(ty: Scalar, array: bool, texts: &[String]) -> Result<Value> {
        if array {
            let items = texts
                .iter()
                .map(|t| ScalarValue::parse(ty, t))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(ty, items))
        } else {
            let first = texts
                .first()
                .ok_or_else(|| anyhow!("missing value for scalar {}", ty))?;
            Ok(Value::Scalar(ScalarValue::parse(ty, first)?))
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(v) => v.serialize(s),
            Value::Array(_, items) => {
                let mut seq = s.serialize_seq(Some(items.len()))?;
                for it in items {
                    seq.serialize_element(it)?;
                }
                seq.end()
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(ScalarValue::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(ScalarValue::String(s))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Scalar(ScalarValue::Long(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Scalar(ScalarValue::Integer(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Scalar(ScalarValue::Short(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(ScalarValue::Double(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(ScalarValue::Boolean(v))
    }
}

impl From<Password> for Value {
    fn from(p: Password) -> Self {
        Value::Scalar(ScalarValue::Password(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_text_agree() {
        let v = Value::parse(Scalar::Float, false, &["1.5".to_string()]).unwrap();
        assert_eq!(v, Value::Scalar(ScalarValue::Float(1.5)));
        assert_eq!(v.texts(), vec!["1.5".to_string()]);

        let arr = Value::parse(Scalar::Short, true, &["1".into(), "-2".into()]).unwrap();
        assert_eq!(arr.scalar_type(), Scalar::Short);
        assert_eq!(arr.items().len(), 2);
    }

    #[test]
    fn password_debug_is_redacted() {
        let v = Value::password("hunter2");
        assert!(!format!("{:?}", v).contains("hunter2"));
    }

    #[test]
    fn mixed_array_is_rejected() {
        let r = Value::array(
            Scalar::Long,
            vec![ScalarValue::Long(1), ScalarValue::Integer(2)],
        );
        assert!(r.is_err());
    }
}
