//! Metatype: object class definitions (OCD) and attribute definitions (AD).
//!
//! An OCD is the schema of one component's configuration. Each AD declares id,
//! type, cardinality, required flag, default (comma separated for arrays, "\,"
//! escapes a comma) and optional min/max/options/pattern constraints.
//!
//! `parse_metatype` reads the usual metatype XML layout:
//!   <MetaData><OCD id=".." name=".."><AD id=".." type="Integer" .../></OCD></MetaData>

use anyhow::{anyhow, Context, Result};
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::crypto::PasswordCodec;
use crate::value::{Properties, Scalar, ScalarValue, Value};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AttributeOption {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AttributeDefinition {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub ty: Scalar,
    /// 0, 1 and -1 mean a single value; otherwise |n| is the max element count.
    pub cardinality: i32,
    pub required: bool,
    pub default: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub options: Vec<AttributeOption>,
    pub pattern: Option<String>,
}

impl AttributeDefinition {
    pub fn new<S: Into<String>>(id: S, ty: Scalar) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            ty,
            cardinality: 0,
            required: false,
            default: None,
            min: None,
            max: None,
            options: Vec::new(),
            pattern: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_required(mut self, on: bool) -> Self {
        self.required = on;
        self
    }

    pub fn with_default<S: Into<String>>(mut self, d: S) -> Self {
        self.default = Some(d.into());
        self
    }

    pub fn with_cardinality(mut self, n: i32) -> Self {
        self.cardinality = n;
        self
    }

    pub fn with_min<S: Into<String>>(mut self, v: S) -> Self {
        self.min = Some(v.into());
        self
    }

    pub fn with_max<S: Into<String>>(mut self, v: S) -> Self {
        self.max = Some(v.into());
        self
    }

    pub fn with_option<S: Into<String>>(mut self, label: S, value: S) -> Self {
        self.options.push(AttributeOption {
            label: label.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_pattern<S: Into<String>>(mut self, p: S) -> Self {
        self.pattern = Some(p.into());
        self
    }

    pub fn is_array(&self) -> bool {
        !matches!(self.cardinality, 0 | 1 | -1)
    }

    /// Typed default value, or None if the AD declares none (or it does not parse).
    /// Password defaults are encrypted when a codec is given; on failure they stay plain.
    pub fn default_value(&self, codec: Option<&PasswordCodec>) -> Option<Value> {
        let raw = self.default.as_deref().filter(|d| !d.is_empty())?;
        let texts = if self.is_array() {
            split_values(raw)
        } else {
            vec![raw.to_string()]
        };

        let mut items = Vec::with_capacity(texts.len());
        for t in &texts {
            match ScalarValue::parse(self.ty, t) {
                Ok(ScalarValue::Password(pw)) => {
                    let enc = codec
                        .and_then(|c| c.encrypt_password(&pw).ok())
                        .unwrap_or(pw);
                    items.push(ScalarValue::Password(enc));
                }
                Ok(v) => items.push(v),
                Err(e) => {
                    warn!("bad default for attribute '{}': {}", self.id, e);
                    return None;
                }
            }
        }

        if self.is_array() {
            Some(Value::Array(self.ty, items))
        } else {
            items.into_iter().next().map(Value::Scalar)
        }
    }

    /// Validate a value against this definition. `None` means valid.
    /// Password values are not checked (they are ciphertext at this point).
    pub fn validate(&self, value: &Value) -> Option<String> {
        if self.ty == Scalar::Password {
            return None;
        }

        let texts = value.texts();
        if self.is_array() {
            let max = self.cardinality.unsigned_abs() as usize;
            if self.cardinality != i32::MAX && texts.len() > max {
                return Some(format!(
                    "too many values: {} (cardinality {})",
                    texts.len(),
                    self.cardinality
                ));
            }
        } else if texts.len() > 1 {
            return Some(format!("expected a single value, got {}", texts.len()));
        }

        let pattern = match self.pattern.as_deref() {
            Some(p) => match Regex::new(&format!("^(?:{})$", p)) {
                Ok(re) => Some(re),
                Err(e) => return Some(format!("invalid pattern '{}': {}", p, e)),
            },
            None => None,
        };

        for text in &texts {
            let parsed = match ScalarValue::parse(self.ty, text) {
                Ok(v) => v,
                Err(e) => return Some(e.to_string()),
            };
            if let Some(msg) = self.check_bounds(&parsed, text) {
                return Some(msg);
            }
            if !self.options.is_empty() && !self.options.iter().any(|o| &o.value == text) {
                return Some(format!("'{}' is not one of the allowed options", text));
            }
            if let Some(re) = &pattern {
                if !re.is_match(text) {
                    return Some(format!("'{}' does not match pattern", text));
                }
            }
        }
        None
    }

    fn check_bounds(&self, parsed: &ScalarValue, text: &str) -> Option<String> {
        // Strings: min/max bound the length.
        let (n, what) = match parsed.as_f64() {
            Some(n) => (n, "value"),
            None if self.ty == Scalar::String => (text.chars().count() as f64, "length"),
            None => return None,
        };
        if let Some(min) = self.min.as_deref().and_then(|m| m.trim().parse::<f64>().ok()) {
            if n < min {
                return Some(format!("{} {} is below minimum {}", what, n, min));
            }
        }
        if let Some(max) = self.max.as_deref().and_then(|m| m.trim().parse::<f64>().ok()) {
            if n > max {
                return Some(format!("{} {} is above maximum {}", what, n, max));
            }
        }
        None
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ObjectClassDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub ads: Vec<AttributeDefinition>,
}

impl ObjectClassDefinition {
    pub fn new<S: Into<String>>(id: S, name: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            ads: Vec::new(),
        }
    }

    pub fn with_ad(mut self, ad: AttributeDefinition) -> Self {
        self.ads.push(ad);
        self
    }

    pub fn ad(&self, id: &str) -> Option<&AttributeDefinition> {
        self.ads.iter().find(|a| a.id == id)
    }

    /// Defaults of every AD that declares one. First definition of an id wins.
    pub fn default_properties(&self, codec: Option<&PasswordCodec>) -> Properties {
        let mut out = Properties::new();
        for ad in &self.ads {
            if out.contains_key(&ad.id) {
                continue;
            }
            if let Some(v) = ad.default_value(codec) {
                out.insert(ad.id.clone(), v);
            }
        }
        out
    }
}

/// Split a comma-separated default, honouring "\," escapes. Elements are trimmed.
pub fn split_values(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                cur.push(',');
                chars.next();
            }
            ',' => {
                out.push(cur.trim().to_string());
                cur.clear();
            }
            _ => cur.push(c),
        }
    }
    out.push(cur.trim().to_string());
    out
}

/// Parse a metatype XML document into its OCDs.
pub fn parse_metatype(xml: &str) -> Result<Vec<ObjectClassDefinition>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut ocds = Vec::new();
    let mut cur_ocd: Option<ObjectClassDefinition> = None;
    let mut cur_ad: Option<AttributeDefinition> = None;

    loop {
        let ev = reader
            .read_event()
            .with_context(|| format!("metatype xml at {}", reader.buffer_position()))?;
        match ev {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"OCD" => {
                let id = attr(&e, "id")?.ok_or_else(|| anyhow!("OCD without id"))?;
                let name = attr(&e, "name")?.unwrap_or_else(|| id.clone());
                let mut ocd = ObjectClassDefinition::new(id, name);
                ocd.description = attr(&e, "description")?;
                if let Some(prev) = cur_ocd.replace(ocd) {
                    ocds.push(prev);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"AD" => {
                cur_ad = Some(parse_ad(&e)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"AD" => {
                let ad = parse_ad(&e)?;
                push_ad(&mut cur_ocd, ad)?;
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Option" => {
                let ad = cur_ad
                    .as_mut()
                    .ok_or_else(|| anyhow!("Option outside of AD"))?;
                let label = attr(&e, "label")?.unwrap_or_default();
                let value = attr(&e, "value")?.unwrap_or_default();
                ad.options.push(AttributeOption { label, value });
            }
            Event::End(e) if e.local_name().as_ref() == b"AD" => {
                if let Some(ad) = cur_ad.take() {
                    push_ad(&mut cur_ocd, ad)?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"OCD" => {
                if let Some(ocd) = cur_ocd.take() {
                    ocds.push(ocd);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if let Some(ocd) = cur_ocd.take() {
        ocds.push(ocd);
    }
    Ok(ocds)
}

fn push_ad(ocd: &mut Option<ObjectClassDefinition>, ad: AttributeDefinition) -> Result<()> {
    let ocd = ocd
        .as_mut()
        .ok_or_else(|| anyhow!("AD '{}' outside of OCD", ad.id))?;
    ocd.ads.push(ad);
    Ok(())
}

fn parse_ad(e: &BytesStart<'_>) -> Result<AttributeDefinition> {
    let id = attr(e, "id")?.ok_or_else(|| anyhow!("AD without id"))?;
    let ty_name = attr(e, "type")?.ok_or_else(|| anyhow!("AD '{}' without type", id))?;
    let ty = Scalar::parse(&ty_name)
        .ok_or_else(|| anyhow!("AD '{}' has unknown type '{}'", id, ty_name))?;

    let mut ad = AttributeDefinition::new(id, ty);
    ad.name = attr(e, "name")?;
    ad.description = attr(e, "description")?;
    ad.default = attr(e, "default")?;
    ad.min = attr(e, "min")?;
    ad.max = attr(e, "max")?;
    ad.pattern = attr(e, "pattern")?;
    if let Some(c) = attr(e, "cardinality")? {
        ad.cardinality = c
            .trim()
            .parse()
            .map_err(|err| anyhow!("AD '{}' cardinality '{}': {}", ad.id, c, err))?;
    }
    // OSGi default for "required" is true
    ad.required = attr(e, "required")?
        .map(|r| r.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    Ok(ad)
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| anyhow!("xml attribute: {}", err))?;
        if a.key.local_name().as_ref() == name.as_bytes() {
            let v = a
                .unescape_value()
                .map_err(|err| anyhow!("xml attribute '{}': {}", name, err))?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}
