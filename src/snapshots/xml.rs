//! XML form of a snapshot.
//!
//! <esf:configurations xmlns:esf=".." xmlns:ocd="..">
//!   <esf:configuration pid="..">
//!     <esf:properties>
//!       <esf:property name=".." array="false" encrypted="false" type="Long">
//!         <esf:value>9600</esf:value>
//!       </esf:property>
//!
//! Only pid + properties are written; definitions are not part of the format.
//! Password values are written with encrypted="true" as base64 of the stored
//! (already encrypted) text. Element prefixes are ignored on read.

use anyhow::{anyhow, Result};
use base64::Engine;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::component::ComponentConfiguration;
use crate::consts::{ESF_NAMESPACE, OCD_NAMESPACE};
use crate::error::ConfigError;
use crate::value::{Properties, Scalar, Value};

const CONFIGURATIONS: &str = "esf:configurations";
const CONFIGURATION: &str = "esf:configuration";
const PROPERTIES: &str = "esf:properties";
const PROPERTY: &str = "esf:property";
const VALUE: &str = "esf:value";

/// Marshal configurations to XML text.
pub fn marshal(configs: &[ComponentConfiguration]) -> Result<String> {
    write_configurations(configs).map_err(|e| ConfigError::Encode(format!("{:#}", e)).into())
}

/// Parse XML text produced by `marshal` (or a legacy plaintext snapshot).
pub fn unmarshal(xml: &str) -> Result<Vec<ComponentConfiguration>> {
    read_configurations(xml).map_err(|e| ConfigError::Decode(format!("{:#}", e)).into())
}

fn write_configurations(configs: &[ComponentConfiguration]) -> Result<String> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new(CONFIGURATIONS);
    root.push_attribute(("xmlns:esf", ESF_NAMESPACE));
    root.push_attribute(("xmlns:ocd", OCD_NAMESPACE));
    w.write_event(Event::Start(root))?;

    for cc in configs {
        let mut conf = BytesStart::new(CONFIGURATION);
        conf.push_attribute(("pid", cc.pid.as_str()));
        w.write_event(Event::Start(conf))?;
        w.write_event(Event::Start(BytesStart::new(PROPERTIES)))?;
        write_properties(&mut w, &cc.properties)?;
        w.write_event(Event::End(BytesEnd::new(PROPERTIES)))?;
        w.write_event(Event::End(BytesEnd::new(CONFIGURATION)))?;
    }

    w.write_event(Event::End(BytesEnd::new(CONFIGURATIONS)))?;
    String::from_utf8(w.into_inner()).map_err(|e| anyhow!("xml utf8: {}", e))
}

fn write_properties(w: &mut Writer<Vec<u8>>, props: &Properties) -> Result<()> {
    for (name, value) in props {
        // empty arrays are never written
        if value.is_array() && value.items().is_empty() {
            continue;
        }
        let ty = value.scalar_type();
        let encrypted = ty == Scalar::Password;

        let mut p = BytesStart::new(PROPERTY);
        p.push_attribute(("name", name.as_str()));
        p.push_attribute(("array", if value.is_array() { "true" } else { "false" }));
        p.push_attribute(("encrypted", if encrypted { "true" } else { "false" }));
        p.push_attribute(("type", ty.as_str()));
        w.write_event(Event::Start(p))?;

        for text in value.texts() {
            let text = if encrypted {
                base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
            } else {
                text
            };
            if text.is_empty() {
                w.write_event(Event::Empty(BytesStart::new(VALUE)))?;
            } else {
                w.write_event(Event::Start(BytesStart::new(VALUE)))?;
                w.write_event(Event::Text(BytesText::new(&text)))?;
                w.write_event(Event::End(BytesEnd::new(VALUE)))?;
            }
        }
        w.write_event(Event::End(BytesEnd::new(PROPERTY)))?;
    }
    Ok(())
}

struct PropertyState {
    name: String,
    ty: Scalar,
    array: bool,
    encrypted: bool,
    values: Vec<String>,
}

fn read_configurations(xml: &str) -> Result<Vec<ComponentConfiguration>> {
    let mut reader = Reader::from_str(xml);

    let mut out = Vec::new();
    let mut cur: Option<ComponentConfiguration> = None;
    let mut prop: Option<PropertyState> = None;
    let mut in_value = false;
    let mut buf = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"configuration" => {
                let pid = attr(&e, "pid")?.ok_or_else(|| anyhow!("configuration without pid"))?;
                cur = Some(ComponentConfiguration::new(pid, None, Properties::new()));
            }
            Event::Empty(e) if e.local_name().as_ref() == b"configuration" => {
                let pid = attr(&e, "pid")?.ok_or_else(|| anyhow!("configuration without pid"))?;
                out.push(ComponentConfiguration::new(pid, None, Properties::new()));
            }
            Event::Start(e) if e.local_name().as_ref() == b"property" => {
                prop = Some(property_state(&e)?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"value" => {
                in_value = true;
                buf.clear();
            }
            Event::Empty(e) if e.local_name().as_ref() == b"value" => {
                if let Some(p) = prop.as_mut() {
                    p.values.push(String::new());
                }
            }
            Event::Text(t) if in_value => {
                buf.push_str(&t.unescape()?);
            }
            Event::CData(t) if in_value => {
                let raw = t.into_inner();
                buf.push_str(std::str::from_utf8(&raw)?);
            }
            Event::End(e) if e.local_name().as_ref() == b"value" => {
                in_value = false;
                if let Some(p) = prop.as_mut() {
                    p.values.push(std::mem::take(&mut buf));
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"property" => {
                if let (Some(p), Some(cc)) = (prop.take(), cur.as_mut()) {
                    if let Some(v) = finish_property(&p)? {
                        cc.properties.insert(p.name, v);
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"configuration" => {
                if let Some(cc) = cur.take() {
                    out.push(cc);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn property_state(e: &BytesStart<'_>) -> Result<PropertyState> {
    let name = attr(e, "name")?.ok_or_else(|| anyhow!("property without name"))?;
    let ty_name = attr(e, "type")?.ok_or_else(|| anyhow!("property '{}' without type", name))?;
    let ty = Scalar::parse(&ty_name)
        .ok_or_else(|| anyhow!("property '{}' has unknown type '{}'", name, ty_name))?;
    let array = attr(e, "array")?.map(|s| s == "true").unwrap_or(false);
    let encrypted = attr(e, "encrypted")?.map(|s| s == "true").unwrap_or(false);
    Ok(PropertyState {
        name,
        ty,
        array,
        encrypted,
        values: Vec::new(),
    })
}

fn finish_property(p: &PropertyState) -> Result<Option<Value>> {
    // an empty value list carries nothing
    if p.values.is_empty() {
        return Ok(None);
    }
    let texts: Vec<String> = if p.encrypted {
        p.values.iter().map(|v| decode_stored(v)).collect()
    } else {
        p.values.clone()
    };
    let v = Value::parse(p.ty, p.array, &texts)
        .map_err(|e| anyhow!("property '{}': {}", p.name, e))?;
    Ok(Some(v))
}

// base64 of the stored text; anything that does not decode is kept verbatim
fn decode_stored(v: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .decode(v.trim().as_bytes())
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| v.to_string())
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| anyhow!("xml attribute: {}", err))?;
        if a.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Password, ScalarValue};

    #[test]
    fn marshal_preserves_types_and_whitespace() {
        let mut props = Properties::new();
        props.insert("s".into(), Value::from("  padded <&> "));
        props.insert("empty".into(), Value::from(""));
        props.insert("l".into(), Value::from(9600i64));
        props.insert("f".into(), Value::Scalar(ScalarValue::Float(0.1)));
        props.insert("c".into(), Value::Scalar(ScalarValue::Char('x')));
        props.insert("pw".into(), Value::password("Y2lwaGVy"));
        props.insert(
            "shorts".into(),
            Value::Array(Scalar::Short, vec![ScalarValue::Short(1), ScalarValue::Short(-1)]),
        );
        props.insert("none".into(), Value::Array(Scalar::Long, vec![]));
        let cc = ComponentConfiguration::new("a.pid", None, props);

        let xml = marshal(&[cc.clone()]).unwrap();
        assert!(xml.contains("encrypted=\"true\""));
        let back = unmarshal(&xml).unwrap();
        assert_eq!(back.len(), 1);

        let mut expected = cc.properties.clone();
        expected.remove("none");
        assert_eq!(back[0].properties, expected);
        assert_eq!(
            back[0].properties["pw"],
            Value::Scalar(ScalarValue::Password(Password::new("Y2lwaGVy")))
        );
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let xml = r#"<esf:configurations xmlns:esf="x"><esf:configuration pid="p"><esf:properties>
<esf:property name="n" array="false" encrypted="false" type="Matrix"><esf:value>1</esf:value></esf:property>
</esf:properties></esf:configuration></esf:configurations>"#;
        let err = unmarshal(xml).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Decode(_))
        ));
    }
}
