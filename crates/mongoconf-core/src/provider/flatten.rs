//! Document flattening
//!
//! Turns one BSON document into `(key, value)` pairs. The `_id` field is
//! always dropped, field selection applies to top-level names only, and every
//! value is rendered as text through [`ConfigValue::from_bson`].

use bson::{Bson, Document};
use serde_json::Value;

use super::options::{MongoConfigOptions, NestedValues};
use crate::config::KEY_DELIMITER;

/// Name of the primary identifier field
pub const ID_FIELD: &str = "_id";

/// Text form of one field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Literal text of a scalar
    Scalar(String),
    /// Compact JSON of a document or array
    Composite(String),
}

impl ConfigValue {
    /// Render a BSON value
    ///
    /// Documents and arrays become compact relaxed Extended JSON, fields in
    /// document order, so the same stored document always renders the same
    /// text. Scalars use
    /// their natural text: strings verbatim, numbers in decimal, booleans as
    /// `true`/`false`, null as an empty string, ObjectIds as hex and dates as
    /// RFC 3339. Anything else falls back to its Extended JSON text.
    pub fn from_bson(value: &Bson) -> Self {
        match value {
            Bson::String(s) => ConfigValue::Scalar(s.clone()),
            Bson::Int32(v) => ConfigValue::Scalar(v.to_string()),
            Bson::Int64(v) => ConfigValue::Scalar(v.to_string()),
            Bson::Double(v) => ConfigValue::Scalar(v.to_string()),
            Bson::Boolean(v) => ConfigValue::Scalar(v.to_string()),
            Bson::Null | Bson::Undefined => ConfigValue::Scalar(String::new()),
            Bson::ObjectId(oid) => ConfigValue::Scalar(oid.to_hex()),
            Bson::DateTime(dt) => ConfigValue::Scalar(
                dt.try_to_rfc3339_string()
                    .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
            ),
            Bson::Decimal128(_) => match extended_json(value) {
                Value::Object(mut fields) => match fields.remove("$numberDecimal") {
                    Some(Value::String(text)) => ConfigValue::Scalar(text),
                    _ => ConfigValue::Scalar(Value::Object(fields).to_string()),
                },
                other => ConfigValue::Scalar(other.to_string()),
            },
            Bson::Document(_) | Bson::Array(_) => {
                ConfigValue::Composite(extended_json(value).to_string())
            }
            other => ConfigValue::Scalar(extended_json(other).to_string()),
        }
    }

    /// The rendered text
    pub fn as_str(&self) -> &str {
        match self {
            ConfigValue::Scalar(s) | ConfigValue::Composite(s) => s,
        }
    }

    /// Consume into the rendered text
    pub fn into_string(self) -> String {
        match self {
            ConfigValue::Scalar(s) | ConfigValue::Composite(s) => s,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, ConfigValue::Composite(_))
    }
}

fn extended_json(value: &Bson) -> Value {
    value.clone().into_relaxed_extjson()
}

/// Flatten one document into `(key, value)` pairs, in field order
pub fn flatten_document(document: &Document, options: &MongoConfigOptions) -> Vec<(String, String)> {
    let selection = options.key_selection();
    let mut entries = Vec::with_capacity(document.len());

    for (name, value) in document {
        if name == ID_FIELD || !selection.includes(name) {
            continue;
        }
        match options.nested_values() {
            NestedValues::Serialize => {
                entries.push((name.clone(), ConfigValue::from_bson(value).into_string()));
            }
            NestedValues::Expand => expand(name, value, &mut entries),
        }
    }

    entries
}

fn expand(key: &str, value: &Bson, entries: &mut Vec<(String, String)>) {
    match value {
        Bson::Document(inner) if !inner.is_empty() => {
            for (name, child) in inner {
                expand(&format!("{}{}{}", key, KEY_DELIMITER, name), child, entries);
            }
        }
        Bson::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                expand(&format!("{}{}{}", key, KEY_DELIMITER, index), child, entries);
            }
        }
        Bson::Document(_) | Bson::Array(_) => entries.push((key.to_string(), String::new())),
        scalar => entries.push((key.to_string(), ConfigValue::from_bson(scalar).into_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::KeySelection;
    use bson::{doc, oid::ObjectId};

    fn read_all() -> MongoConfigOptions {
        MongoConfigOptions::all_keys_all_documents("mongodb://localhost", "db", "settings").unwrap()
    }

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(ConfigValue::from_bson(&Bson::from("text")), ConfigValue::Scalar("text".into()));
        assert_eq!(ConfigValue::from_bson(&Bson::Int32(42)).as_str(), "42");
        assert_eq!(ConfigValue::from_bson(&Bson::Int64(-7)).as_str(), "-7");
        assert_eq!(ConfigValue::from_bson(&Bson::Double(1.5)).as_str(), "1.5");
        assert_eq!(ConfigValue::from_bson(&Bson::Boolean(true)).as_str(), "true");
        assert_eq!(ConfigValue::from_bson(&Bson::Null).as_str(), "");

        let oid = ObjectId::parse_str("65f1a2b3c4d5e6f708091a2b").unwrap();
        assert_eq!(
            ConfigValue::from_bson(&Bson::ObjectId(oid)).as_str(),
            "65f1a2b3c4d5e6f708091a2b"
        );
    }

    #[test]
    fn test_decimal_rendering() {
        let decimal: bson::Decimal128 = "1234.5".parse().unwrap();
        assert_eq!(ConfigValue::from_bson(&Bson::Decimal128(decimal)).as_str(), "1234.5");
    }

    #[test]
    fn test_date_rendering() {
        let dt = bson::DateTime::from_millis(0);
        assert_eq!(
            ConfigValue::from_bson(&Bson::DateTime(dt)).as_str(),
            "1970-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_composite_rendering_is_compact_json() {
        let value = Bson::Document(doc! { "host": "db1", "port": 27017 });
        let rendered = ConfigValue::from_bson(&value);
        assert!(rendered.is_composite());
        assert_eq!(rendered.as_str(), r#"{"host":"db1","port":27017}"#);

        let parsed: Value = serde_json::from_str(rendered.as_str()).unwrap();
        assert_eq!(parsed["port"], 27017);

        let list = ConfigValue::from_bson(&Bson::Array(vec![Bson::from("a"), Bson::Int32(1)]));
        assert_eq!(list, ConfigValue::Composite(r#"["a",1]"#.to_string()));
    }

    #[test]
    fn test_flatten_drops_id_and_keeps_order() {
        let document = doc! { "_id": 1, "zeta": "z", "alpha": 2, "db": { "port": 1 } };
        let entries = flatten_document(&document, &read_all());
        assert_eq!(
            entries,
            vec![
                ("zeta".to_string(), "z".to_string()),
                ("alpha".to_string(), "2".to_string()),
                ("db".to_string(), r#"{"port":1}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_flatten_defined_keys() {
        let options = MongoConfigOptions::defined_keys_all_documents(
            "mongodb://localhost",
            "db",
            "settings",
            ["KEY1", "key9"],
        )
        .unwrap();
        let document = doc! { "_id": 1, "key1": "A", "key2": "B" };
        assert_eq!(
            flatten_document(&document, &options),
            vec![("key1".to_string(), "A".to_string())]
        );
    }

    #[test]
    fn test_flatten_expand_nested_values() {
        let options = MongoConfigOptions::new(
            "mongodb://localhost",
            "db",
            "settings",
            KeySelection::ReadAll,
            None,
            NestedValues::Expand,
        )
        .unwrap();
        let document = doc! {
            "_id": 1,
            "logging": { "level": { "default": "info" }, "sinks": ["console", "file"] },
            "empty": {},
            "flag": false,
        };
        assert_eq!(
            flatten_document(&document, &options),
            vec![
                ("logging:level:default".to_string(), "info".to_string()),
                ("logging:sinks:0".to_string(), "console".to_string()),
                ("logging:sinks:1".to_string(), "file".to_string()),
                ("empty".to_string(), String::new()),
                ("flag".to_string(), "false".to_string()),
            ]
        );
    }
}
