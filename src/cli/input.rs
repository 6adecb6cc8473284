//! JSON input files for the `run` command.
//!
//! Schema files hold an array of attribute definitions:
//! `{"ident": "person/age", "valueType": "long", "cardinality": "one",
//! "unique": "identity", "doc": "..."}`.
//!
//! Transaction files hold an array of operations. An assertion is a map of
//! attribute to value with an optional `"db/id"` (a temp-id string or an
//! entity id); arrays give several values. A retraction is
//! `{"retract": [entity, "attribute", value]}`. Values map as JSON strings to
//! strings, integers to longs, `{"tempid": "x"}` to a temp-id reference,
//! `{"ref": 12}` to an entity and `{"inst": "2024-01-01T00:00:00Z"}` to an
//! instant.

use crate::core::fact::EntityId;
use crate::core::temporal::Timestamp;
use crate::core::transaction::{AttrValue, EntityRef, TxOp, ValueSpec};
use crate::core::value::{Value, ValueType};
use crate::error::{Error, Result};
use crate::schema::{Attribute, Cardinality, Uniqueness};
use serde::Deserialize;
use serde_json::Value as Json;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AttributeDef {
    ident: String,
    value_type: String,
    #[serde(default)]
    cardinality: Option<String>,
    #[serde(default)]
    unique: Option<String>,
    #[serde(default)]
    doc: Option<String>,
}

impl AttributeDef {
    fn into_attribute(self) -> Result<Attribute> {
        let value_type = keyword(&self.value_type, "db.type/")
            .as_deref()
            .and_then(ValueType::from_keyword)
            .ok_or_else(|| invalid(format!("unknown value type {:?}", self.value_type)))?;

        let cardinality = match self.cardinality.as_deref() {
            None => Cardinality::One,
            Some(raw) => keyword(raw, "db.cardinality/")
                .as_deref()
                .and_then(Cardinality::from_keyword)
                .ok_or_else(|| invalid(format!("unknown cardinality {:?}", raw)))?,
        };

        let unique = match self.unique.as_deref() {
            None => Uniqueness::None,
            Some(raw) => keyword(raw, "db.unique/")
                .as_deref()
                .and_then(Uniqueness::from_keyword)
                .ok_or_else(|| invalid(format!("unknown uniqueness {:?}", raw)))?,
        };

        let mut attribute = Attribute::new(self.ident.trim_start_matches(':'), value_type)
            .cardinality(cardinality);
        if unique == Uniqueness::Identity {
            attribute = attribute.unique_identity();
        }
        if let Some(doc) = self.doc {
            attribute = attribute.doc(doc);
        }
        Ok(attribute)
    }
}

/// Accept `long`, `:db.type/long` and `db.type/long` alike
fn keyword(raw: &str, namespace: &str) -> Option<String> {
    let raw = raw.trim_start_matches(':');
    if raw.is_empty() {
        None
    } else if raw.starts_with(namespace) {
        Some(raw.to_string())
    } else {
        Some(format!("{}{}", namespace, raw))
    }
}

fn invalid(message: String) -> Error {
    Error::Serialization(message)
}

/// Parse attribute definitions from JSON text
pub fn parse_schema(text: &str) -> Result<Vec<Attribute>> {
    let defs: Vec<AttributeDef> = serde_json::from_str(text)?;
    defs.into_iter().map(AttributeDef::into_attribute).collect()
}

/// Parse transaction operations from JSON text
pub fn parse_transaction(text: &str) -> Result<Vec<TxOp>> {
    let ops: Vec<Json> = serde_json::from_str(text)?;
    ops.iter()
        .enumerate()
        .map(|(position, op)| parse_op(position, op))
        .collect()
}

pub fn load_schema(path: &Path) -> Result<Vec<Attribute>> {
    parse_schema(&fs::read_to_string(path)?)
}

pub fn load_transaction(path: &Path) -> Result<Vec<TxOp>> {
    parse_transaction(&fs::read_to_string(path)?)
}

/// Assertions without `db/id` get a temp-id named after their position
fn parse_op(position: usize, op: &Json) -> Result<TxOp> {
    let map = op
        .as_object()
        .ok_or_else(|| invalid(format!("operation must be an object, got {}", op)))?;

    if let Some(retract) = map.get("retract") {
        return match retract.as_array().map(Vec::as_slice) {
            Some([entity, Json::String(attribute), value]) => Ok(TxOp::Retract {
                entity: parse_entity(entity)?,
                attribute: attribute.trim_start_matches(':').to_string(),
                value: parse_value(value)?,
            }),
            _ => Err(invalid(format!(
                "retract expects [entity, attribute, value], got {}",
                retract
            ))),
        };
    }

    let entity = match map.get("db/id") {
        Some(id) => parse_entity(id)?,
        None => EntityRef::temp(format!("#{}", position)),
    };

    let mut attributes = Vec::new();
    for (key, value) in map.iter().filter(|(k, _)| k.as_str() != "db/id") {
        let value = match value {
            Json::Array(items) => AttrValue::Many(
                items
                    .iter()
                    .map(parse_value)
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => AttrValue::One(parse_value(other)?),
        };
        attributes.push((key.trim_start_matches(':').to_string(), value));
    }
    Ok(TxOp::Assert { entity, attributes })
}

fn parse_entity(entity: &Json) -> Result<EntityRef> {
    match entity {
        Json::String(name) => Ok(EntityRef::temp(name.as_str())),
        Json::Number(n) => n
            .as_u64()
            .map(|id| EntityRef::Id(EntityId(id)))
            .ok_or_else(|| invalid(format!("invalid entity id {}", n))),
        other => Err(invalid(format!("invalid entity {}", other))),
    }
}

fn parse_value(value: &Json) -> Result<ValueSpec> {
    match value {
        Json::String(s) => Ok(ValueSpec::Value(Value::from(s.as_str()))),
        Json::Number(n) => n
            .as_i64()
            .map(|n| ValueSpec::Value(Value::Long(n)))
            .ok_or_else(|| invalid(format!("only integer numbers are supported, got {}", n))),
        Json::Object(map) if map.len() == 1 => {
            match map.iter().next() {
                Some((tag, Json::String(name))) if tag == "tempid" => {
                    Ok(ValueSpec::Temp(name.clone()))
                }
                Some((tag, Json::Number(n))) if tag == "ref" => n
                    .as_u64()
                    .map(|id| ValueSpec::Value(Value::Ref(EntityId(id))))
                    .ok_or_else(|| invalid(format!("invalid entity id {}", n))),
                Some((tag, Json::String(s))) if tag == "inst" => Timestamp::parse_rfc3339(s)
                    .map(|ts| ValueSpec::Value(Value::Instant(ts)))
                    .ok_or_else(|| invalid(format!("invalid instant {:?}", s))),
                _ => Err(invalid(format!("unsupported value {}", value))),
            }
        }
        other => Err(invalid(format!("unsupported value {}", other))),
    }
}

/// JSON rendering of a query result value
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Long(n) => Json::from(*n),
        Value::Ref(e) => Json::from(e.0),
        Value::Instant(ts) => Json::String(ts.to_string()),
    }
}
