//! Generic value representation and the optional typed layer on top of it.
//!
//! Every encode/decode goes through [`Value`].  Union values are untagged:
//! the encoder picks the branch from the value's kind, and the decoder hands
//! back the branch value directly, so `{"sex": null}` and `{"sex": "M"}`
//! are both plain record fields.
//!
//! Strongly-typed structs implement [`SpecificRecord`] to convert to and
//! from [`Record`]; the container reader/writer accept them directly.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::schema::{resolve, Names, Schema};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Record(Record),
    /// Enum symbol; its index is a property of the schema, not the value.
    Enum(String),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
    Fixed(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null       => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_)     => "int",
            Value::Long(_)    => "long",
            Value::Float(_)   => "float",
            Value::Double(_)  => "double",
            Value::Bytes(_)   => "bytes",
            Value::String(_)  => "string",
            Value::Record(_)  => "record",
            Value::Enum(_)    => "enum",
            Value::Array(_)   => "array",
            Value::Map(_)     => "map",
            Value::Fixed(_)   => "fixed",
        }
    }

    /// Array value from anything convertible element-wise.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _                => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Value::Record(r) => Some(r),
            _                => None,
        }
    }

    /// Convert a JSON default under `schema`.  Bytes and fixed defaults are
    /// strings whose code points 0–255 are the byte values; a union default
    /// belongs to the first branch.
    pub(crate) fn from_json(schema: &Schema, json: &JsonValue, names: &Names) -> Result<Value> {
        let schema = resolve(schema, names)?;
        let mismatch = || Error::field("", format!("default {json} does not fit {}", schema.describe()));
        match (schema, json) {
            (Schema::Null, JsonValue::Null) => Ok(Value::Null),
            (Schema::Boolean, JsonValue::Bool(b)) => Ok(Value::Boolean(*b)),
            (Schema::Int, JsonValue::Number(n)) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int)
                .ok_or_else(mismatch),
            (Schema::Long, JsonValue::Number(n)) => n.as_i64().map(Value::Long).ok_or_else(mismatch),
            (Schema::Float, JsonValue::Number(n)) => n.as_f64().map(|f| Value::Float(f as f32)).ok_or_else(mismatch),
            (Schema::Double, JsonValue::Number(n)) => n.as_f64().map(Value::Double).ok_or_else(mismatch),
            (Schema::String, JsonValue::String(s)) => Ok(Value::String(s.clone())),
            (Schema::Bytes, JsonValue::String(s)) => latin1_bytes(s).map(Value::Bytes).ok_or_else(mismatch),
            (Schema::Fixed(f), JsonValue::String(s)) => match latin1_bytes(s) {
                Some(b) if b.len() == f.size() => Ok(Value::Fixed(b)),
                _ => Err(mismatch()),
            },
            (Schema::Enum(e), JsonValue::String(s)) if e.index_of(s).is_some() => Ok(Value::Enum(s.clone())),
            (Schema::Array(items), JsonValue::Array(a)) => a
                .iter()
                .map(|v| Value::from_json(items, v, names))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (Schema::Map(values), JsonValue::Object(o)) => o
                .iter()
                .map(|(k, v)| Ok((k.clone(), Value::from_json(values, v, names)?)))
                .collect::<Result<HashMap<_, _>>>()
                .map(Value::Map),
            (Schema::Record(r), JsonValue::Object(o)) => {
                let mut rec = Record::new();
                for f in r.fields() {
                    let v = match (o.get(f.name()), f.default()) {
                        (Some(v), _) | (None, Some(v)) => Value::from_json(f.schema(), v, names)
                            .map_err(|e| e.within(f.name()))?,
                        (None, None) => return Err(Error::field(f.name(), "missing in default")),
                    };
                    rec.put(f.name(), v);
                }
                Ok(Value::Record(rec))
            }
            (Schema::Union(u), json) => match u.variants().first() {
                Some(first) => Value::from_json(first, json, names),
                None        => Err(mismatch()),
            },
            _ => Err(mismatch()),
        }
    }
}

fn latin1_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

// ── Record ───────────────────────────────────────────────────────────────────

/// Field name → value.  Insertion order carries no meaning; the schema's
/// field order decides the wire layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn put(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.to_owned(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Typed read of one field.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let v = self.fields.get(name)
            .ok_or_else(|| Error::field(name, "missing"))?;
        T::from_value(v.clone()).map_err(|e| e.within(name))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

// ── Conversions ──────────────────────────────────────────────────────────────

impl From<Record> for Value {
    fn from(r: Record) -> Self { Value::Record(r) }
}

impl From<()> for Value {
    fn from(_: ()) -> Self { Value::Null }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Boolean(b) }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Int(i) }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Long(i) }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self { Value::Float(f) }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Double(f) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self { Value::Bytes(b) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Value::Null, Into::into)
    }
}

/// Typed extraction from a decoded [`Value`], widening numerics where safe.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn wrong_kind(expected: &str, got: &Value) -> Error {
    Error::field("", format!("expected {expected}, found {}", got.kind()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> { Ok(value) }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(wrong_kind("boolean", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(wrong_kind("int", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i)  => Ok(i64::from(i)),
            Value::Long(l) => Ok(l),
            other => Err(wrong_kind("long", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(wrong_kind("float", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f)  => Ok(f64::from(f)),
            Value::Double(d) => Ok(d),
            other => Err(wrong_kind("double", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) | Value::Enum(s) => Ok(s),
            other => Err(wrong_kind("string", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) | Value::Fixed(b) => Ok(b),
            other => Err(wrong_kind("bytes", &other)),
        }
    }
}

impl FromValue for Record {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Record(r) => Ok(r),
            other => Err(wrong_kind("record", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ── Typed layer ──────────────────────────────────────────────────────────────

/// A struct with a fixed schema, usually generated from schema text.
///
/// ```
/// use recfile::{Record, Result, Schema, SpecificRecord};
///
/// struct Point { x: i32, y: i32 }
///
/// impl SpecificRecord for Point {
///     fn schema() -> Schema {
///         Schema::parse_str(r#"{"type":"record","name":"Point","fields":[
///             {"name":"x","type":"int"},{"name":"y","type":"int"}]}"#).unwrap()
///     }
///     fn to_record(&self) -> Record {
///         [("x", self.x), ("y", self.y)].into_iter().collect()
///     }
///     fn from_record(r: Record) -> Result<Self> {
///         Ok(Point { x: r.get_as("x")?, y: r.get_as("y")? })
///     }
/// }
/// ```
pub trait SpecificRecord: Sized {
    fn schema() -> Schema;
    fn to_record(&self) -> Record;
    fn from_record(record: Record) -> Result<Self>;
}
