//! JSON schema text → [`Schema`].
//!
//! Named types must be defined before they are referenced, except that a
//! record's own name is usable inside its fields (recursion).  Unqualified
//! references are looked up in the enclosing namespace first, then bare.
//! `logicalType` and other unknown attributes are ignored.

use std::collections::HashSet;

use serde_json::{Map as JsonMap, Value as JsonValue};

use super::{
    resolve, EnumSchema, FixedSchema, Name, Names, RecordField, RecordSchema, Schema, UnionSchema,
};
use crate::error::{Error, Result};
use crate::value::Value;

pub(super) fn parse(text: &str) -> Result<Schema> {
    let json: JsonValue = serde_json::from_str(text)
        .map_err(|e| Error::SchemaParse(format!("malformed JSON: {e}")))?;
    let mut parser = Parser::default();
    let schema = parser.parse_value(&json, None)?;
    check_defaults(&schema, &schema.names())?;
    Ok(schema)
}

#[derive(Default)]
struct Parser {
    defined: HashSet<String>,
}

impl Parser {
    fn parse_value(&mut self, json: &JsonValue, ns: Option<&str>) -> Result<Schema> {
        match json {
            JsonValue::String(s) => self.parse_reference(s, ns),
            JsonValue::Array(branches) => {
                let variants = branches
                    .iter()
                    .map(|b| self.parse_value(b, ns))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Schema::Union(UnionSchema::new(variants)?))
            }
            JsonValue::Object(obj) => self.parse_object(obj, ns),
            other => Err(Error::SchemaParse(format!("unexpected schema JSON: {other}"))),
        }
    }

    fn parse_reference(&self, s: &str, ns: Option<&str>) -> Result<Schema> {
        if let Some(p) = primitive(s) {
            return Ok(p);
        }
        let candidates = match (s.contains('.'), ns) {
            (false, Some(ns)) => vec![format!("{ns}.{s}"), s.to_owned()],
            _                 => vec![s.to_owned()],
        };
        candidates
            .into_iter()
            .find(|c| self.defined.contains(c))
            .map(|full| Name::new(&full).map(Schema::Ref))
            .unwrap_or_else(|| Err(Error::SchemaParse(format!("unknown type '{s}'"))))
    }

    fn parse_object(&mut self, obj: &JsonMap<String, JsonValue>, ns: Option<&str>) -> Result<Schema> {
        let ty = obj.get("type").ok_or_else(|| Error::SchemaParse("missing 'type'".into()))?;
        let tag = match ty {
            JsonValue::String(t) => t.as_str(),
            nested => return self.parse_value(nested, ns),
        };
        match tag {
            "record" | "error" => self.parse_record(obj, ns),
            "enum"  => self.parse_enum(obj, ns),
            "fixed" => self.parse_fixed(obj, ns),
            "array" => {
                let items = obj.get("items")
                    .ok_or_else(|| Error::SchemaParse("array without 'items'".into()))?;
                Ok(Schema::array(self.parse_value(items, ns)?))
            }
            "map" => {
                let values = obj.get("values")
                    .ok_or_else(|| Error::SchemaParse("map without 'values'".into()))?;
                Ok(Schema::map(self.parse_value(values, ns)?))
            }
            other => self.parse_reference(other, ns),
        }
    }

    /// Register a named type, rejecting redefinitions.
    fn define(&mut self, obj: &JsonMap<String, JsonValue>, ns: Option<&str>) -> Result<Name> {
        let raw = str_attr(obj, "name")?
            .ok_or_else(|| Error::SchemaParse("named type without 'name'".into()))?;
        let own_ns = str_attr(obj, "namespace")?;
        let name = Name::with_namespace(raw, own_ns.or(ns))?;
        if primitive(name.name()).is_some() && name.namespace().is_none() {
            return Err(Error::SchemaParse(format!("'{raw}' is a reserved type name")));
        }
        if !self.defined.insert(name.fullname()) {
            return Err(Error::SchemaParse(format!("type '{name}' is defined twice")));
        }
        Ok(name)
    }

    fn parse_record(&mut self, obj: &JsonMap<String, JsonValue>, ns: Option<&str>) -> Result<Schema> {
        let name = self.define(obj, ns)?;
        let inner_ns = name.namespace().map(str::to_owned);
        let fields_json = match obj.get("fields") {
            Some(JsonValue::Array(f)) => f,
            _ => return Err(Error::SchemaParse(format!("record {name} needs a 'fields' array"))),
        };
        let mut fields = Vec::with_capacity(fields_json.len());
        for fj in fields_json {
            let fo = fj.as_object()
                .ok_or_else(|| Error::SchemaParse(format!("field of {name} is not an object")))?;
            let fname = str_attr(fo, "name")?
                .ok_or_else(|| Error::SchemaParse(format!("field of {name} without 'name'")))?;
            let fty = fo.get("type")
                .ok_or_else(|| Error::SchemaParse(format!("field {name}.{fname} without 'type'")))?;
            let mut field = RecordField::new(fname, self.parse_value(fty, inner_ns.as_deref())?);
            if let Some(d) = fo.get("default") {
                field = field.with_default(d.clone());
            }
            if let Some(doc) = str_attr(fo, "doc")? {
                field = field.with_doc(doc);
            }
            field = field.with_aliases(aliases(fo)?);
            fields.push(field);
        }
        let mut record = RecordSchema::new(name, fields)?.with_aliases(aliases(obj)?);
        if let Some(doc) = str_attr(obj, "doc")? {
            record = record.with_doc(doc);
        }
        Ok(Schema::Record(record))
    }

    fn parse_enum(&mut self, obj: &JsonMap<String, JsonValue>, ns: Option<&str>) -> Result<Schema> {
        let name = self.define(obj, ns)?;
        let symbols = match obj.get("symbols") {
            Some(JsonValue::Array(s)) => s
                .iter()
                .map(|v| v.as_str().map(str::to_owned)
                    .ok_or_else(|| Error::SchemaParse(format!("enum {name} has a non-string symbol"))))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(Error::SchemaParse(format!("enum {name} needs a 'symbols' array"))),
        };
        let default = str_attr(obj, "default")?.map(str::to_owned);
        let mut e = EnumSchema::new(name, symbols, default)?.with_aliases(aliases(obj)?);
        if let Some(doc) = str_attr(obj, "doc")? {
            e = e.with_doc(doc);
        }
        Ok(Schema::Enum(e))
    }

    fn parse_fixed(&mut self, obj: &JsonMap<String, JsonValue>, ns: Option<&str>) -> Result<Schema> {
        let name = self.define(obj, ns)?;
        let size = obj.get("size").and_then(JsonValue::as_u64)
            .ok_or_else(|| Error::SchemaParse(format!("fixed {name} needs a non-negative 'size'")))?;
        let size = usize::try_from(size)
            .map_err(|_| Error::SchemaParse(format!("fixed {name} size {size} too large")))?;
        Ok(Schema::Fixed(FixedSchema::new(name, size).with_aliases(aliases(obj)?)))
    }
}

fn primitive(s: &str) -> Option<Schema> {
    Some(match s {
        "null"    => Schema::Null,
        "boolean" => Schema::Boolean,
        "int"     => Schema::Int,
        "long"    => Schema::Long,
        "float"   => Schema::Float,
        "double"  => Schema::Double,
        "bytes"   => Schema::Bytes,
        "string"  => Schema::String,
        _         => return None,
    })
}

fn str_attr<'a>(obj: &'a JsonMap<String, JsonValue>, key: &str) -> Result<Option<&'a str>> {
    match obj.get(key) {
        None                    => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::SchemaParse(format!("'{key}' must be a string"))),
    }
}

fn aliases(obj: &JsonMap<String, JsonValue>) -> Result<Vec<String>> {
    match obj.get("aliases") {
        None => Ok(Vec::new()),
        Some(JsonValue::Array(a)) => a
            .iter()
            .map(|v| v.as_str().map(str::to_owned)
                .ok_or_else(|| Error::SchemaParse("'aliases' must hold strings".into())))
            .collect(),
        Some(_) => Err(Error::SchemaParse("'aliases' must be an array".into())),
    }
}

/// Every field default must convert under its field schema.
fn check_defaults(schema: &Schema, names: &Names) -> Result<()> {
    match schema {
        Schema::Record(r) => {
            for f in r.fields() {
                if let Some(d) = f.default() {
                    Value::from_json(f.schema(), d, names).map_err(|e| {
                        Error::SchemaParse(format!("invalid default for {}.{}: {e}", r.name(), f.name()))
                    })?;
                }
                check_defaults(f.schema(), names)?;
            }
            Ok(())
        }
        Schema::Array(s) | Schema::Map(s) => check_defaults(s, names),
        Schema::Union(u) => u.variants().iter().try_for_each(|v| check_defaults(v, names)),
        Schema::Ref(_) => resolve(schema, names).map(|_| ()),
        _ => Ok(()),
    }
}
