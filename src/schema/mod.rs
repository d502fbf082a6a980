//! Schema model: the immutable type tree every encode/decode walks.
//!
//! # Named types
//! Records, enums and fixed types carry a [`Name`] (namespace + name).  A
//! named type is *defined* once; every later use is a [`Schema::Ref`] to its
//! full name.  That is also how recursion is expressed: a record field whose
//! type is the enclosing record holds a `Ref`, never a copy.
//!
//! # Invariants
//! Constructors enforce the structural rules, so an ill-formed schema cannot
//! be built:
//!   - field names are unique within a record;
//!   - enum symbols are unique and the enum default is one of them;
//!   - a union never holds two branches of the same kind (two `int`s, two
//!     arrays, two named types with the same full name) nor a nested union.
//!
//! Field defaults are kept as JSON and checked against the field schema by
//! [`Schema::parse_str`] once every name is known.

mod compat;
mod parser;

pub use compat::check_compatibility;
pub(crate) use compat::{names_match, promotes};

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::error::{Error, Result};
use crate::value::Value;

/// Full name → defining schema.  Owned, so a writer or reader can build it
/// once and keep it next to its schemas.
pub(crate) type Names = HashMap<String, Schema>;

// ── Name ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    name:      String,
    namespace: Option<String>,
}

impl Name {
    /// Parse a possibly-dotted name: `"a.b.User"` → namespace `a.b`, name `User`.
    pub fn new(name: &str) -> Result<Self> {
        Self::with_namespace(name, None)
    }

    /// Build a name relative to `namespace`.  A dotted `name` carries its own
    /// namespace and ignores the one given.
    pub fn with_namespace(name: &str, namespace: Option<&str>) -> Result<Self> {
        let (namespace, name) = match name.rfind('.') {
            Some(i) => (Some(&name[..i]), &name[i + 1..]),
            None    => (namespace.filter(|ns| !ns.is_empty()), name),
        };
        if !is_identifier(name) {
            return Err(Error::SchemaParse(format!("invalid name '{name}'")));
        }
        if let Some(ns) = namespace {
            if !ns.split('.').all(is_identifier) {
                return Err(Error::SchemaParse(format!("invalid namespace '{ns}'")));
            }
        }
        Ok(Self { name: name.to_owned(), namespace: namespace.map(str::to_owned) })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn namespace(&self) -> Option<&str> { self.namespace.as_deref() }

    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None     => self.name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Schema ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Array(Box<Schema>),
    Map(Box<Schema>),
    Union(UnionSchema),
    Record(RecordSchema),
    Enum(EnumSchema),
    Fixed(FixedSchema),
    /// Use of a named type defined elsewhere in the same tree.
    Ref(Name),
}

impl Schema {
    /// Parse JSON schema text.
    pub fn parse_str(text: &str) -> Result<Self> {
        parser::parse(text)
    }

    pub fn array(items: Schema) -> Self { Schema::Array(Box::new(items)) }

    pub fn map(values: Schema) -> Self { Schema::Map(Box::new(values)) }

    /// `["null", inner]`, the usual optional field.
    pub fn nullable(inner: Schema) -> Result<Self> {
        Ok(Schema::Union(UnionSchema::new(vec![Schema::Null, inner])?))
    }

    /// Type tag used in diagnostics and schema text.
    pub fn kind(&self) -> &'static str {
        match self {
            Schema::Null      => "null",
            Schema::Boolean   => "boolean",
            Schema::Int       => "int",
            Schema::Long      => "long",
            Schema::Float     => "float",
            Schema::Double    => "double",
            Schema::Bytes     => "bytes",
            Schema::String    => "string",
            Schema::Array(_)  => "array",
            Schema::Map(_)    => "map",
            Schema::Union(_)  => "union",
            Schema::Record(_) => "record",
            Schema::Enum(_)   => "enum",
            Schema::Fixed(_)  => "fixed",
            Schema::Ref(_)    => "reference",
        }
    }

    /// The name of a named type or reference.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Schema::Record(r) => Some(&r.name),
            Schema::Enum(e)   => Some(&e.name),
            Schema::Fixed(f)  => Some(&f.name),
            Schema::Ref(n)    => Some(n),
            _                 => None,
        }
    }

    /// Short description for error messages: the full name for named
    /// types, the type tag otherwise.
    pub(crate) fn describe(&self) -> String {
        match self.name() {
            Some(n) => n.fullname(),
            None    => self.kind().to_owned(),
        }
    }

    /// Key that must be unique among the branches of one union.
    fn union_key(&self) -> String {
        match self.name() {
            Some(n) => n.fullname(),
            None    => self.kind().to_owned(),
        }
    }

    /// Collect every named definition in this tree.
    pub(crate) fn names(&self) -> Names {
        let mut names = Names::new();
        collect_names(self, &mut names);
        names
    }

    /// Check `value` against this schema.  See [`ValidationMode`] for the
    /// handling of undeclared record fields.
    pub fn validate(&self, value: &Value, mode: ValidationMode) -> Result<()> {
        let names = self.names();
        validate_value(self, value, &names, mode)
    }

    /// Schema text as a JSON value.  Each named type is defined at its first
    /// occurrence and referenced by full name afterwards.
    pub fn to_json(&self) -> JsonValue {
        let mut defined = HashSet::new();
        schema_to_json(self, None, &mut defined)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Resolve a reference through `names`; other schemas are returned as is.
pub(crate) fn resolve<'a>(schema: &'a Schema, names: &'a Names) -> Result<&'a Schema> {
    match schema {
        Schema::Ref(n) => names.get(&n.fullname()).ok_or_else(|| {
            Error::SchemaParse(format!("unresolved reference '{n}'"))
        }),
        other => Ok(other),
    }
}

fn collect_names(schema: &Schema, names: &mut Names) {
    match schema {
        Schema::Record(r) => {
            names.insert(r.name.fullname(), schema.clone());
            for f in &r.fields {
                collect_names(&f.schema, names);
            }
        }
        Schema::Enum(e)  => { names.insert(e.name.fullname(), schema.clone()); }
        Schema::Fixed(f) => { names.insert(f.name.fullname(), schema.clone()); }
        Schema::Array(s) | Schema::Map(s) => collect_names(s, names),
        Schema::Union(u) => {
            for v in &u.variants {
                collect_names(v, names);
            }
        }
        _ => {}
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    name:    String,
    schema:  Schema,
    default: Option<JsonValue>,
    doc:     Option<String>,
    aliases: Vec<String>,
}

impl RecordField {
    pub fn new(name: &str, schema: Schema) -> Self {
        Self { name: name.to_owned(), schema, default: None, doc: None, aliases: Vec::new() }
    }

    /// Default in its JSON form (for a union: a value of the first branch).
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn schema(&self) -> &Schema { &self.schema }
    pub fn default(&self) -> Option<&JsonValue> { self.default.as_ref() }
    pub fn doc(&self) -> Option<&str> { self.doc.as_deref() }
    pub fn aliases(&self) -> &[String] { &self.aliases }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    name:    Name,
    doc:     Option<String>,
    aliases: Vec<String>,
    fields:  Vec<RecordField>,
    lookup:  HashMap<String, usize>,
}

impl RecordSchema {
    pub fn new(name: Name, fields: Vec<RecordField>) -> Result<Self> {
        let mut lookup = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if !is_identifier(&f.name) {
                return Err(Error::SchemaParse(format!("invalid field name '{}' in {name}", f.name)));
            }
            if lookup.insert(f.name.clone(), i).is_some() {
                return Err(Error::SchemaParse(format!("duplicate field '{}' in {name}", f.name)));
            }
        }
        Ok(Self { name, doc: None, aliases: Vec::new(), fields, lookup })
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }

    /// Alternative full names a reader accepts for writer data.
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn name(&self) -> &Name { &self.name }
    pub fn doc(&self) -> Option<&str> { self.doc.as_deref() }
    pub fn aliases(&self) -> &[String] { &self.aliases }
    pub fn fields(&self) -> &[RecordField] { &self.fields }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.lookup.get(name).map(|&i| &self.fields[i])
    }

    /// Reader-side lookup of a writer field: by name, then by field alias.
    pub(crate) fn field_for_writer(&self, writer_field: &str) -> Option<&RecordField> {
        self.field(writer_field).or_else(|| {
            self.fields.iter().find(|f| f.aliases.iter().any(|a| a == writer_field))
        })
    }
}

// ── Enum / Fixed / Union ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    name:    Name,
    doc:     Option<String>,
    aliases: Vec<String>,
    symbols: Vec<String>,
    default: Option<String>,
}

impl EnumSchema {
    pub fn new(name: Name, symbols: Vec<String>, default: Option<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &symbols {
            if !is_identifier(s) {
                return Err(Error::SchemaParse(format!("invalid symbol '{s}' in enum {name}")));
            }
            if !seen.insert(s.as_str()) {
                return Err(Error::SchemaParse(format!("duplicate symbol '{s}' in enum {name}")));
            }
        }
        if let Some(d) = &default {
            if !seen.contains(d.as_str()) {
                return Err(Error::SchemaParse(format!("enum {name} default '{d}' is not a symbol")));
            }
        }
        Ok(Self { name, doc: None, aliases: Vec::new(), symbols, default })
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn name(&self) -> &Name { &self.name }
    pub fn doc(&self) -> Option<&str> { self.doc.as_deref() }
    pub fn aliases(&self) -> &[String] { &self.aliases }
    pub fn symbols(&self) -> &[String] { &self.symbols }
    pub fn default(&self) -> Option<&str> { self.default.as_deref() }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedSchema {
    name:    Name,
    aliases: Vec<String>,
    size:    usize,
}

impl FixedSchema {
    pub fn new(name: Name, size: usize) -> Self {
        Self { name, aliases: Vec::new(), size }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn name(&self) -> &Name { &self.name }
    pub fn aliases(&self) -> &[String] { &self.aliases }
    pub fn size(&self) -> usize { self.size }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionSchema {
    variants: Vec<Schema>,
}

impl UnionSchema {
    pub fn new(variants: Vec<Schema>) -> Result<Self> {
        let mut seen = HashSet::new();
        for v in &variants {
            if matches!(v, Schema::Union(_)) {
                return Err(Error::SchemaParse("unions may not directly contain a union".into()));
            }
            let key = v.union_key();
            if !seen.insert(key.clone()) {
                return Err(Error::SchemaParse(format!("union contains '{key}' more than once")));
            }
        }
        Ok(Self { variants })
    }

    pub fn variants(&self) -> &[Schema] { &self.variants }

    pub fn is_nullable(&self) -> bool {
        self.variants.iter().any(|v| matches!(v, Schema::Null))
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// How record values holding fields the schema does not declare are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Undeclared fields are an error.
    #[default]
    Strict,
    /// Undeclared fields are ignored (and never written).
    Lenient,
}

/// Free-function form of [`Schema::validate`].
pub fn validate(schema: &Schema, value: &Value, mode: ValidationMode) -> Result<()> {
    schema.validate(value, mode)
}

pub(crate) fn validate_value(
    schema: &Schema,
    value:  &Value,
    names:  &Names,
    mode:   ValidationMode,
) -> Result<()> {
    let schema = resolve(schema, names)?;
    match (schema, value) {
        (Schema::Union(u), v) => {
            if select_branch(u, v, names).is_some() {
                Ok(())
            } else {
                Err(Error::field("", format!("{} matches no branch of the union", v.kind())))
            }
        }
        (Schema::Record(r), Value::Record(rec)) => {
            for f in &r.fields {
                match rec.get(&f.name) {
                    Some(v) => validate_value(&f.schema, v, names, mode).map_err(|e| e.within(&f.name))?,
                    None if f.default.is_some() => {}
                    None => return Err(Error::field(f.name.as_str(), "missing required field")),
                }
            }
            if mode == ValidationMode::Strict {
                if let Some(extra) = rec.field_names().find(|n| r.field(n).is_none()) {
                    return Err(Error::field(extra, format!("not declared in {}", r.name)));
                }
            }
            Ok(())
        }
        (Schema::Enum(e), Value::Enum(sym)) => match e.index_of(sym) {
            Some(_) => Ok(()),
            None    => Err(Error::field("", format!("'{sym}' is not a symbol of {}", e.name))),
        },
        (Schema::Fixed(f), Value::Fixed(b)) => {
            if b.len() == f.size {
                Ok(())
            } else {
                Err(Error::field("", format!("fixed {} needs {} bytes, got {}", f.name, f.size, b.len())))
            }
        }
        (Schema::Array(items), Value::Array(vs)) => {
            for (i, v) in vs.iter().enumerate() {
                validate_value(items, v, names, mode).map_err(|e| e.within(&format!("[{i}]")))?;
            }
            Ok(())
        }
        (Schema::Map(values), Value::Map(m)) => {
            for (k, v) in m {
                validate_value(values, v, names, mode).map_err(|e| e.within(&format!("[{k}]")))?;
            }
            Ok(())
        }
        (s, v) if accepts_scalar(s, v) => Ok(()),
        (s, v) => Err(Error::field("", format!("expected {}, found {}", s.describe(), v.kind()))),
    }
}

/// Scalar kinds, including the widenings the encoder performs on write.
fn accepts_scalar(schema: &Schema, value: &Value) -> bool {
    matches!(
        (schema, value),
        (Schema::Null, Value::Null)
            | (Schema::Boolean, Value::Boolean(_))
            | (Schema::Int, Value::Int(_))
            | (Schema::Long, Value::Int(_) | Value::Long(_))
            | (Schema::Float, Value::Int(_) | Value::Long(_) | Value::Float(_))
            | (Schema::Double, Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_))
            | (Schema::Bytes, Value::Bytes(_))
            | (Schema::String, Value::String(_))
    )
}

/// Pick the union branch a value is written as: an exact kind first, then
/// the first branch reachable by numeric widening.
pub(crate) fn select_branch<'a>(
    union: &'a UnionSchema,
    value: &Value,
    names: &'a Names,
) -> Option<(usize, &'a Schema)> {
    let resolved = |s: &'a Schema| resolve(s, names).ok();
    let exact = union.variants.iter().enumerate().find(|(_, s)| {
        match (resolved(s), value) {
            (Some(Schema::Null), Value::Null)
            | (Some(Schema::Boolean), Value::Boolean(_))
            | (Some(Schema::Int), Value::Int(_))
            | (Some(Schema::Long), Value::Long(_))
            | (Some(Schema::Float), Value::Float(_))
            | (Some(Schema::Double), Value::Double(_))
            | (Some(Schema::Bytes), Value::Bytes(_))
            | (Some(Schema::String), Value::String(_)) => true,
            (Some(r @ (Schema::Record(_) | Schema::Enum(_) | Schema::Fixed(_) | Schema::Array(_) | Schema::Map(_))), v) => {
                validate_value(r, v, names, ValidationMode::Lenient).is_ok()
            }
            _ => false,
        }
    });
    exact
        .or_else(|| {
            union.variants.iter().enumerate().find(|(_, s)| {
                resolved(s).map_or(false, |s| accepts_scalar(s, value))
            })
        })
}

// ── Schema text ──────────────────────────────────────────────────────────────

/// `enclosing` is the namespace a bare name would inherit at this point.
fn schema_to_json(schema: &Schema, enclosing: Option<&str>, defined: &mut HashSet<String>) -> JsonValue {
    match schema {
        Schema::Array(items) => json!({ "type": "array", "items": schema_to_json(items, enclosing, defined) }),
        Schema::Map(values)  => json!({ "type": "map", "values": schema_to_json(values, enclosing, defined) }),
        Schema::Union(u) => JsonValue::Array(
            u.variants.iter().map(|v| schema_to_json(v, enclosing, defined)).collect(),
        ),
        Schema::Ref(n) => JsonValue::String(n.fullname()),
        Schema::Record(r) => {
            if !defined.insert(r.name.fullname()) {
                return JsonValue::String(r.name.fullname());
            }
            let mut obj = named_header("record", &r.name, &r.aliases, enclosing);
            let inner = r.name.namespace();
            if let Some(doc) = &r.doc {
                obj.insert("doc".into(), json!(doc));
            }
            let fields = r.fields.iter().map(|f| {
                let mut fo = JsonMap::new();
                fo.insert("name".into(), json!(f.name));
                fo.insert("type".into(), schema_to_json(&f.schema, inner, defined));
                if let Some(d) = &f.default {
                    fo.insert("default".into(), d.clone());
                }
                if let Some(doc) = &f.doc {
                    fo.insert("doc".into(), json!(doc));
                }
                if !f.aliases.is_empty() {
                    fo.insert("aliases".into(), json!(f.aliases));
                }
                JsonValue::Object(fo)
            }).collect::<Vec<_>>();
            obj.insert("fields".into(), JsonValue::Array(fields));
            JsonValue::Object(obj)
        }
        Schema::Enum(e) => {
            if !defined.insert(e.name.fullname()) {
                return JsonValue::String(e.name.fullname());
            }
            let mut obj = named_header("enum", &e.name, &e.aliases, enclosing);
            if let Some(doc) = &e.doc {
                obj.insert("doc".into(), json!(doc));
            }
            obj.insert("symbols".into(), json!(e.symbols));
            if let Some(d) = &e.default {
                obj.insert("default".into(), json!(d));
            }
            JsonValue::Object(obj)
        }
        Schema::Fixed(f) => {
            if !defined.insert(f.name.fullname()) {
                return JsonValue::String(f.name.fullname());
            }
            let mut obj = named_header("fixed", &f.name, &f.aliases, enclosing);
            obj.insert("size".into(), json!(f.size));
            JsonValue::Object(obj)
        }
        primitive => JsonValue::String(primitive.kind().to_owned()),
    }
}

fn named_header(kind: &str, name: &Name, aliases: &[String], enclosing: Option<&str>) -> JsonMap<String, JsonValue> {
    let mut obj = JsonMap::new();
    obj.insert("type".into(), json!(kind));
    obj.insert("name".into(), json!(name.name));
    match (&name.namespace, enclosing) {
        (Some(ns), _) => { obj.insert("namespace".into(), json!(ns)); }
        // An explicit empty namespace keeps the name out of the parent's.
        (None, Some(_)) => { obj.insert("namespace".into(), json!("")); }
        (None, None) => {}
    }
    if !aliases.is_empty() {
        obj.insert("aliases".into(), json!(aliases));
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    fn user_schema() -> Schema {
        Schema::Record(RecordSchema::new(
            Name::new("com.example.User").unwrap(),
            vec![
                RecordField::new("id", Schema::Int),
                RecordField::new("username", Schema::String),
                RecordField::new("sex", Schema::nullable(Schema::String).unwrap())
                    .with_default(JsonValue::Null),
            ],
        ).unwrap())
    }

    #[test]
    fn dotted_names_split_namespace() {
        let n = Name::new("com.example.User").unwrap();
        assert_eq!(n.name(), "User");
        assert_eq!(n.namespace(), Some("com.example"));
        assert_eq!(n.fullname(), "com.example.User");

        let n = Name::with_namespace("User", Some("org.x")).unwrap();
        assert_eq!(n.fullname(), "org.x.User");
        assert!(Name::new("9lives").is_err());
    }

    #[test]
    fn duplicate_fields_rejected() {
        let err = RecordSchema::new(
            Name::new("R").unwrap(),
            vec![RecordField::new("a", Schema::Int), RecordField::new("a", Schema::Long)],
        ).unwrap_err();
        assert!(matches!(err, Error::SchemaParse(_)));
    }

    #[test]
    fn duplicate_symbols_and_bad_default_rejected() {
        let name = Name::new("Suit").unwrap();
        assert!(EnumSchema::new(name.clone(), vec!["A".into(), "A".into()], None).is_err());
        assert!(EnumSchema::new(name, vec!["A".into()], Some("B".into())).is_err());
    }

    #[test]
    fn ambiguous_unions_rejected() {
        assert!(UnionSchema::new(vec![Schema::Int, Schema::Int]).is_err());
        assert!(UnionSchema::new(vec![Schema::array(Schema::Int), Schema::array(Schema::Long)]).is_err());
        let inner = Schema::Union(UnionSchema::new(vec![Schema::Null]).unwrap());
        assert!(UnionSchema::new(vec![Schema::Int, inner]).is_err());
        // Distinct named types are fine.
        let a = Schema::Fixed(FixedSchema::new(Name::new("A").unwrap(), 2));
        let b = Schema::Fixed(FixedSchema::new(Name::new("B").unwrap(), 2));
        assert!(UnionSchema::new(vec![a, b]).is_ok());
    }

    #[test]
    fn validate_reports_field_paths() {
        let schema = user_schema();
        let mut rec = Record::new();
        rec.put("id", 1);
        rec.put("username", 7);
        let err = schema.validate(&rec.into(), ValidationMode::Strict).unwrap_err();
        match err {
            Error::Field { field, .. } => assert_eq!(field, "username"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validate_strict_vs_lenient_extra_fields() {
        let schema = user_schema();
        let mut rec = Record::new();
        rec.put("id", 1);
        rec.put("username", "abc");
        rec.put("nickname", "x");
        let value = Value::Record(rec);
        assert!(schema.validate(&value, ValidationMode::Strict).is_err());
        assert!(schema.validate(&value, ValidationMode::Lenient).is_ok());
    }

    #[test]
    fn validate_missing_required_field() {
        let schema = user_schema();
        let mut rec = Record::new();
        rec.put("username", "abc");
        let err = schema.validate(&rec.into(), ValidationMode::Lenient).unwrap_err();
        assert!(matches!(err, Error::Field { ref field, .. } if field == "id"));
    }

    #[test]
    fn union_branch_selection_prefers_exact_kind() {
        let u = UnionSchema::new(vec![Schema::Null, Schema::Long, Schema::Int]).unwrap();
        let s = Schema::Union(u.clone());
        let names = s.names();
        assert_eq!(select_branch(&u, &Value::Int(1), &names).unwrap().0, 2);
        assert_eq!(select_branch(&u, &Value::Long(1), &names).unwrap().0, 1);
        assert_eq!(select_branch(&u, &Value::Null, &names).unwrap().0, 0);
        assert!(select_branch(&u, &Value::String("x".into()), &names).is_none());

        let widen = UnionSchema::new(vec![Schema::Null, Schema::Double]).unwrap();
        assert_eq!(select_branch(&widen, &Value::Int(3), &names).unwrap().0, 1);
    }

    #[test]
    fn schema_text_defines_names_once() {
        let node = Schema::Record(RecordSchema::new(
            Name::new("Node").unwrap(),
            vec![
                RecordField::new("value", Schema::Long),
                RecordField::new("next", Schema::nullable(Schema::Ref(Name::new("Node").unwrap())).unwrap()),
            ],
        ).unwrap());
        let text = node.to_string();
        assert_eq!(text.matches("\"record\"").count(), 1);
        assert_eq!(Schema::parse_str(&text).unwrap(), node);
    }

    #[test]
    fn empty_namespace_survives_schema_text() {
        let s = Schema::parse_str(r#"{"type":"record","name":"Outer","namespace":"com.example","fields":[
            {"name":"inner","type":{"type":"record","name":"Inner","namespace":"","fields":[
                {"name":"flag","type":"boolean"}]}},
            {"name":"again","type":"Inner"}]}"#).unwrap();
        match &s {
            Schema::Record(outer) => assert_eq!(outer.fields()[0].schema().name().unwrap().namespace(), None),
            other => panic!("unexpected {other:?}"),
        }
        let text = s.to_string();
        assert!(text.contains(r#""namespace":"""#));
        assert_eq!(Schema::parse_str(&text).unwrap(), s);
    }
}
