//! Decoding with writer → reader schema resolution.
//!
//! The writer schema dictates what is physically on the wire; the reader
//! schema dictates the shape of the returned value:
//!
//! - fields in both are decoded, widening numerics where the reader asks
//!   for it (`int → long → float → double`, `string ↔ bytes`);
//! - writer-only fields are skipped;
//! - reader-only fields take the reader's default, or fail with
//!   `MissingDefault`;
//! - enum symbols map by name, falling back to the reader's default symbol;
//! - a writer union branch is matched against the reader by kind/name.
//!
//! Offsets in errors are relative to the start of the decoded buffer.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::schema::{names_match, promotes, resolve, Names, Schema, UnionSchema};
use crate::value::{Record, Value};

use super::zigzag_decode;

/// Decode one value written with `writer` as `reader`.
pub fn decode(writer: &Schema, reader: &Schema, bytes: &[u8]) -> Result<Value> {
    let wn = writer.names();
    let rn = reader.names();
    let mut cur = SliceReader::new(bytes);
    decode_value(writer, reader, &wn, &rn, &mut cur)
}

// ── Cursor ───────────────────────────────────────────────────────────────────

/// Forward-only cursor over an in-memory buffer that reports the offset of
/// every short or malformed read.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize { self.pos }

    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    pub fn is_empty(&self) -> bool { self.remaining() == 0 }

    pub(crate) fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    fn invalid(&self, at: usize, reason: impl Into<String>) -> Error {
        Error::InvalidData { offset: at as u64, reason: reason.into() }
    }

    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::TruncatedData { offset: self.buf.len() as u64 });
        }
        let buf = self.buf;
        let out = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_long(&mut self) -> Result<i64> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos).ok_or(Error::TruncatedData { offset: self.pos as u64 })?;
            self.pos += 1;
            if shift >= 64 {
                return Err(self.invalid(start, "varint longer than 10 bytes"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(zigzag_decode(value));
            }
            shift += 7;
        }
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let start = self.pos;
        let n = self.read_long()?;
        i32::try_from(n).map_err(|_| self.invalid(start, format!("{n} overflows int")))
    }

    /// A length or count that must not be negative.
    fn read_len(&mut self) -> Result<usize> {
        let start = self.pos;
        let n = self.read_long()?;
        usize::try_from(n).map_err(|_| self.invalid(start, format!("negative length {n}")))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let start = self.pos;
        match self.read_exact(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(self.invalid(start, format!("boolean byte {b:#04x}"))),
        }
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_exact(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.read_exact(8)?))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let n = self.read_len()?;
        Ok(self.read_exact(n)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| self.invalid(start, "string is not valid UTF-8"))
    }

    /// Block count of an array/map; a negative count is followed by the
    /// block's byte size, which is read and discarded.
    fn read_block_count(&mut self) -> Result<usize> {
        let start = self.pos;
        let count = self.read_long()?;
        if count < 0 {
            self.read_len()?;
        }
        usize::try_from(count.unsigned_abs()).map_err(|_| self.invalid(start, "block count overflow"))
    }

    /// Reject block counts the rest of the buffer cannot hold, given that
    /// every item takes at least `width` bytes.  Zero-width items (nulls,
    /// empty records, size-0 fixed) are capped at [`MAX_ZERO_WIDTH_ITEMS`]
    /// per array, counting the `seen` items of earlier blocks.
    fn check_count(&self, count: usize, width: usize, seen: usize) -> Result<()> {
        let fits = match width {
            0 => seen.saturating_add(count) <= MAX_ZERO_WIDTH_ITEMS,
            w => count <= self.remaining() / w,
        };
        if fits {
            Ok(())
        } else {
            Err(self.invalid(
                self.pos,
                format!("block count {count} exceeds remaining {} bytes", self.remaining()),
            ))
        }
    }
}

/// Most zero-width items one array or map may hold.
pub const MAX_ZERO_WIDTH_ITEMS: usize = 1 << 20;

/// Fewest bytes a value of `schema` occupies on the wire.
pub(crate) fn min_width(schema: &Schema, names: &Names) -> usize {
    let mut known = HashMap::new();
    width_of(schema, names, &mut known)
}

/// `known` holds finished widths by full name; `None` marks a record still
/// being measured, which only a recursive field reaches.
fn width_of(schema: &Schema, names: &Names, known: &mut HashMap<String, Option<usize>>) -> usize {
    let schema = match resolve(schema, names) {
        Ok(s) => s,
        Err(_) => return 1,
    };
    match schema {
        Schema::Null => 0,
        Schema::Float => 4,
        Schema::Double => 8,
        Schema::Fixed(f) => f.size(),
        Schema::Record(r) => {
            let key = r.name().fullname();
            match known.get(&key) {
                Some(Some(w)) => return *w,
                Some(None) => return 1,
                None => {}
            }
            known.insert(key.clone(), None);
            let w = r
                .fields()
                .iter()
                .fold(0usize, |acc, f| acc.saturating_add(width_of(f.schema(), names, known)));
            known.insert(key, Some(w));
            w
        }
        _ => 1,
    }
}

// ── Resolution ───────────────────────────────────────────────────────────────

pub(crate) fn decode_value(
    writer: &Schema,
    reader: &Schema,
    wn:     &Names,
    rn:     &Names,
    cur:    &mut SliceReader<'_>,
) -> Result<Value> {
    let w = resolve(writer, wn)?;
    let r = resolve(reader, rn)?;
    match (w, r) {
        (Schema::Union(wu), _) => {
            let start = cur.position();
            let index = cur.read_long()?;
            let branch = usize::try_from(index)
                .ok()
                .and_then(|i| wu.variants().get(i))
                .ok_or_else(|| cur.invalid(start, format!("union index {index} out of range")))?;
            decode_value(branch, r, wn, rn, cur)
        }
        (_, Schema::Union(ru)) => match match_branch(w, ru, rn) {
            Some(branch) => decode_value(w, branch, wn, rn, cur),
            None => Err(Error::UnresolvableUnion { writer: w.describe(), reader: r.to_string() }),
        },
        (Schema::Null, Schema::Null) => Ok(Value::Null),
        (Schema::Boolean, Schema::Boolean) => cur.read_bool().map(Value::Boolean),
        (Schema::Int, Schema::Int) => cur.read_int().map(Value::Int),
        (Schema::Int, Schema::Long) => cur.read_int().map(|i| Value::Long(i64::from(i))),
        (Schema::Int, Schema::Float) => cur.read_int().map(|i| Value::Float(i as f32)),
        (Schema::Int, Schema::Double) => cur.read_int().map(|i| Value::Double(f64::from(i))),
        (Schema::Long, Schema::Long) => cur.read_long().map(Value::Long),
        (Schema::Long, Schema::Float) => cur.read_long().map(|l| Value::Float(l as f32)),
        (Schema::Long, Schema::Double) => cur.read_long().map(|l| Value::Double(l as f64)),
        (Schema::Float, Schema::Float) => cur.read_f32().map(Value::Float),
        (Schema::Float, Schema::Double) => cur.read_f32().map(|f| Value::Double(f64::from(f))),
        (Schema::Double, Schema::Double) => cur.read_f64().map(Value::Double),
        (Schema::Bytes | Schema::String, Schema::Bytes) => cur.read_bytes().map(Value::Bytes),
        (Schema::Bytes | Schema::String, Schema::String) => cur.read_string().map(Value::String),
        (Schema::Fixed(wf), Schema::Fixed(rf))
            if names_match(wf.name(), rf.name(), rf.aliases()) && wf.size() == rf.size() =>
        {
            cur.read_exact(wf.size()).map(|b| Value::Fixed(b.to_vec()))
        }
        (Schema::Enum(we), Schema::Enum(re)) if names_match(we.name(), re.name(), re.aliases()) => {
            let start = cur.position();
            let index = cur.read_long()?;
            let symbol = usize::try_from(index)
                .ok()
                .and_then(|i| we.symbols().get(i))
                .ok_or_else(|| cur.invalid(start, format!("enum index {index} out of range for {}", we.name())))?;
            if re.index_of(symbol).is_some() {
                Ok(Value::Enum(symbol.clone()))
            } else if let Some(d) = re.default() {
                Ok(Value::Enum(d.to_owned()))
            } else {
                Err(Error::UnresolvableSymbol { name: re.name().fullname(), symbol: symbol.clone() })
            }
        }
        (Schema::Array(wi), Schema::Array(ri)) => {
            let width = min_width(wi, wn);
            let mut out = Vec::new();
            loop {
                let count = cur.read_block_count()?;
                if count == 0 {
                    break;
                }
                cur.check_count(count, width, out.len())?;
                out.reserve(count.min(cur.remaining()));
                for _ in 0..count {
                    let v = decode_value(wi, ri, wn, rn, cur).map_err(|e| e.within(&format!("[{}]", out.len())))?;
                    out.push(v);
                }
            }
            Ok(Value::Array(out))
        }
        (Schema::Map(wv), Schema::Map(rv)) => {
            let width = min_width(wv, wn).saturating_add(1);
            let mut out = HashMap::new();
            loop {
                let count = cur.read_block_count()?;
                if count == 0 {
                    break;
                }
                cur.check_count(count, width, out.len())?;
                for _ in 0..count {
                    let key = cur.read_string()?;
                    let v = decode_value(wv, rv, wn, rn, cur).map_err(|e| e.within(&format!("[{key}]")))?;
                    out.insert(key, v);
                }
            }
            Ok(Value::Map(out))
        }
        (Schema::Record(wr), Schema::Record(rr)) if names_match(wr.name(), rr.name(), rr.aliases()) => {
            let mut out = Record::new();
            for wf in wr.fields() {
                match rr.field_for_writer(wf.name()) {
                    Some(rf) => {
                        let v = decode_value(wf.schema(), rf.schema(), wn, rn, cur)
                            .map_err(|e| e.within(rf.name()))?;
                        out.put(rf.name(), v);
                    }
                    None => skip_value(wf.schema(), wn, cur)?,
                }
            }
            for rf in rr.fields() {
                if out.get(rf.name()).is_some() {
                    continue;
                }
                let default = rf.default().ok_or_else(|| Error::MissingDefault {
                    record: rr.name().fullname(),
                    field:  rf.name().to_owned(),
                })?;
                out.put(rf.name(), Value::from_json(rf.schema(), default, rn).map_err(|e| e.within(rf.name()))?);
            }
            Ok(Value::Record(out))
        }
        (w, r) => Err(Error::IncompatibleSchema(format!(
            "writer {} cannot be read as {}",
            w.describe(),
            r.describe(),
        ))),
    }
}

/// The reader branch a non-union writer value lands in: same kind (and
/// name, for named types) first, then the first safe widening.
fn match_branch<'r>(writer: &Schema, union: &'r UnionSchema, rn: &'r Names) -> Option<&'r Schema> {
    let resolved = |b: &'r Schema| resolve(b, rn).ok();
    union
        .variants()
        .iter()
        .find(|b| match (writer, resolved(*b)) {
            (_, None) => false,
            (Schema::Record(w), Some(Schema::Record(r))) => names_match(w.name(), r.name(), r.aliases()),
            (Schema::Enum(w), Some(Schema::Enum(r))) => names_match(w.name(), r.name(), r.aliases()),
            (Schema::Fixed(w), Some(Schema::Fixed(r))) => {
                names_match(w.name(), r.name(), r.aliases()) && w.size() == r.size()
            }
            (w, Some(r)) => w.name().is_none() && r.name().is_none() && w.kind() == r.kind(),
        })
        .or_else(|| {
            union.variants().iter().find(|b| resolved(*b).map_or(false, |r| promotes(writer, r)))
        })
}

/// Advance past one value written as `writer` without building it.
pub(crate) fn skip_value(writer: &Schema, wn: &Names, cur: &mut SliceReader<'_>) -> Result<()> {
    match resolve(writer, wn)? {
        Schema::Null => {}
        Schema::Boolean => { cur.read_exact(1)?; }
        Schema::Int | Schema::Long | Schema::Enum(_) => { cur.read_long()?; }
        Schema::Float => { cur.read_exact(4)?; }
        Schema::Double => { cur.read_exact(8)?; }
        Schema::Bytes | Schema::String => {
            let n = cur.read_len()?;
            cur.read_exact(n)?;
        }
        Schema::Fixed(f) => { cur.read_exact(f.size())?; }
        Schema::Union(u) => {
            let start = cur.position();
            let index = cur.read_long()?;
            let branch = usize::try_from(index)
                .ok()
                .and_then(|i| u.variants().get(i))
                .ok_or_else(|| cur.invalid(start, format!("union index {index} out of range")))?;
            skip_value(branch, wn, cur)?;
        }
        Schema::Array(items) => skip_blocks(cur, min_width(items, wn), |cur| skip_value(items, wn, cur))?,
        Schema::Map(values) => skip_blocks(cur, min_width(values, wn).saturating_add(1), |cur| {
            let n = cur.read_len()?;
            cur.read_exact(n)?;
            skip_value(values, wn, cur)
        })?,
        Schema::Record(r) => {
            for f in r.fields() {
                skip_value(f.schema(), wn, cur)?;
            }
        }
        Schema::Ref(n) => return Err(Error::SchemaParse(format!("unresolved reference '{n}'"))),
    }
    Ok(())
}

/// Skip array/map blocks, jumping over sized (negative-count) blocks whole.
fn skip_blocks<F>(cur: &mut SliceReader<'_>, width: usize, mut skip_item: F) -> Result<()>
where
    F: FnMut(&mut SliceReader<'_>) -> Result<()>,
{
    let mut seen = 0usize;
    loop {
        let start = cur.position();
        let count = cur.read_long()?;
        match count {
            0 => return Ok(()),
            n if n < 0 => {
                let size = cur.read_len()?;
                cur.read_exact(size)?;
            }
            n => {
                let n = usize::try_from(n).map_err(|_| cur.invalid(start, "block count overflow"))?;
                cur.check_count(n, width, seen)?;
                for _ in 0..n {
                    skip_item(cur)?;
                }
                seen = seen.saturating_add(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{encode, write_long};

    fn parse(s: &str) -> Schema {
        Schema::parse_str(s).unwrap()
    }

    fn user_v1() -> Schema {
        parse(r#"{"type":"record","name":"User","fields":[
            {"name":"id","type":"int"},
            {"name":"username","type":"string"},
            {"name":"sex","type":["null","string"],"default":null}]}"#)
    }

    fn user_record() -> Value {
        let rec: Record = [("id", Value::Int(1)), ("username", "abc".into()), ("sex", Value::Null)]
            .into_iter()
            .collect();
        rec.into()
    }

    #[test]
    fn same_schema_roundtrip() {
        let s = user_v1();
        let v = user_record();
        let bytes = encode(&s, &v).unwrap();
        assert_eq!(decode(&s, &s, &bytes).unwrap(), v);
    }

    #[test]
    fn added_field_takes_default() {
        let v2 = parse(r#"{"type":"record","name":"User","fields":[
            {"name":"id","type":"int"},
            {"name":"username","type":"string"},
            {"name":"sex","type":["null","string"],"default":null},
            {"name":"country","type":"string","default":"IN"}]}"#);
        let bytes = encode(&user_v1(), &user_record()).unwrap();
        let out = decode(&user_v1(), &v2, &bytes).unwrap().into_record().unwrap();
        assert_eq!(out.get("country"), Some(&Value::String("IN".into())));
        assert_eq!(out.get("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn removed_field_is_dropped() {
        let v0 = parse(r#"{"type":"record","name":"User","fields":[{"name":"id","type":"int"}]}"#);
        let bytes = encode(&user_v1(), &user_record()).unwrap();
        let out = decode(&user_v1(), &v0, &bytes).unwrap().into_record().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn missing_default_fails() {
        let v2 = parse(r#"{"type":"record","name":"User","fields":[
            {"name":"id","type":"int"},{"name":"age","type":"int"}]}"#);
        let bytes = encode(&user_v1(), &user_record()).unwrap();
        let err = decode(&user_v1(), &v2, &bytes).unwrap_err();
        assert!(matches!(err, Error::MissingDefault { ref field, .. } if field == "age"));
    }

    #[test]
    fn numeric_promotion() {
        let bytes = encode(&Schema::Int, &Value::Int(-7)).unwrap();
        assert_eq!(decode(&Schema::Int, &Schema::Long, &bytes).unwrap(), Value::Long(-7));
        assert_eq!(decode(&Schema::Int, &Schema::Double, &bytes).unwrap(), Value::Double(-7.0));
        let bytes = encode(&Schema::Float, &Value::Float(1.5)).unwrap();
        assert_eq!(decode(&Schema::Float, &Schema::Double, &bytes).unwrap(), Value::Double(1.5));
        assert!(matches!(
            decode(&Schema::Double, &Schema::Int, &encode(&Schema::Double, &Value::Double(1.0)).unwrap()),
            Err(Error::IncompatibleSchema(_)),
        ));
    }

    #[test]
    fn enum_symbols_resolve_by_name() {
        let w = parse(r#"{"type":"enum","name":"Suit","symbols":["SPADES","HEARTS","CLUBS"]}"#);
        let r = parse(r#"{"type":"enum","name":"Suit","symbols":["CLUBS","SPADES"],"default":"SPADES"}"#);
        let strict = parse(r#"{"type":"enum","name":"Suit","symbols":["CLUBS","SPADES"]}"#);

        let clubs = encode(&w, &Value::Enum("CLUBS".into())).unwrap();
        assert_eq!(clubs, vec![0x04]);
        assert_eq!(decode(&w, &r, &clubs).unwrap(), Value::Enum("CLUBS".into()));

        let hearts = encode(&w, &Value::Enum("HEARTS".into())).unwrap();
        assert_eq!(decode(&w, &r, &hearts).unwrap(), Value::Enum("SPADES".into()));
        assert!(matches!(
            decode(&w, &strict, &hearts),
            Err(Error::UnresolvableSymbol { ref symbol, .. }) if symbol == "HEARTS"
        ));
    }

    #[test]
    fn union_resolution() {
        let w = parse(r#"["null", "int", "string"]"#);
        let r = parse(r#"["null", "long"]"#);
        let int = encode(&w, &Value::Int(5)).unwrap();
        assert_eq!(decode(&w, &r, &int).unwrap(), Value::Long(5));
        let s = encode(&w, &Value::String("x".into())).unwrap();
        assert!(matches!(decode(&w, &r, &s), Err(Error::UnresolvableUnion { .. })));

        // Writer union into a non-union reader.
        assert_eq!(decode(&w, &Schema::Long, &int).unwrap(), Value::Long(5));
        // Non-union writer into a union reader.
        let plain = encode(&Schema::Int, &Value::Int(9)).unwrap();
        assert_eq!(decode(&Schema::Int, &r, &plain).unwrap(), Value::Long(9));
    }

    #[test]
    fn truncated_input_reports_offset() {
        let bytes = encode(&user_v1(), &user_record()).unwrap();
        let err = decode(&user_v1(), &user_v1(), &bytes[..3]).unwrap_err();
        assert!(matches!(err, Error::TruncatedData { offset: 3 }), "{err:?}");
        let err = decode(&Schema::Long, &Schema::Long, &[0x80, 0x80]).unwrap_err();
        assert!(matches!(err, Error::TruncatedData { offset: 2 }));
        let err = decode(&Schema::Double, &Schema::Double, &[0; 5]).unwrap_err();
        assert!(matches!(err, Error::TruncatedData { .. }));
    }

    #[test]
    fn malformed_input_is_invalid_data() {
        assert!(matches!(decode(&Schema::Boolean, &Schema::Boolean, &[7]), Err(Error::InvalidData { .. })));
        assert!(matches!(decode(&Schema::String, &Schema::String, &[0x01]), Err(Error::InvalidData { .. })));
        assert!(matches!(decode(&Schema::String, &Schema::String, &[0x02, 0xff]), Err(Error::InvalidData { .. })));
        let u = parse(r#"["null","int"]"#);
        assert!(matches!(decode(&u, &u, &[0x08]), Err(Error::InvalidData { .. })));
        let arr = Schema::array(Schema::Long);
        assert!(matches!(decode(&arr, &arr, &[0xfe, 0xff, 0xff, 0x0f]), Err(Error::InvalidData { .. })));
    }

    #[test]
    fn negative_block_counts_are_accepted() {
        // Two longs in one sized block: count -2, size 2, items 1 and 2.
        let arr = Schema::array(Schema::Long);
        let bytes = [0x03, 0x04, 0x02, 0x04, 0x00];
        assert_eq!(decode(&arr, &arr, &bytes).unwrap(), Value::array([1i64, 2]));

        // Skipped as a writer-only field in one jump.
        let w = parse(r#"{"type":"record","name":"R","fields":[
            {"name":"xs","type":{"type":"array","items":"long"}},{"name":"id","type":"int"}]}"#);
        let r = parse(r#"{"type":"record","name":"R","fields":[{"name":"id","type":"int"}]}"#);
        let mut rec_bytes = bytes.to_vec();
        rec_bytes.push(0x0e);
        let out = decode(&w, &r, &rec_bytes).unwrap().into_record().unwrap();
        assert_eq!(out.get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn zero_width_items_roundtrip() {
        let empties = parse(r#"{"type":"array","items":{"type":"record","name":"Empty","fields":[]}}"#);
        let v = Value::Array(vec![Record::new().into(), Record::new().into()]);
        let bytes = encode(&empties, &v).unwrap();
        assert_eq!(bytes, vec![0x04, 0x00]);
        assert_eq!(decode(&empties, &empties, &bytes).unwrap(), v);

        let fixed0 = parse(r#"{"type":"array","items":{"type":"fixed","name":"F0","size":0}}"#);
        let v = Value::Array(vec![Value::Fixed(Vec::new()); 3]);
        let bytes = encode(&fixed0, &v).unwrap();
        assert_eq!(decode(&fixed0, &fixed0, &bytes).unwrap(), v);

        let nested = parse(r#"{"type":"array","items":{"type":"record","name":"Pair","fields":[
            {"name":"a","type":"null"},{"name":"b","type":"null"}]}}"#);
        let pair: Record = [("a", Value::Null), ("b", Value::Null)].into_iter().collect();
        let v = Value::Array(vec![pair.into(); 4]);
        assert_eq!(decode(&nested, &nested, &encode(&nested, &v).unwrap()).unwrap(), v);
    }

    #[test]
    fn huge_zero_width_count_is_invalid() {
        let nulls = Schema::array(Schema::Null);
        let count = [0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(matches!(decode(&nulls, &nulls, &count), Err(Error::InvalidData { .. })));

        // Skipped as a writer-only field: bounded too, across blocks.
        let w = parse(r#"{"type":"record","name":"R","fields":[
            {"name":"xs","type":{"type":"array","items":"null"}},{"name":"id","type":"int"}]}"#);
        let r = parse(r#"{"type":"record","name":"R","fields":[{"name":"id","type":"int"}]}"#);
        assert!(matches!(decode(&w, &r, &count), Err(Error::InvalidData { .. })));

        let blocks = |counts: &[i64]| {
            let mut b = Vec::new();
            for c in counts {
                write_long(*c, &mut b);
            }
            b.extend_from_slice(&[0x00, 0x02]);
            b
        };
        let at_limit = blocks(&[MAX_ZERO_WIDTH_ITEMS as i64]);
        let out = decode(&w, &r, &at_limit).unwrap().into_record().unwrap();
        assert_eq!(out.get("id"), Some(&Value::Int(1)));
        let over = blocks(&[MAX_ZERO_WIDTH_ITEMS as i64, 1]);
        assert!(matches!(decode(&w, &r, &over), Err(Error::InvalidData { .. })));
    }

    #[test]
    fn min_width_of_schemas() {
        let s = parse(r#"{"type":"record","name":"Node","fields":[
            {"name":"tag","type":{"type":"fixed","name":"Tag","size":3}},
            {"name":"weight","type":"double"},
            {"name":"unit","type":"null"},
            {"name":"next","type":["null","Node"]}]}"#);
        let names = s.names();
        assert_eq!(min_width(&s, &names), 3 + 8 + 0 + 1);
        assert_eq!(min_width(&Schema::Null, &names), 0);
        assert_eq!(min_width(&Schema::array(Schema::Null), &names), 1);
    }

    #[test]
    fn recursive_schema_roundtrip() {
        let s = parse(r#"{"type":"record","name":"Node","fields":[
            {"name":"value","type":"long"},
            {"name":"next","type":["null","Node"]}]}"#);
        let leaf: Record = [("value", Value::Long(2)), ("next", Value::Null)].into_iter().collect();
        let head: Record = [("value", Value::Long(1)), ("next", Value::Record(leaf))].into_iter().collect();
        let v = Value::Record(head);
        let bytes = encode(&s, &v).unwrap();
        assert_eq!(decode(&s, &s, &bytes).unwrap(), v);
    }
}
