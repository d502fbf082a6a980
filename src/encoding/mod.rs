//! Binary encoding of values against a schema.
//!
//! # Wire format
//! No field names, tags or type markers are written; position is the
//! protocol, so a decoder always needs the writer's schema.
//!
//! | Type | Encoding |
//! |------|----------|
//! | `null` | nothing |
//! | `boolean` | one byte, 0 or 1 |
//! | `int`, `long` | zig-zag, then base-128 varint (low group first) |
//! | `float`, `double` | 4 / 8 bytes IEEE-754 little-endian |
//! | `bytes`, `string` | varint length, raw bytes (UTF-8 for strings) |
//! | `fixed` | exactly `size` raw bytes |
//! | `enum` | varint symbol index |
//! | `union` | varint branch index, then the branch |
//! | `array`, `map` | blocks of `[count][items]`, closed by a zero count; map items are `[key string][value]` |
//! | `record` | fields in schema order |
//!
//! A negative array/map block count `-n` means `n` items preceded by the
//! block's byte size; the encoder never writes it but the decoder accepts it.

pub mod decode;

pub use decode::{decode, SliceReader};

use std::io::Read;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::schema::{resolve, select_branch, Names, Schema};
use crate::value::Value;

// ── Varints ──────────────────────────────────────────────────────────────────

#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

/// Append the zig-zag varint of `n` (1–10 bytes).
pub fn write_long(n: i64, buf: &mut Vec<u8>) {
    let mut z = zigzag_encode(n);
    while z >= 0x80 {
        buf.push((z as u8) | 0x80);
        z >>= 7;
    }
    buf.push(z as u8);
}

#[inline]
pub fn write_int(n: i32, buf: &mut Vec<u8>) {
    write_long(i64::from(n), buf)
}

/// Length-prefixed byte string.
pub fn write_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    write_long(bytes.len() as i64, buf);
    buf.extend_from_slice(bytes);
}

/// Read a zig-zag varint from a stream, advancing `pos` by the bytes
/// consumed.  Returns `Ok(None)` on end-of-stream before the first byte, so
/// callers can tell a clean end from a cut-off varint.
pub(crate) fn read_long_from<R: Read>(reader: &mut R, pos: &mut u64) -> Result<Option<i64>> {
    let start = *pos;
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            return if shift == 0 { Ok(None) } else { Err(Error::TruncatedData { offset: *pos }) };
        }
        *pos += 1;
        if shift >= 64 {
            return Err(Error::InvalidData { offset: start, reason: "varint longer than 10 bytes".into() });
        }
        value |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(Some(zigzag_decode(value)));
        }
        shift += 7;
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────────

/// Encode `value` as `schema` into a fresh buffer.
pub fn encode(schema: &Schema, value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(schema, value, &mut buf)?;
    Ok(buf)
}

/// Encode `value` as `schema`, appending to `buf`.  On error `buf` may hold
/// a partial encoding; callers that share the buffer truncate it back.
pub fn encode_into(schema: &Schema, value: &Value, buf: &mut Vec<u8>) -> Result<()> {
    let names = schema.names();
    encode_value(schema, value, &names, buf)
}

pub(crate) fn encode_value(schema: &Schema, value: &Value, names: &Names, buf: &mut Vec<u8>) -> Result<()> {
    let schema = resolve(schema, names)?;
    match (schema, value) {
        (Schema::Null, Value::Null) => {}
        (Schema::Boolean, Value::Boolean(b)) => buf.push(u8::from(*b)),
        (Schema::Int, Value::Int(i)) => write_int(*i, buf),
        (Schema::Long, Value::Int(i)) => write_long(i64::from(*i), buf),
        (Schema::Long, Value::Long(l)) => write_long(*l, buf),
        (Schema::Float, Value::Int(i)) => buf.write_f32::<LittleEndian>(*i as f32)?,
        (Schema::Float, Value::Long(l)) => buf.write_f32::<LittleEndian>(*l as f32)?,
        (Schema::Float, Value::Float(f)) => buf.write_f32::<LittleEndian>(*f)?,
        (Schema::Double, Value::Int(i)) => buf.write_f64::<LittleEndian>(f64::from(*i))?,
        (Schema::Double, Value::Long(l)) => buf.write_f64::<LittleEndian>(*l as f64)?,
        (Schema::Double, Value::Float(f)) => buf.write_f64::<LittleEndian>(f64::from(*f))?,
        (Schema::Double, Value::Double(d)) => buf.write_f64::<LittleEndian>(*d)?,
        (Schema::Bytes, Value::Bytes(b)) => write_bytes(b, buf),
        (Schema::String, Value::String(s)) => write_bytes(s.as_bytes(), buf),
        (Schema::Fixed(f), Value::Fixed(b)) => {
            if b.len() != f.size() {
                return Err(Error::field("", format!("fixed {} needs {} bytes, got {}", f.name(), f.size(), b.len())));
            }
            buf.extend_from_slice(b);
        }
        (Schema::Enum(e), Value::Enum(sym)) => match e.index_of(sym) {
            Some(i) => write_long(i as i64, buf),
            None    => return Err(Error::field("", format!("'{sym}' is not a symbol of {}", e.name()))),
        },
        (Schema::Array(items), Value::Array(vs)) => {
            if !vs.is_empty() {
                write_long(vs.len() as i64, buf);
                for (i, v) in vs.iter().enumerate() {
                    encode_value(items, v, names, buf).map_err(|e| e.within(&format!("[{i}]")))?;
                }
            }
            write_long(0, buf);
        }
        (Schema::Map(values), Value::Map(m)) => {
            if !m.is_empty() {
                write_long(m.len() as i64, buf);
                for (k, v) in m {
                    write_bytes(k.as_bytes(), buf);
                    encode_value(values, v, names, buf).map_err(|e| e.within(&format!("[{k}]")))?;
                }
            }
            write_long(0, buf);
        }
        (Schema::Union(u), v) => {
            let (index, branch) = select_branch(u, v, names).ok_or_else(|| {
                Error::field("", format!("{} matches no branch of {schema}", v.kind()))
            })?;
            write_long(index as i64, buf);
            encode_value(branch, v, names, buf)?;
        }
        (Schema::Record(r), Value::Record(rec)) => {
            for f in r.fields() {
                let written = match (rec.get(f.name()), f.default()) {
                    (Some(v), _) => encode_value(f.schema(), v, names, buf),
                    (None, Some(d)) => Value::from_json(f.schema(), d, names)
                        .and_then(|dv| encode_value(f.schema(), &dv, names, buf)),
                    (None, None) => Err(Error::field("", "missing required field")),
                };
                written.map_err(|e| e.within(f.name()))?;
            }
        }
        (s, v) => return Err(Error::field("", format!("expected {}, found {}", s.describe(), v.kind()))),
    }
    Ok(())
}
