//! Container file header.
//!
//! ```text
//! [4-byte magic "Obj\x01"]
//! [metadata map<string, bytes>: blocks of varint count + entries, closed by 0]
//! [16-byte sync marker]
//! ```
//!
//! The map always carries `avro.schema` (schema JSON text) and `avro.codec`
//! (codec name).  User metadata shares the map but may not use the `avro.`
//! prefix.  The sync marker is random per file and repeated after every block.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use uuid::Uuid;

use crate::codec::CodecId;
use crate::encoding::{read_long_from, write_bytes, write_long};
use crate::error::{Error, Result};
use crate::schema::Schema;

pub const MAGIC: &[u8; 4] = b"Obj\x01";
pub const SYNC_SIZE: usize = 16;

pub const SCHEMA_KEY: &str = "avro.schema";
pub const CODEC_KEY: &str = "avro.codec";
pub const RESERVED_PREFIX: &str = "avro.";

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub schema:   Schema,
    /// Codec name as stored; resolved against a registry by the reader.
    pub codec:    String,
    pub sync:     [u8; SYNC_SIZE],
    /// User metadata, reserved keys excluded.
    pub metadata: BTreeMap<String, Vec<u8>>,
}

impl Header {
    /// Fresh header with a random sync marker.
    pub fn new(schema: Schema, codec: &str) -> Self {
        Self {
            schema,
            codec:    codec.to_owned(),
            sync:     Uuid::new_v4().into_bytes(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        if key.starts_with(RESERVED_PREFIX) {
            return Err(Error::ReservedMetadataKey(key.to_owned()));
        }
        self.metadata.insert(key.to_owned(), value);
        Ok(())
    }

    pub fn sync_hex(&self) -> String {
        hex::encode(self.sync)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);
        write_long((self.metadata.len() + 2) as i64, &mut buf);
        write_bytes(SCHEMA_KEY.as_bytes(), &mut buf);
        write_bytes(self.schema.to_string().as_bytes(), &mut buf);
        write_bytes(CODEC_KEY.as_bytes(), &mut buf);
        write_bytes(self.codec.as_bytes(), &mut buf);
        for (k, v) in &self.metadata {
            write_bytes(k.as_bytes(), &mut buf);
            write_bytes(v, &mut buf);
        }
        write_long(0, &mut buf);
        buf.extend_from_slice(&self.sync);
        buf
    }

    /// Write the header; returns the number of bytes written.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<u64> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut pos = 0;
        Self::read_at(&mut reader, &mut pos)
    }

    /// Read a header, advancing `pos` past it.
    pub(crate) fn read_at<R: Read>(reader: &mut R, pos: &mut u64) -> Result<Self> {
        let mut magic = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut magic) {
            return match e.kind() {
                io::ErrorKind::UnexpectedEof => Err(Error::InvalidMagic),
                _ => Err(e.into()),
            };
        }
        if &magic != MAGIC {
            return Err(Error::InvalidMagic);
        }
        *pos += MAGIC.len() as u64;

        let mut schema_text = None;
        let mut codec = None;
        let mut metadata = BTreeMap::new();
        loop {
            let at = *pos;
            let count = read_long_from(reader, pos)?.ok_or(Error::TruncatedData { offset: *pos })?;
            if count == 0 {
                break;
            }
            if count < 0 {
                // Sized block: the byte size is informational here.
                read_long_from(reader, pos)?.ok_or(Error::TruncatedData { offset: *pos })?;
            }
            for _ in 0..count.unsigned_abs() {
                let key = String::from_utf8(read_chunk(reader, pos)?).map_err(|_| Error::CorruptContainer {
                    offset: at,
                    reason: "metadata key is not valid UTF-8".into(),
                })?;
                let value = read_chunk(reader, pos)?;
                match key.as_str() {
                    SCHEMA_KEY => schema_text = Some(value),
                    CODEC_KEY  => codec = Some(value),
                    _          => { metadata.insert(key, value); }
                }
            }
        }

        let schema_text = schema_text.ok_or_else(|| Error::CorruptContainer {
            offset: *pos,
            reason: format!("header has no '{SCHEMA_KEY}' entry"),
        })?;
        let schema_text = String::from_utf8(schema_text)
            .map_err(|_| Error::SchemaParse("writer schema is not valid UTF-8".into()))?;
        let schema = Schema::parse_str(&schema_text)?;
        let codec = match codec {
            Some(bytes) => String::from_utf8(bytes).map_err(|_| Error::CorruptContainer {
                offset: *pos,
                reason: "codec name is not valid UTF-8".into(),
            })?,
            None => CodecId::Null.name().to_owned(),
        };

        let mut sync = [0u8; SYNC_SIZE];
        reader.read_exact(&mut sync).map_err(|e| eof_as_truncated(e, *pos))?;
        *pos += SYNC_SIZE as u64;

        Ok(Self { schema, codec, sync, metadata })
    }
}

/// Read a varint length and that many bytes, without trusting the length
/// for allocation.
pub(crate) fn read_chunk<R: Read>(reader: &mut R, pos: &mut u64) -> Result<Vec<u8>> {
    let at = *pos;
    let len = read_long_from(reader, pos)?.ok_or(Error::TruncatedData { offset: *pos })?;
    let len = u64::try_from(len).map_err(|_| Error::CorruptContainer {
        offset: at,
        reason: format!("negative length {len}"),
    })?;
    let mut out = Vec::new();
    let got = reader.by_ref().take(len).read_to_end(&mut out)? as u64;
    *pos += got;
    if got < len {
        return Err(Error::TruncatedData { offset: *pos });
    }
    Ok(out)
}

pub(crate) fn eof_as_truncated(e: io::Error, offset: u64) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::TruncatedData { offset },
        _ => e.into(),
    }
}
