//! Block compression codecs and the name registry.
//!
//! # Identity rules
//! A codec is identified by the name stored under `avro.codec` in the
//! container header.  That name is:
//!   - Written once per file, never per block.
//!   - Looked up in a [`CodecRegistry`] when the file is opened.
//!   - Matched case-insensitively, aliases included (`zstd` = `zstandard`).
//!
//! A reader that cannot resolve the header's codec name fails immediately
//! with `UnknownCodec`; it never guesses.
//!
//! # Framing
//! Codecs transform a whole block payload.  Formats that carry no length of
//! their own are framed so the payload is self-describing:
//!   - `snappy`: raw snappy, then a 4-byte big-endian CRC32 of the
//!     *uncompressed* bytes, verified on decompress.
//!   - `lz4`: lz4_flex block with the uncompressed size prepended.
//!   - `deflate`: raw RFC 1951, no zlib header.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use thiserror::Error;

use crate::error::{Error as CrateError, Result as CrateResult};

/// Level used when the caller does not pick one.  Each codec clamps it into
/// its own range; codecs without levels ignore it.
pub const DEFAULT_LEVEL: i32 = 6;

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// Built-in codec discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Null,
    Deflate,
    Snappy,
    Zstandard,
    Xz,
    Lz4,
    Brotli,
}

impl CodecId {
    pub const ALL: [CodecId; 7] = [
        CodecId::Null,
        CodecId::Deflate,
        CodecId::Snappy,
        CodecId::Zstandard,
        CodecId::Xz,
        CodecId::Lz4,
        CodecId::Brotli,
    ];

    /// Canonical name, as written to the header.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Null      => "null",
            CodecId::Deflate   => "deflate",
            CodecId::Snappy    => "snappy",
            CodecId::Zstandard => "zstandard",
            CodecId::Xz        => "xz",
            CodecId::Lz4       => "lz4",
            CodecId::Brotli    => "brotli",
        }
    }

    /// Other names accepted on read and in options.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CodecId::Null      => &["identity", "none"],
            CodecId::Zstandard => &["zstd"],
            _                  => &[],
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.name() == s || id.aliases().contains(&s.as_str()))
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    /// Canonical name written to the container header.
    fn name(&self) -> &str;
    /// Additional names this codec answers to in a registry.
    fn aliases(&self) -> &[&str] { &[] }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NullCodec;
impl Codec for NullCodec {
    fn name(&self) -> &str { CodecId::Null.name() }
    fn aliases(&self) -> &[&str] { CodecId::Null.aliases() }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8])        -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct DeflateCodec;
impl Codec for DeflateCodec {
    fn name(&self) -> &str { CodecId::Deflate.name() }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let level = flate2::Compression::new(level.clamp(0, 9) as u32);
        let mut enc = flate2::write::DeflateEncoder::new(Vec::with_capacity(data.len() / 2), level);
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        flate2::read::DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct SnappyCodec;
impl Codec for SnappyCodec {
    fn name(&self) -> &str { CodecId::Snappy.name() }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        out.extend_from_slice(&crc32fast::hash(data).to_be_bytes());
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        if data.len() < 4 {
            return Err(CodecError::Decompression("snappy block shorter than its checksum".into()));
        }
        let (body, crc) = data.split_at(data.len() - 4);
        let out = snap::raw::Decoder::new()
            .decompress_vec(body)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        let stored = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = crc32fast::hash(&out);
        if stored != computed {
            return Err(CodecError::ChecksumMismatch { stored, computed });
        }
        Ok(out)
    }
}

pub struct ZstandardCodec;
impl Codec for ZstandardCodec {
    fn name(&self) -> &str { CodecId::Zstandard.name() }
    fn aliases(&self) -> &[&str] { CodecId::Zstandard.aliases() }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level.clamp(1, 22)).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct XzCodec;
impl Codec for XzCodec {
    fn name(&self) -> &str { CodecId::Xz.name() }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::xz_compress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::xz_decompress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn name(&self) -> &str { CodecId::Lz4.name() }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn name(&self) -> &str { CodecId::Brotli.name() }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let quality = level.clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        brotli::Decompressor::new(data, 4096)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Null      => Box::new(NullCodec),
        CodecId::Deflate   => Box::new(DeflateCodec),
        CodecId::Snappy    => Box::new(SnappyCodec),
        CodecId::Zstandard => Box::new(ZstandardCodec),
        CodecId::Xz        => Box::new(XzCodec),
        CodecId::Lz4       => Box::new(Lz4Codec),
        CodecId::Brotli    => Box::new(BrotliCodec),
    }
}

fn builtin(name: &str) -> CrateResult<Box<dyn Codec>> {
    CodecId::from_name(name)
        .map(get_codec)
        .ok_or_else(|| CrateError::UnknownCodec(name.to_owned()))
}

/// Compress `data` with the built-in codec called `name` at [`DEFAULT_LEVEL`].
pub fn compress(name: &str, data: &[u8]) -> CrateResult<Vec<u8>> {
    Ok(builtin(name)?.compress(data, DEFAULT_LEVEL)?)
}

/// Inverse of [`compress`].
pub fn decompress(name: &str, data: &[u8]) -> CrateResult<Vec<u8>> {
    Ok(builtin(name)?.decompress(data)?)
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Name → codec table consulted by writers and readers.
///
/// Cloning is cheap: entries are shared `Arc`s.  A registered codec replaces
/// any existing entry under the same name or alias.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// An empty registry; not even `null` is available.
    pub fn empty() -> Self {
        Self { codecs: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        for id in CodecId::ALL {
            reg.register(Arc::from(get_codec(id)));
        }
        reg
    }

    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        for alias in codec.aliases() {
            self.codecs.insert(alias.to_ascii_lowercase(), Arc::clone(&codec));
        }
        self.codecs.insert(codec.name().to_ascii_lowercase(), codec);
    }

    pub fn get(&self, name: &str) -> CrateResult<Arc<dyn Codec>> {
        self.codecs
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CrateError::UnknownCodec(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, aliases included, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CodecRegistry {
    fn default() -> Self { Self::with_builtins() }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry").field("codecs", &self.names()).finish()
    }
}
