//! Crate-wide error type.
//!
//! Compression failures keep their own [`CodecError`] (see `codec`) and are
//! wrapped here; everything else is reported through [`Error`] with enough
//! context (byte offset, field path, schema name) for the caller to decide
//! between skipping and aborting.  Nothing in this crate retries.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    /// A value does not fit the schema of `field` (dotted path for nested
    /// records, empty for the top level).
    #[error("Field error at '{field}': {reason}")]
    Field { field: String, reason: String },

    #[error("Reader field '{record}.{field}' is absent from the writer schema and has no default")]
    MissingDefault { record: String, field: String },

    #[error("Enum '{name}' cannot resolve writer symbol '{symbol}' and declares no default")]
    UnresolvableSymbol { name: String, symbol: String },

    #[error("No branch of reader schema {reader} matches writer schema {writer}")]
    UnresolvableUnion { writer: String, reader: String },

    #[error("Incompatible schemas: {0}")]
    IncompatibleSchema(String),

    #[error("Truncated data at byte offset {offset}")]
    TruncatedData { offset: u64 },

    #[error("Invalid data at byte offset {offset}: {reason}")]
    InvalidData { offset: u64, reason: String },

    #[error("Corrupt container at byte offset {offset}: {reason}")]
    CorruptContainer { offset: u64, reason: String },

    #[error("Invalid container magic")]
    InvalidMagic,

    #[error("Codec '{0}' is not registered")]
    UnknownCodec(String),

    #[error("Metadata key '{0}' uses the reserved 'avro.' prefix")]
    ReservedMetadataKey(String),

    #[error("Another writer already holds {}", path.display())]
    WriterBusy { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Field { field: field.into(), reason: reason.into() }
    }

    /// Prefix the field path of a `Field` error with `parent`.
    pub(crate) fn within(self, parent: &str) -> Self {
        match self {
            Error::Field { field, reason } => {
                let field = if field.is_empty() {
                    parent.to_owned()
                } else if field.starts_with('[') {
                    format!("{parent}{field}")
                } else {
                    format!("{parent}.{field}")
                };
                Error::Field { field, reason }
            }
            other => other,
        }
    }

    /// Shift the offset of a positional error by `base` bytes, used when a
    /// buffer is decoded from the middle of a larger stream.
    pub(crate) fn at_base(self, base: u64) -> Self {
        match self {
            Error::TruncatedData { offset } => Error::TruncatedData { offset: offset + base },
            Error::InvalidData { offset, reason } => Error::InvalidData { offset: offset + base, reason },
            other => other,
        }
    }

    /// True for failures that concern a single record's shape rather than
    /// the byte stream: the reader can skip that record and continue.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::Field { .. }
                | Error::MissingDefault { .. }
                | Error::UnresolvableSymbol { .. }
                | Error::UnresolvableUnion { .. }
                | Error::IncompatibleSchema(_)
        )
    }
}
