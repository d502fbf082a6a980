//! Schema-driven binary record serialization with self-describing
//! container files.
//!
//! Records are described by JSON schema text, encoded positionally into a
//! compact binary form, and stored in containers that carry their writer
//! schema and compression codec in the header.  Data written with one
//! schema version can be read with another through schema resolution.

pub mod block;
pub mod codec;
pub mod config;
pub mod datafile;
pub mod encoding;
pub mod error;
pub mod header;
pub mod io_stream;
pub mod lock;
pub mod recovery;
pub mod schema;
pub mod value;

pub use codec::{get_codec, Codec, CodecError, CodecId, CodecRegistry};
pub use config::{CreateMode, ReadOptions, WriteOptions};
pub use datafile::{append_file, read_file, write_file, DataFileReader, DataFileWriter};
pub use encoding::{decode, encode, encode_into};
pub use error::{Error, Result};
pub use header::Header;
pub use io_stream::{ContainerReader, ContainerWriter};
pub use schema::{
    check_compatibility, validate, EnumSchema, FixedSchema, Name, RecordField, RecordSchema, Schema,
    UnionSchema, ValidationMode,
};
pub use value::{FromValue, Record, SpecificRecord, Value};
