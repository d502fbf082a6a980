//! Writer and reader configuration.
//!
//! Both option structs deserialize from JSON with every field optional, so an
//! embedding application can keep them in its own config files.  The codec
//! registry is runtime-only and never serialized.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{CodecRegistry, DEFAULT_LEVEL};
use crate::error::{Error, Result};
use crate::schema::ValidationMode;

/// Default uncompressed block size threshold: 64 KiB.
pub const DEFAULT_BLOCK_SIZE_BYTES: usize = 64 * 1024;
/// Default record-count threshold per block.
pub const DEFAULT_BLOCK_MAX_RECORDS: usize = 4096;

/// What to do when a data file is created over an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Fail if the file already exists.
    CreateNew,
    /// Replace any existing file.
    #[default]
    Truncate,
}

/// Configuration for container writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Codec name or alias (default: "null")
    pub codec:             String,
    /// Compression level, clamped per codec (default: 6)
    pub level:             i32,
    /// Flush a block once its uncompressed payload reaches this size
    pub block_size_bytes:  usize,
    /// Flush a block once it holds this many records
    pub block_max_records: usize,
    /// How appended records are validated (default: strict)
    pub validation:        ValidationMode,
    /// Behavior of `DataFileWriter::create` on an existing file
    pub create_mode:       CreateMode,
    #[serde(skip)]
    pub registry:          CodecRegistry,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            codec:             "null".to_owned(),
            level:             DEFAULT_LEVEL,
            block_size_bytes:  DEFAULT_BLOCK_SIZE_BYTES,
            block_max_records: DEFAULT_BLOCK_MAX_RECORDS,
            validation:        ValidationMode::default(),
            create_mode:       CreateMode::default(),
            registry:          CodecRegistry::default(),
        }
    }
}

impl WriteOptions {
    pub fn with_codec(mut self, codec: &str) -> Self {
        self.codec = codec.to_owned();
        self
    }

    pub fn with_block_max_records(mut self, n: usize) -> Self {
        self.block_max_records = n;
        self
    }

    pub fn with_create_mode(mut self, mode: CreateMode) -> Self {
        self.create_mode = mode;
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid write options: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&read_config(path.as_ref())?)
    }
}

/// Configuration for container readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Skip records that fail schema resolution instead of returning the
    /// error (default: false).  The stream stays aligned either way.
    pub skip_unresolvable: bool,
    #[serde(skip)]
    pub registry:          CodecRegistry,
}

impl ReadOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid read options: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&read_config(path.as_ref())?)
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))
}
