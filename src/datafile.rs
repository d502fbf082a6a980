//! Path-based data files: the primary embedding surface.
//!
//! ```no_run
//! use recfile::{DataFileReader, DataFileWriter, Record, Schema, WriteOptions};
//!
//! let schema = Schema::parse_str(r#"{"type":"record","name":"User","fields":[
//!     {"name":"id","type":"int"},{"name":"username","type":"string"}]}"#)?;
//!
//! // Write
//! let mut w = DataFileWriter::create("users.rec", schema, &WriteOptions::default())?;
//! let mut user = Record::new();
//! user.put("id", 1).put("username", "abc");
//! w.append(&user.into())?;
//! w.close()?;
//!
//! // Read
//! for value in DataFileReader::open("users.rec")? {
//!     println!("{:?}", value?);
//! }
//! # Ok::<(), recfile::Error>(())
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::config::{CreateMode, ReadOptions, WriteOptions};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::io_stream::{ContainerReader, ContainerWriter};
use crate::lock::WriterLock;
use crate::schema::Schema;
use crate::value::{SpecificRecord, Value};

// ── Writer ────────────────────────────────────────────────────────────────────

/// Exclusive write session over one file.
///
/// At most one `DataFileWriter` per path exists in the process at a time.
/// If writing a block fails, the file is cut back to the end of the last
/// complete block before the error is returned, and the session stays
/// usable.  Dropping the writer flushes through the same path.
pub struct DataFileWriter {
    // Field order matters: the writer flushes on drop before the lock goes.
    writer: ContainerWriter<File>,
    path:   PathBuf,
    _lock:  WriterLock,
}

impl DataFileWriter {
    /// Start a new file.  Options are checked before the file is touched, so
    /// a bad codec name leaves an existing file intact.
    pub fn create<P: AsRef<Path>>(path: P, schema: Schema, options: &WriteOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let lock = WriterLock::acquire(&path)?;
        let codec = options.registry.get(&options.codec)?;
        let mut open = OpenOptions::new();
        open.read(true).write(true);
        match options.create_mode {
            CreateMode::CreateNew => open.create_new(true),
            CreateMode::Truncate  => open.create(true).truncate(true),
        };
        let file = open.open(&path)?;
        let writer = ContainerWriter::with_codec(schema, file, codec, options);
        log::debug!("data file created: {}", path.display());
        Ok(Self { writer, path, _lock: lock })
    }

    /// Reopen an existing file and continue after its last block.
    pub fn open_append<P: AsRef<Path>>(path: P, options: &WriteOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let lock = WriterLock::acquire(&path)?;
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let writer = ContainerWriter::append_to(file, options)?;
        Ok(Self { writer, path, _lock: lock })
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn header(&self) -> &Header { self.writer.header() }
    pub fn schema(&self) -> &Schema { self.writer.schema() }
    pub fn records_written(&self) -> u64 { self.writer.records_written() }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        self.writer.set_metadata(key, value)
    }

    pub fn append(&mut self, value: &Value) -> Result<()> {
        let result = self.writer.append(value).map(drop);
        self.guard(result)
    }

    pub fn append_specific<T: SpecificRecord>(&mut self, record: &T) -> Result<()> {
        let result = self.writer.append_specific(record).map(drop);
        self.guard(result)
    }

    pub fn extend<'v, I>(&mut self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let mut n = 0;
        for v in values {
            self.append(v)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn flush(&mut self) -> Result<()> {
        let result = self.writer.flush();
        self.guard(result)
    }

    /// Flush, sync to disk and release the file and the lock.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        let file = self.writer.finish()?;
        file.sync_all()?;
        log::debug!("data file closed: {}", self.path.display());
        Ok(())
    }

    /// On a stream or codec failure, cut the file back to the last
    /// complete block so no partial block remains.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e @ (Error::Io(_) | Error::Codec(_))) = &result {
            let boundary = self.writer.committed_offset();
            log::warn!("write to {} failed ({e}); truncating to {boundary}", self.path.display());
            if let Some(file) = self.writer.get_mut() {
                file.set_len(boundary)?;
                file.seek(SeekFrom::Start(boundary))?;
                self.writer.resume_at_committed();
            }
        }
        result
    }
}

impl Drop for DataFileWriter {
    fn drop(&mut self) {
        if self.writer.get_ref().is_none() {
            return;
        }
        let result = self.writer.flush();
        if let Err(e) = self.guard(result) {
            log::warn!("data file {} dropped with unflushed records: {e}", self.path.display());
        }
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Forward-only read session over one file.  Any number may be open.
pub struct DataFileReader {
    inner: ContainerReader<BufReader<File>>,
    path:  PathBuf,
}

impl DataFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, None, ReadOptions::default())
    }

    pub fn open_with_schema<P: AsRef<Path>>(path: P, reader_schema: Schema) -> Result<Self> {
        Self::open_with_options(path, Some(reader_schema), ReadOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path:          P,
        reader_schema: Option<Schema>,
        options:       ReadOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = BufReader::new(File::open(&path)?);
        let inner = ContainerReader::with_options(file, reader_schema, options)?;
        Ok(Self { inner, path })
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn header(&self) -> &Header { self.inner.header() }
    pub fn writer_schema(&self) -> &Schema { self.inner.writer_schema() }
    pub fn reader_schema(&self) -> &Schema { self.inner.reader_schema() }

    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        self.inner.metadata(key)
    }

    pub fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    pub fn next_record(&mut self) -> Result<Option<Value>> {
        self.inner.next_record()
    }

    pub fn next_specific<T: SpecificRecord>(&mut self) -> Result<Option<T>> {
        self.inner.next_specific()
    }
}

impl Iterator for DataFileReader {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

// ── Convenience ──────────────────────────────────────────────────────────────

/// Write `records` to a new file at `path`; returns the record count.
pub fn write_file<'v, P, I>(path: P, schema: Schema, records: I, options: &WriteOptions) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'v Value>,
{
    let mut w = DataFileWriter::create(path, schema, options)?;
    w.extend(records)?;
    w.flush()?;
    let n = w.records_written();
    w.close()?;
    Ok(n)
}

/// Append `records` to the existing file at `path`; returns how many were
/// appended.
pub fn append_file<'v, P, I>(path: P, records: I, options: &WriteOptions) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'v Value>,
{
    let mut w = DataFileWriter::open_append(path, options)?;
    w.extend(records)?;
    w.flush()?;
    let n = w.records_written();
    w.close()?;
    Ok(n)
}

/// Read every record of the file at `path`, resolved into `reader_schema`
/// when given.
pub fn read_file<P: AsRef<Path>>(path: P, reader_schema: Option<&Schema>) -> Result<Vec<Value>> {
    let reader = DataFileReader::open_with_options(path, reader_schema.cloned(), ReadOptions::default())?;
    reader.collect()
}
