//! Streaming container engine: writer and reader.
//!
//! # Writer
//! [`ContainerWriter`] validates and encodes records into an in-memory
//! block buffer.  When the buffer reaches `block_size_bytes` or holds
//! `block_max_records` records it is compressed and written as one framed
//! block ending in the file's sync marker.  The header is written lazily
//! with the first block (or on `flush`/`close`), so user metadata can be set
//! until then.
//!
//! A record is accepted only when `append` returns `Ok`.  If writing a block
//! to the stream fails, the stream may end in a partial block, so the writer
//! marks itself failed and refuses further writes.  A seekable owner that
//! cuts the stream back to [`ContainerWriter::committed_offset`] may resume
//! it (`DataFileWriter` does this for files).
//!
//! # Appending
//! [`ContainerWriter::append_to`] reopens an existing container: it parses
//! the header, reuses its schema, codec and sync marker verbatim, seeks to
//! the end, and continues adding blocks.  Readers cannot tell an appended
//! block from an original one.
//!
//! # Reader
//! [`ContainerReader`] parses the header, resolves the codec (fail hard if
//! the registry lacks it), and then yields records lazily one block at a
//! time.  Every block's trailing sync is checked against the header's.
//!
//! A record whose writer data cannot be resolved into the reader schema is
//! skipped with the writer schema, so the stream stays aligned and the next
//! call continues with the following record.  Corruption (bad sync, short
//! block, undecodable payload) ends the stream.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::block::{decode_block, encode_block, read_block};
use crate::codec::Codec;
use crate::config::{ReadOptions, WriteOptions};
use crate::encoding::decode::{decode_value, skip_value};
use crate::encoding::SliceReader;
use crate::error::{Error, Result};
use crate::header::{Header, SYNC_SIZE};
use crate::encoding::encode_value;
use crate::schema::{check_compatibility, validate_value, Names, Schema, ValidationMode};
use crate::value::{SpecificRecord, Value};

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter<W: Write> {
    inner:             Option<W>,
    header:            Header,
    names:             Names,
    header_written:    bool,
    failed:            bool,
    codec:             Arc<dyn Codec>,
    level:             i32,
    block_size_bytes:  usize,
    block_max_records: usize,
    validation:        ValidationMode,

    buffer:            Vec<u8>,
    pending:           u64,
    /// Stream offset just past the last fully written block (or header).
    committed:         u64,
    records_written:   u64,
    blocks_written:    u64,
}

impl<W: Write> ContainerWriter<W> {
    /// Start a new container on `inner` with a fresh sync marker.
    pub fn new(schema: Schema, inner: W, options: &WriteOptions) -> Result<Self> {
        let codec = options.registry.get(&options.codec)?;
        Ok(Self::with_codec(schema, inner, codec, options))
    }

    /// Like [`new`](Self::new) with the codec already resolved; cannot fail.
    pub(crate) fn with_codec(schema: Schema, inner: W, codec: Arc<dyn Codec>, options: &WriteOptions) -> Self {
        let header = Header::new(schema, codec.name());
        log::debug!("container writer opened: codec={}, sync={}", header.codec, header.sync_hex());
        Self::from_parts(inner, header, false, 0, codec, options)
    }

    fn from_parts(
        inner:          W,
        header:         Header,
        header_written: bool,
        committed:      u64,
        codec:          Arc<dyn Codec>,
        options:        &WriteOptions,
    ) -> Self {
        Self {
            inner:             Some(inner),
            names:             header.schema.names(),
            header,
            header_written,
            failed:            false,
            codec,
            level:             options.level,
            block_size_bytes:  options.block_size_bytes.max(1),
            block_max_records: options.block_max_records.max(1),
            validation:        options.validation,
            buffer:            Vec::new(),
            pending:           0,
            committed,
            records_written:   0,
            blocks_written:    0,
        }
    }

    pub fn schema(&self) -> &Schema { &self.header.schema }
    pub fn header(&self) -> &Header { &self.header }
    pub fn codec_name(&self) -> &str { &self.header.codec }
    pub fn sync_marker(&self) -> &[u8; SYNC_SIZE] { &self.header.sync }
    pub fn records_written(&self) -> u64 { self.records_written }
    pub fn blocks_written(&self) -> u64 { self.blocks_written }
    /// Records buffered but not yet written as a block.
    pub fn pending_records(&self) -> u64 { self.pending }
    pub fn committed_offset(&self) -> u64 { self.committed }
    /// True after a stream write failed part-way through.
    pub fn is_failed(&self) -> bool { self.failed }

    /// Resume after the owner cut the stream back to `committed_offset`.
    pub(crate) fn resume_at_committed(&mut self) {
        self.failed = false;
    }

    pub fn get_ref(&self) -> Option<&W> { self.inner.as_ref() }
    pub fn get_mut(&mut self) -> Option<&mut W> { self.inner.as_mut() }

    /// Attach user metadata; only possible before the header is written.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        if self.header_written {
            return Err(Error::Config(format!(
                "metadata '{key}' must be set before the first block is written"
            )));
        }
        self.header.set_metadata(key, value.into())
    }

    /// Validate, encode and buffer one record; writes a block when a
    /// threshold is reached.  Returns the number of records buffered.
    ///
    /// On `Err` the record was not accepted: it is neither buffered nor
    /// written, so retrying it cannot duplicate it.
    pub fn append(&mut self, value: &Value) -> Result<u64> {
        self.check_usable()?;
        validate_value(&self.header.schema, value, &self.names, self.validation)?;
        let mark = self.buffer.len();
        if let Err(e) = encode_value(&self.header.schema, value, &self.names, &mut self.buffer) {
            self.buffer.truncate(mark);
            return Err(e);
        }
        self.pending += 1;
        if self.buffer.len() >= self.block_size_bytes || self.pending >= self.block_max_records as u64 {
            if let Err(e) = self.flush_block() {
                self.buffer.truncate(mark);
                self.pending -= 1;
                return Err(e);
            }
        }
        Ok(self.pending)
    }

    pub fn append_specific<T: SpecificRecord>(&mut self, record: &T) -> Result<u64> {
        self.append(&Value::Record(record.to_record()))
    }

    /// Append every value of `values`; returns how many were appended.
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

    fn check_usable(&self) -> Result<()> {
        if self.inner.is_none() {
            return Err(io_error("writer already closed"));
        }
        if self.failed {
            return Err(io_error("an earlier block write failed; the stream may end in a partial block"));
        }
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut W> {
        self.inner.as_mut().ok_or_else(|| io_error("writer already closed"))
    }

    /// Write `bytes` in full or mark the writer failed.
    fn write_framed(&mut self, bytes: &[u8]) -> Result<()> {
        let result = self.stream()?.write_all(bytes);
        if let Err(e) = result {
            self.failed = true;
            return Err(e.into());
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let bytes = self.header.to_bytes();
        self.write_framed(&bytes)?;
        self.header_written = true;
        self.committed += bytes.len() as u64;
        Ok(())
    }

    /// Write buffered records as one block.  On failure the records stay
    /// buffered and `committed_offset` still marks the last good boundary.
    fn flush_block(&mut self) -> Result<()> {
        self.check_usable()?;
        self.write_header()?;
        if self.pending == 0 {
            return Ok(());
        }
        let framed = encode_block(self.pending, &self.buffer, self.codec.as_ref(), self.level, &self.header.sync)?;
        self.write_framed(&framed)?;

        log::debug!(
            "block flushed: {} records, {} -> {} bytes at offset {}",
            self.pending,
            self.buffer.len(),
            framed.len(),
            self.committed,
        );
        self.committed += framed.len() as u64;
        self.records_written += self.pending;
        self.blocks_written += 1;
        self.pending = 0;
        self.buffer.clear();
        Ok(())
    }

    /// Write any partial block and flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_block()?;
        self.stream()?.flush()?;
        Ok(())
    }

    /// Flush everything and hand back the stream.
    pub fn close(mut self) -> Result<W> {
        self.finish()
    }

    /// `close` for owners that cannot give up `self`; the writer is unusable
    /// afterwards.
    pub(crate) fn finish(&mut self) -> Result<W> {
        self.flush()?;
        self.inner.take().ok_or_else(|| io_error("writer already closed"))
    }
}

fn io_error(msg: &str) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, msg.to_owned()))
}

impl<W: Read + Write + Seek> ContainerWriter<W> {
    /// Reopen an existing container for appending.  Schema, codec and sync
    /// marker come from its header; `options.codec` is ignored.
    pub fn append_to(mut inner: W, options: &WriteOptions) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let mut pos = 0;
        let header = Header::read_at(&mut inner, &mut pos)?;
        let codec = options.registry.get(&header.codec)?;
        let end = inner.seek(SeekFrom::End(0))?;
        log::debug!(
            "container writer reopened for append: codec={}, sync={}, end={}",
            header.codec,
            header.sync_hex(),
            end,
        );
        Ok(Self::from_parts(inner, header, true, end, codec, options))
    }
}

impl<W: Write> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_none() {
            return;
        }
        if self.failed {
            if self.pending > 0 {
                log::warn!("container writer dropped after a failed write; {} records lost", self.pending);
            }
            return;
        }
        if let Err(e) = self.flush() {
            log::warn!("container writer dropped with {} unflushed records: {e}", self.pending);
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<R: Read> {
    reader:            R,
    header:            Header,
    reader_schema:     Option<Schema>,
    writer_names:      Names,
    reader_names:      Option<Names>,
    codec:             Arc<dyn Codec>,
    skip_unresolvable: bool,

    pos:               u64,
    block:             Vec<u8>,
    block_offset:      u64,
    block_pos:         usize,
    block_remaining:   u64,
    finished:          bool,
}

impl<R: Read> ContainerReader<R> {
    /// Read with the writer's schema.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, None, ReadOptions::default())
    }

    /// Read with schema resolution into `reader_schema`.  Fails up front if
    /// the schemas can never be compatible.
    pub fn with_schema(reader: R, reader_schema: Schema) -> Result<Self> {
        Self::with_options(reader, Some(reader_schema), ReadOptions::default())
    }

    pub fn with_options(mut reader: R, reader_schema: Option<Schema>, options: ReadOptions) -> Result<Self> {
        let mut pos = 0;
        let header = Header::read_at(&mut reader, &mut pos)?;
        let codec = options.registry.get(&header.codec)?;
        if let Some(rs) = &reader_schema {
            check_compatibility(&header.schema, rs)?;
        }
        Ok(Self {
            reader,
            writer_names: header.schema.names(),
            reader_names: reader_schema.as_ref().map(Schema::names),
            header,
            reader_schema,
            codec,
            skip_unresolvable: options.skip_unresolvable,
            pos,
            block: Vec::new(),
            block_offset: pos,
            block_pos: 0,
            block_remaining: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> &Header { &self.header }
    pub fn writer_schema(&self) -> &Schema { &self.header.schema }

    /// The schema returned values are shaped by.
    pub fn reader_schema(&self) -> &Schema {
        self.reader_schema.as_ref().unwrap_or(&self.header.schema)
    }

    pub fn codec_name(&self) -> &str { &self.header.codec }
    pub fn sync_marker(&self) -> &[u8; SYNC_SIZE] { &self.header.sync }
    pub fn user_metadata(&self) -> &BTreeMap<String, Vec<u8>> { &self.header.metadata }

    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        self.header.metadata.get(key).map(Vec::as_slice)
    }

    /// Stream offset of the next unread block.
    pub fn position(&self) -> u64 { self.pos }

    pub fn into_inner(self) -> R { self.reader }

    /// Load the next non-empty block.  Returns false at a clean end.
    fn load_block(&mut self) -> Result<bool> {
        while self.block_remaining == 0 {
            if self.finished {
                return Ok(false);
            }
            let raw = match read_block(&mut self.reader, &self.header.sync, &mut self.pos) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.finished = true;
                    return Ok(false);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };
            self.block = match decode_block(&raw, self.codec.as_ref()) {
                Ok(data) => data,
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };
            self.block_offset = raw.offset;
            self.block_pos = 0;
            self.block_remaining = raw.count;
            if raw.count == 0 && !self.block.is_empty() {
                self.finished = true;
                return Err(self.corrupt("empty block carries payload bytes"));
            }
        }
        Ok(true)
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::CorruptContainer { offset: self.block_offset, reason: reason.into() }
    }

    pub fn has_next(&mut self) -> Result<bool> {
        self.load_block()
    }

    /// Next record, or `Ok(None)` at the end of the container.
    pub fn next_record(&mut self) -> Result<Option<Value>> {
        loop {
            if !self.load_block()? {
                return Ok(None);
            }

            let (decoded, end) = {
                let writer = &self.header.schema;
                let reader = self.reader_schema.as_ref().unwrap_or(writer);
                let wn = &self.writer_names;
                let rn = self.reader_names.as_ref().unwrap_or(wn);
                let mut cur = SliceReader::new(&self.block);
                cur.set_position(self.block_pos);
                match decode_value(writer, reader, wn, rn, &mut cur) {
                    Ok(v) => (Ok(v), cur.position()),
                    Err(e) if e.is_resolution_error() => {
                        // Realign on the writer's layout before reporting.
                        let mut cur = SliceReader::new(&self.block);
                        cur.set_position(self.block_pos);
                        match skip_value(writer, wn, &mut cur) {
                            Ok(()) => (Err(e), cur.position()),
                            Err(skip) => (Err(skip), self.block_pos),
                        }
                    }
                    Err(e) => (Err(e), self.block_pos),
                }
            };

            if let Err(e) = &decoded {
                if !e.is_resolution_error() {
                    self.finished = true;
                    self.block_remaining = 0;
                    return Err(self.corrupt(format!("undecodable record payload: {e}")));
                }
            }

            self.block_pos = end;
            self.block_remaining -= 1;
            if self.block_remaining == 0 && self.block_pos != self.block.len() {
                self.finished = true;
                return Err(self.corrupt(format!(
                    "{} trailing bytes after the last record",
                    self.block.len() - self.block_pos
                )));
            }

            match decoded {
                Ok(v) => return Ok(Some(v)),
                Err(e) if self.skip_unresolvable => {
                    log::warn!("skipping unresolvable record in block at {}: {e}", self.block_offset);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn next_specific<T: SpecificRecord>(&mut self) -> Result<Option<T>> {
        match self.next_record()? {
            Some(Value::Record(r)) => T::from_record(r).map(Some),
            Some(other) => Err(Error::field("", format!("expected record, found {}", other.kind()))),
            None => Ok(None),
        }
    }
}

impl<R: Read> Iterator for ContainerReader<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
