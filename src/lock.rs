//! In-process writer exclusivity for data files.
//!
//! Every open [`crate::DataFileWriter`] holds a [`WriterLock`] on its path.
//! Paths are keyed by canonical parent directory plus file name, so
//! `./a.rec` and `dir/../a.rec` collide even before the file exists.  The
//! lock is released when the guard drops, on every exit path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::{Error, Result};

fn registry() -> &'static Mutex<HashSet<PathBuf>> {
    static OPEN_WRITERS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OPEN_WRITERS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Registry key for `path`.
pub(crate) fn lock_key(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} does not name a file", path.display()),
        ))
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(parent.canonicalize()?.join(file_name))
}

#[derive(Debug)]
pub struct WriterLock {
    key: PathBuf,
}

impl WriterLock {
    /// Claim `path` for writing, or fail with `WriterBusy`.
    pub fn acquire(path: &Path) -> Result<Self> {
        let key = lock_key(path)?;
        let mut open = registry().lock();
        if !open.insert(key.clone()) {
            return Err(Error::WriterBusy { path: path.to_path_buf() });
        }
        log::debug!("writer lock acquired: {}", key.display());
        Ok(Self { key })
    }

    pub fn path(&self) -> &Path { &self.key }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        registry().lock().remove(&self.key);
        log::debug!("writer lock released: {}", self.key.display());
    }
}

/// Whether some writer in this process currently holds `path`.
pub fn is_locked(path: &Path) -> bool {
    lock_key(path).map_or(false, |k| registry().lock().contains(&k))
}
