//! Operator-owned scratch files.
//!
//! Every temp file an operator creates lives in that operator's
//! [`SpillArena`]. Names only need to be unique, so they come from `tempfile`
//! (kind prefix plus a random suffix) rather than from a shared counter. The
//! arena deletes what it owns on `clear()`, `remove()`, or drop.

mod file;


pub use file::{PageReader, PageWriter};

use crate::common::constants::UNKNOWN_SPILL_ID_MSG;
use crate::common::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Handle to one file in a [`SpillArena`]. Only meaningful to the arena that
/// issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpillId(usize);

#[derive(Debug)]
pub struct SpillArena {
    dir: PathBuf,
    files: Vec<Option<TempPath>>,
}

impl SpillArena {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    /// Creates a new, empty spill file and returns a writer positioned at its
    /// start.
    pub fn create(&mut self, prefix: &str) -> Result<(SpillId, PageWriter)> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".spill")
            .tempfile_in(&self.dir)
            .map_err(|e| {
                Error::TempFileWrite(format!(
                    "unable to create spill file in {}: {e}",
                    self.dir.display()
                ))
            })?;
        let (file, path) = file.into_parts();
        log::trace!("created spill file {}", path.display());

        self.files.push(Some(path));
        Ok((SpillId(self.files.len() - 1), PageWriter::new(file)))
    }

    /// Opens a fresh read stream positioned at the first page of `id`.
    pub fn open_reader(&self, id: SpillId) -> Result<PageReader> {
        PageReader::open(self.path(id)?)
    }

    pub fn path(&self, id: SpillId) -> Result<&Path> {
        match self.files.get(id.0) {
            Some(Some(path)) => Ok(&**path),
            _ => Err(Error::InvalidInput(UNKNOWN_SPILL_ID_MSG.to_string())),
        }
    }

    /// Deletes one spill file.
    pub fn remove(&mut self, id: SpillId) -> Result<()> {
        let path = self
            .files
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| Error::InvalidInput(UNKNOWN_SPILL_ID_MSG.to_string()))?;
        log::trace!("removing spill file {}", path.display());
        path.close()
            .map_err(|e| Error::TempFileWrite(format!("unable to remove spill file: {e}")))
    }

    /// Deletes every file still owned by the arena. A failure on one file does
    /// not stop the others from being attempted; the first failure is returned.
    pub fn clear(&mut self) -> Result<()> {
        let mut first_error = None;
        for path in self.files.drain(..).flatten() {
            let display = path.display().to_string();
            if let Err(e) = path.close() {
                log::warn!("unable to remove spill file {display}: {e}");
                first_error.get_or_insert(Error::TempFileWrite(format!("{display}: {e}")));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of live spill files.
    pub fn len(&self) -> usize {
        self.files.iter().filter(|f| f.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
