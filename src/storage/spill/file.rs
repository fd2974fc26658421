use crate::common::constants::{SPILL_FRAME_HEADER_BYTES, TRUNCATED_FRAME_MSG};
use crate::common::{Error, Result};
use crate::storage::page::Batch;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// Appends serialized pages to a spill file.
///
/// Each page is one frame: a little-endian `u32` payload length followed by
/// the bincode encoding of the batch. Pages are written in order and there is
/// no index; the file is read back front to back by a [`PageReader`].
#[derive(Debug)]
pub struct PageWriter {
    writer: BufWriter<File>,
    pages: usize,
}

impl PageWriter {
    pub(super) fn new(file: File) -> Self {
        Self {
            writer: BufWriter::new(file),
            pages: 0,
        }
    }

    pub fn write_page(&mut self, batch: &Batch) -> Result<()> {
        let payload = bincode::serialize(batch)
            .map_err(|e| Error::TempFileWrite(format!("unable to encode page: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::TempFileWrite(format!("page of {} bytes", payload.len())))?;

        self.writer
            .write_all(&len.to_le_bytes())
            .and_then(|_| self.writer.write_all(&payload))
            .map_err(|e| Error::TempFileWrite(e.to_string()))?;
        self.pages += 1;
        Ok(())
    }

    /// Number of pages written so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Flushes buffered pages to disk and returns the number of pages written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .map_err(|e| Error::TempFileWrite(e.to_string()))?;
        Ok(self.pages)
    }
}

/// Reads the pages of a spill file back in the order they were written.
#[derive(Debug)]
pub struct PageReader {
    reader: BufReader<File>,
    /// Bytes not yet consumed; bounds the frame lengths we are willing to trust.
    remaining: u64,
}

impl PageReader {
    /// Opens a fresh read stream positioned at the first page of `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::TempFileRead(format!("{}: {e}", path.display())))?;
        Self::new(file)
    }

    fn new(file: File) -> Result<Self> {
        let remaining = file
            .metadata()
            .map_err(|e| Error::TempFileRead(e.to_string()))?
            .len();
        Ok(Self {
            reader: BufReader::new(file),
            remaining,
        })
    }

    /// Returns the next page, or None at a clean end of file.
    pub fn read_page(&mut self) -> Result<Option<Batch>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.remaining < SPILL_FRAME_HEADER_BYTES as u64 {
            return Err(Error::TempFileRead(TRUNCATED_FRAME_MSG.to_string()));
        }

        let mut header = [0u8; SPILL_FRAME_HEADER_BYTES];
        self.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header) as u64;
        if len > self.remaining {
            return Err(Error::TempFileRead(TRUNCATED_FRAME_MSG.to_string()));
        }

        let mut payload = vec![0u8; len as usize];
        self.read_exact(&mut payload)?;
        let batch = bincode::deserialize(&payload)?;
        Ok(Some(batch))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::TempFileRead(TRUNCATED_FRAME_MSG.to_string()),
            _ => Error::TempFileRead(e.to_string()),
        })?;
        self.remaining -= buf.len() as u64;
        Ok(())
    }
}
