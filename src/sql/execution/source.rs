use crate::common::Result;
use crate::config::Settings;
use crate::errdata;
use crate::sql::execution::operator::{not_open, Operator};
use crate::storage::page::Batch;
use crate::storage::spill::PageReader;
use crate::storage::tuple::Row;
use crate::types::Table;
use std::path::PathBuf;

/// Emits a constant, in-memory relation one page at a time.
pub struct Values {
    schema: Table,
    rows: Vec<Row>,
    capacity: usize,
    /// Index of the next row to emit; None while closed.
    position: Option<usize>,
}

impl Values {
    pub fn new(schema: Table, rows: Vec<Row>, settings: &Settings) -> Self {
        let capacity = Batch::capacity_for(&schema, settings.page_size_bytes);
        Self {
            schema,
            rows,
            capacity,
            position: None,
        }
    }
}

impl Operator for Values {
    fn schema(&self) -> &Table {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        let width = self.schema.col_count();
        if let Some(row) = self.rows.iter().find(|row| row.size() != width) {
            return errdata!("row ({row}) does not match schema {}", self.schema);
        }
        self.position = Some(0);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        let Some(position) = self.position.as_mut() else {
            return not_open();
        };
        if *position >= self.rows.len() {
            return Ok(None);
        }
        let end = (*position + self.capacity).min(self.rows.len());
        let mut batch = Batch::new(self.capacity);
        for row in &self.rows[*position..end] {
            batch.push(row.clone())?;
        }
        *position = end;
        Ok(Some(batch))
    }

    fn close(&mut self) -> Result<()> {
        self.position = None;
        Ok(())
    }
}

/// Streams the pages of a spill file, front to back. The file itself is owned
/// by whoever wrote it; the scan only reads it.
pub struct SpillScan {
    schema: Table,
    path: PathBuf,
    reader: Option<PageReader>,
    open: bool,
}

impl SpillScan {
    pub fn new(schema: Table, path: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            path: path.into(),
            reader: None,
            open: false,
        }
    }
}

impl Operator for SpillScan {
    fn schema(&self) -> &Table {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        self.reader = Some(PageReader::open(&self.path)?);
        self.open = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        if !self.open {
            return not_open();
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        while let Some(page) = reader.read_page()? {
            if !page.is_empty() {
                return Ok(Some(page));
            }
        }
        self.reader = None;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.open = false;
        Ok(())
    }
}
