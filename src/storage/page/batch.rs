use crate::common::{Error, Result};
use crate::storage::tuple::Row;
use crate::types::Table;
use serde::{Deserialize, Serialize};
use std::slice::Iter;

/// A page of tuples: the unit of I/O and of one `next()` result.
///
/// The capacity is fixed when the batch is created and is derived from the
/// page size and the producing schema's tuple size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    capacity: usize,
    rows: Vec<Row>,
}

impl Batch {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Number of tuples of `schema` that fit in one page of `page_size_bytes`.
    /// Always at least one, so that oversized tuples still make progress.
    pub fn capacity_for(schema: &Table, page_size_bytes: usize) -> usize {
        let tuple_size = schema.size().max(1);
        (page_size_bytes / tuple_size).max(1)
    }

    /// Appends a row. Pushing onto a full batch is an error.
    pub fn push(&mut self, row: Row) -> Result<()> {
        if self.is_full() {
            return Err(Error::OutOfBounds);
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn iter(&self) -> Iter<Row> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for Batch {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Re-pages a sequence of rows into full batches of `capacity`, leaving only
/// the last batch partially filled.
pub fn paginate(rows: impl IntoIterator<Item = Row>, capacity: usize) -> Vec<Batch> {
    let mut pages = Vec::new();
    let mut current = Batch::new(capacity);
    for row in rows {
        if current.is_full() {
            pages.push(std::mem::replace(&mut current, Batch::new(capacity)));
        }
        current.rows.push(row);
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}
