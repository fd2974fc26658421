use crate::common::Result;
use crate::errinput;
use crate::sql::planner::{Direction, SortKey};
use crate::storage::tuple::Row;
use crate::types::Table;
use std::cmp::Ordering;

/// Orders tuples by a list of keys resolved to column positions.
///
/// Keys are compared left to right; the first key on which two tuples differ
/// decides, reversed for descending keys. Tuples equal on every key compare
/// equal.
#[derive(Clone, Debug, PartialEq)]
pub struct TupleComparator {
    keys: Vec<(usize, Direction)>,
}

impl TupleComparator {
    /// Resolves `keys` against `schema`.
    pub fn resolve(schema: &Table, keys: &[SortKey]) -> Result<Self> {
        if keys.is_empty() {
            return errinput!("cannot sort without a sort key");
        }
        let keys = keys
            .iter()
            .map(|key| -> Result<(usize, Direction)> {
                match schema.index_of(&key.column) {
                    Some(index) => Ok((index, key.direction)),
                    None => errinput!("unknown sort attribute {} in {}", key.column, schema),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Orders whole tuples of `width` columns, ascending, column by column.
    pub fn whole_row(width: usize) -> Self {
        Self {
            keys: (0..width).map(|i| (i, Direction::Ascending)).collect(),
        }
    }

    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for &(index, direction) in &self.keys {
            let ordering = a.fields().get(index).cmp(&b.fields().get(index));
            let ordering = match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
