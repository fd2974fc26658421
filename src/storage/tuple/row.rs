use crate::common::{Error, Result};
use crate::types::field::Field;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::slice::Iter;

/// A tuple: an immutable, ordered sequence of field values whose length and
/// order follow the producing operator's schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Field>,
}

impl From<Vec<Field>> for Row {
    fn from(v: Vec<Field>) -> Self {
        Row { values: v }
    }
}

impl From<Vec<&Field>> for Row {
    fn from(value: Vec<&Field>) -> Self {
        Row {
            values: value.into_iter().cloned().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.values.iter().join(", "))
    }
}

impl Row {
    pub fn iter(&self) -> Iter<Field> {
        self.values.iter()
    }

    pub fn fields(&self) -> &[Field] {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn get_field(&self, index: usize) -> Result<&Field> {
        self.values.get(index).ok_or(Error::OutOfBounds)
    }

    /// Concatenates this row with `other`, forming a wider output row.
    pub fn join(&self, other: &Row) -> Row {
        Row {
            values: self.values.iter().chain(other.values.iter()).cloned().collect(),
        }
    }
}
