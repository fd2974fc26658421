use crate::types::field::Field;
use core::ops::Deref;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    Invalid,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "varchar"),
            DataType::Invalid => write!(f, "invalid"),
        }
    }
}

impl DataType {
    // not for use with strings
    pub fn length_bytes(&self) -> u16 {
        match self {
            DataType::Bool => 1,
            DataType::Int => 4,
            DataType::Float => 4,
            DataType::Text => 0,
            DataType::Invalid => 0,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct Column {
    /// Column name. May be qualified, e.g. `emp.id`.
    name: String,
    /// Column datatype.
    data_type: DataType,
    /// Whether the column allows null values.
    nullable: bool,
    /// The column's default value, if any. Must match the column datatype.
    default: Option<Field>,
    /// 0 for non-text columns, otherwise the declared maximum text length.
    max_str_len: u16,
}

impl Column {
    pub fn new(
        column_name: &str,
        dt: DataType,
        nullable: bool,
        default: Option<Field>,
        max_str_chars: Option<u16>,
    ) -> Column {
        Column {
            name: column_name.to_string(),
            data_type: dt,
            nullable,
            default: match default {
                Some(expr) => Some(expr),
                None if nullable => Some(Field::Null),
                None => None,
            },
            max_str_len: max_str_chars.unwrap_or(0),
        }
    }

    pub fn builder() -> ColumnBuilder {
        ColumnBuilder::new()
    }

    pub fn get_data_type(&self) -> DataType {
        self.data_type
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Field> {
        self.default.as_ref()
    }

    /// Bytes this column takes in a fixed-size tuple.
    pub fn length_bytes(&self) -> usize {
        usize::from(self.data_type.length_bytes()) + usize::from(self.max_str_len)
    }

    pub fn get_max_str_len(&self) -> u16 {
        self.max_str_len
    }

    /// True if `name` refers to this column, either exactly or by the
    /// unqualified part of a `table.column` name.
    pub fn answers_to(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match self.name.rsplit_once('.') {
            Some((_, column)) => column == name,
            None => name
                .rsplit_once('.')
                .map_or(false, |(_, column)| column == self.name),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.data_type)?;
        if self.data_type == DataType::Text {
            write!(f, "({})", self.max_str_len)?;
        }
        Ok(())
    }
}

pub struct ColumnBuilder {
    name: Option<String>,
    data_type: Option<DataType>,
    nullable: Option<bool>,
    default: Option<Field>,
    max_str_len: Option<u16>,
}

impl ColumnBuilder {
    fn new() -> Self {
        Self {
            name: None,
            data_type: None,
            nullable: None,
            default: None,
            max_str_len: None,
        }
    }

    pub fn name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn default(mut self, default: Field) -> Self {
        self.default = Some(default);
        self
    }

    pub fn max_str_len(mut self, max_str_len: u16) -> Self {
        self.max_str_len = Some(max_str_len);
        self
    }

    pub fn build(self) -> Column {
        let nullable = self.nullable.unwrap_or(false);
        Column {
            name: self.name.expect("name must be specified before building."),
            data_type: self
                .data_type
                .expect("data_type must be specified before building."),
            nullable,
            default: match self.default {
                Some(expr) => Some(expr),
                None if nullable => Some(Field::Null),
                None => None,
            },
            max_str_len: self.max_str_len.unwrap_or(0),
        }
    }
}

/// The schema of a relation: a name and an ordered list of columns.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct Table {
    /// The name of the table
    name: String,
    /// The column definitions of the table
    columns: Vec<Column>,
}

impl Table {
    pub fn new(table_name: &str) -> Table {
        Table {
            name: table_name.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_column(&mut self, column: &Column) {
        self.columns.push(column.clone());
    }

    pub fn get_column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn columns(&self) -> &Vec<Column> {
        &self.columns
    }

    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get_column_name(&self, index: usize) -> &str {
        self.columns[index].get_name()
    }

    /// Resolves an attribute name to its position. Exact matches win over
    /// matches on the unqualified part of a name; an unqualified name that
    /// matches several columns is ambiguous and resolves to None.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(i) = self.columns.iter().position(|c| c.get_name() == name) {
            return Some(i);
        }
        let mut candidates = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.answers_to(name))
            .map(|(i, _)| i);
        match (candidates.next(), candidates.next()) {
            (Some(i), None) => Some(i),
            _ => None,
        }
    }

    // max possible size for tuple; wide text columns can exceed u16
    pub fn size(&self) -> usize {
        self.columns.iter().map(|c| c.length_bytes()).sum()
    }

    /// Builds the output schema of a join: the left columns followed by the
    /// right ones.
    pub fn merge(d1: &Table, d2: &Table) -> Table {
        let mut schema = Table::new(&format!("{}_{}", d1.name, d2.name));
        schema.columns.extend(d1.columns.iter().cloned());
        schema.columns.extend(d2.columns.iter().cloned());
        schema
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{column}")?;
        }
        f.write_str(")")
    }
}

impl Deref for Table {
    type Target = Vec<Column>;

    fn deref(&self) -> &Self::Target {
        &self.columns
    }
}

#[derive(Default)]
pub struct TableBuilder {
    name: Option<String>,
    columns: Vec<Column>,
}

impl TableBuilder {
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn column(
        &mut self,
        column_name: &str,
        dt: DataType,
        nullable: bool,
        default: Option<Field>,
        max_str_chars: Option<u16>,
    ) -> &mut Self {
        self.columns.push(Column::new(
            column_name,
            dt,
            nullable,
            default,
            max_str_chars,
        ));
        self
    }

    pub fn columns(&mut self, columns: Vec<Column>) -> &mut Self {
        self.columns.extend(columns);
        self
    }

    pub fn build(&mut self) -> Table {
        let name = self
            .name
            .clone()
            .expect("Cannot build a Table without a `name`.");
        let mut table_definition = Table::new(&name);
        self.columns
            .iter()
            .for_each(|column| table_definition.add_column(column));
        table_definition
    }
}
