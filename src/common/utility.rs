use crate::storage::tuple::Row;
use crate::types::field::Field;
use crate::types::{Column, DataType, Table};
use rand::{random, Rng};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

pub fn create_random_fields(schema: &Table, rng: &mut ChaCha8Rng, key_range: i32) -> Vec<Field> {
    schema
        .columns()
        .iter()
        .map(|column| match column.get_data_type() {
            DataType::Bool => Field::from(rng.gen_range(0..2) == 1),
            DataType::Int => Field::from(rng.gen_range(0..key_range.max(1))),
            DataType::Float => Field::from(rng.gen_range(0.0f32..100000.0)),
            DataType::Text => {
                let size = column.get_max_str_len().max(1);
                let len = rng.gen_range(0..size);
                // limiting it to printable chars
                let s: String = (0..len)
                    .map(|_| rng.gen_range(33..123) as u8 as char)
                    .collect();
                Field::from(s)
            }
            DataType::Invalid => Field::Null,
        })
        .collect()
}

/// Creates `n` random rows for `schema`. Integer values are drawn from
/// `0..key_range`, so a small range yields many duplicate join keys.
pub fn create_random_rows(schema: &Table, n: usize, key_range: i32, seed: Option<u64>) -> Vec<Row> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(random));
    (0..n)
        .map(|_| Row::from(create_random_fields(schema, &mut rng, key_range)))
        .collect()
}

/// Rows of a single integer column holding the given values.
pub fn int_rows(values: impl IntoIterator<Item = i32>) -> Vec<Row> {
    values
        .into_iter()
        .map(|v| Row::from(vec![Field::from(v)]))
        .collect()
}

pub fn create_table_definition(num_columns: usize, table_name: &str) -> Table {
    let mut table = Table::new(table_name);
    (0..num_columns).for_each(|i| {
        let column_name = format!("{}{}", table_name, i);
        table.add_column(
            &Column::builder()
                .name(column_name)
                .data_type(DataType::Int)
                .build(),
        );
    });
    table
}

/// A `(name.id INT, name.payload TEXT)` schema, the shape most join tests use.
pub fn create_keyed_table_definition(table_name: &str, payload_len: u16) -> Table {
    Table::builder()
        .name(table_name)
        .column(&format!("{table_name}.id"), DataType::Int, true, None, None)
        .column(
            &format!("{table_name}.payload"),
            DataType::Text,
            false,
            None,
            Some(payload_len),
        )
        .build()
}
