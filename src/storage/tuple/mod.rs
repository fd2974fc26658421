mod row;

#[cfg(test)]
mod tests;

pub use row::Row;
