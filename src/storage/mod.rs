pub mod page;
pub mod spill;
pub mod tuple;
