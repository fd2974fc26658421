//! Out-of-core relational operators: block nested-loop and grace hash
//! equality joins and an external merge sort, each holding a fixed number of
//! pages in memory and returning at most one page per call.
#![crate_type = "lib"]

pub mod common;
pub mod config;
pub mod sql;
pub mod storage;
pub mod types;
