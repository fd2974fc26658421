mod batch;


pub use batch::{paginate, Batch};
