//! Out-of-core query operators and the machinery they share.
mod budget;
mod distinct;
mod execute;
mod join;
mod operator;
mod partition;
mod sort;
mod source;

pub use budget::PageBudget;
pub use distinct::Distinct;
pub use execute::{build, collect, run};
pub use join::{BlockNestedLoopJoin, GraceHashJoin};
pub use operator::{BoxedOperator, Operator};
pub use partition::{DiskPartitioner, KeyHasher, PartitionHasher, ProbeHasher};
pub use sort::{OrderBy, TupleComparator};
pub use source::{SpillScan, Values};
