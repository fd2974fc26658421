//! Plan trees handed to the executor. Building and optimizing them is the
//! caller's job; this module only describes their shape.
mod node;
mod plan;

pub use node::{BoxedNode, Node};
pub use plan::{Direction, JoinCondition, SortKey};
