use crate::sql::planner::{JoinCondition, SortKey};
use crate::storage::tuple::Row;
use crate::types::Table;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// A wrapper object holding a query plan node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxedNode {
    pub(crate) inner: Box<Node>,
}

impl From<Node> for BoxedNode {
    fn from(node: Node) -> Self {
        Self {
            inner: Box::new(node),
        }
    }
}

impl Deref for BoxedNode {
    type Target = Node;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// A query plan node, as handed to the executor by a planner. Every
/// operator node carries the buffer budget (in pages) it was granted, or
/// None to use the executor's default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Joins the left and right sources on the given conditions by
    /// materializing the right source to disk once and scanning it for every
    /// block of `buffers - 2` left pages.
    BlockNestedLoopJoin {
        left: BoxedNode,
        right: BoxedNode,
        conditions: Vec<JoinCondition>,
        buffers: Option<usize>,
    },
    /// Emits each distinct source row once, in ascending order.
    Distinct {
        source: BoxedNode,
        buffers: Option<usize>,
    },
    /// Joins the left and right sources on the given conditions by
    /// partitioning both to disk into `buffers - 1` buckets and building an
    /// in-memory hash table per bucket.
    HashJoin {
        left: BoxedNode,
        right: BoxedNode,
        conditions: Vec<JoinCondition>,
        buffers: Option<usize>,
    },
    /// Sorts the source rows by the given keys with an external merge sort.
    Order {
        source: BoxedNode,
        keys: Vec<SortKey>,
        buffers: Option<usize>,
    },
    /// A constant relation.
    Values { schema: Table, rows: Vec<Row> },
}

impl Node {
    /// Returns the number of columns emitted by the node.
    pub fn columns(&self) -> usize {
        match self {
            // Join nodes emit the combined columns.
            Self::BlockNestedLoopJoin { left, right, .. } | Self::HashJoin { left, right, .. } => {
                left.columns() + right.columns()
            }

            // Simple nodes just pass through the source columns.
            Self::Distinct { source, .. } | Self::Order { source, .. } => source.columns(),

            Self::Values { schema, .. } => schema.col_count(),
        }
    }

    fn format(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Self::BlockNestedLoopJoin {
                left,
                right,
                conditions,
                buffers,
            } => {
                let on = conditions.iter().join(" AND ");
                writeln!(f, "{indent}BlockNestedLoopJoin: {on} ({})", Budget(buffers))?;
                left.format(f, depth + 1)?;
                right.format(f, depth + 1)
            }
            Self::Distinct { source, buffers } => {
                writeln!(f, "{indent}Distinct ({})", Budget(buffers))?;
                source.format(f, depth + 1)
            }
            Self::HashJoin {
                left,
                right,
                conditions,
                buffers,
            } => {
                let on = conditions.iter().join(" AND ");
                writeln!(f, "{indent}HashJoin: {on} ({})", Budget(buffers))?;
                left.format(f, depth + 1)?;
                right.format(f, depth + 1)
            }
            Self::Order {
                source,
                keys,
                buffers,
            } => {
                let keys = keys.iter().join(", ");
                writeln!(f, "{indent}Order: {keys} ({})", Budget(buffers))?;
                source.format(f, depth + 1)
            }
            Self::Values { schema, rows } => {
                writeln!(f, "{indent}Values: {} ({} rows)", schema.name(), rows.len())
            }
        }
    }
}

/// Formats a node's buffer budget.
struct Budget<'a>(&'a Option<usize>);

impl fmt::Display for Budget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(buffers) => write!(f, "buffers={buffers}"),
            None => f.write_str("default buffers"),
        }
    }
}

/// Formats the plan as an indented tree, one node per line.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format(f, 0)
    }
}
