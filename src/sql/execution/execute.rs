use crate::common::Result;
use crate::config::Settings;
use crate::sql::execution::distinct::Distinct;
use crate::sql::execution::join::{BlockNestedLoopJoin, GraceHashJoin};
use crate::sql::execution::operator::{BoxedOperator, Operator};
use crate::sql::execution::sort::OrderBy;
use crate::sql::execution::source::Values;
use crate::sql::planner::{BoxedNode, Node};
use crate::storage::tuple::Row;

/// Builds the operator tree for a plan node. Nothing is opened yet. Nodes
/// without a buffer budget get `settings.default_buffers`.
pub fn build(node: BoxedNode, settings: &Settings) -> Result<BoxedOperator> {
    let operator: BoxedOperator = match *node.inner {
        Node::BlockNestedLoopJoin {
            left,
            right,
            conditions,
            buffers,
        } => {
            let left = build(left, settings)?;
            let right = build(right, settings)?;
            let buffers = buffers_or_default(buffers, settings);
            Box::new(BlockNestedLoopJoin::new(
                left, right, conditions, buffers, settings,
            )?)
        }
        Node::Distinct { source, buffers } => {
            let buffers = buffers_or_default(buffers, settings);
            Box::new(Distinct::new(build(source, settings)?, buffers, settings)?)
        }
        Node::HashJoin {
            left,
            right,
            conditions,
            buffers,
        } => {
            let left = build(left, settings)?;
            let right = build(right, settings)?;
            let buffers = buffers_or_default(buffers, settings);
            Box::new(GraceHashJoin::new(left, right, conditions, buffers, settings)?)
        }
        Node::Order {
            source,
            keys,
            buffers,
        } => {
            let buffers = buffers_or_default(buffers, settings);
            Box::new(OrderBy::new(build(source, settings)?, keys, buffers, settings)?)
        }
        Node::Values { schema, rows } => Box::new(Values::new(schema, rows, settings)),
    };
    Ok(operator)
}

fn buffers_or_default(buffers: Option<usize>, settings: &Settings) -> usize {
    buffers.unwrap_or_else(|| {
        log::debug!("no buffer budget in plan, using {}", settings.default_buffers);
        settings.default_buffers
    })
}

/// Builds and collects a plan with the process-wide settings.
pub fn run(node: BoxedNode) -> Result<Vec<Row>> {
    let mut root = build(node, Settings::global())?;
    collect(root.as_mut())
}

/// Runs an operator to completion: opens it, drains every page, and closes
/// it. The operator is closed even if opening or draining fails; the first
/// error wins.
pub fn collect(operator: &mut dyn Operator) -> Result<Vec<Row>> {
    let drained = drain(operator);
    let closed = operator.close();
    let rows = drained?;
    closed?;
    Ok(rows)
}

fn drain(operator: &mut dyn Operator) -> Result<Vec<Row>> {
    operator.open()?;
    let mut rows = Vec::new();
    while let Some(page) = operator.next()? {
        log::trace!("collected page of {} rows", page.len());
        rows.extend(page.into_rows());
    }
    Ok(rows)
}
