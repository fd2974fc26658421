//! Out-of-core equality joins.
mod hash;
mod nested_loop;

pub use hash::GraceHashJoin;
pub use nested_loop::BlockNestedLoopJoin;

use crate::common::constants::MIN_JOIN_BUFFERS;
use crate::common::Result;
use crate::errinput;
use crate::sql::execution::budget::PageBudget;
use crate::sql::execution::operator::Operator;
use crate::sql::planner::JoinCondition;
use crate::storage::spill::{PageWriter, SpillArena, SpillId};
use crate::storage::tuple::Row;
use crate::types::Table;

/// Join conditions resolved to (left, right) column positions.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct JoinKeys {
    pairs: Vec<(usize, usize)>,
}

impl JoinKeys {
    pub(crate) fn resolve(conditions: &[JoinCondition], left: &Table, right: &Table) -> Result<Self> {
        if conditions.is_empty() {
            return errinput!("an equality join needs at least one condition");
        }
        let pairs = conditions
            .iter()
            .map(|c| -> Result<(usize, usize)> {
                match (left.index_of(&c.left), right.index_of(&c.right)) {
                    (Some(l), Some(r)) => Ok((l, r)),
                    (None, _) => errinput!("unknown join attribute {} in {}", c.left, left),
                    (_, None) => errinput!("unknown join attribute {} in {}", c.right, right),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pairs })
    }

    /// The condition used to partition and hash on.
    pub(crate) fn first(&self) -> (usize, usize) {
        self.pairs[0]
    }

    /// True if every condition holds for the pair. NULL and NaN never match.
    pub(crate) fn matches(&self, left: &Row, right: &Row) -> Result<bool> {
        for &(l, r) in &self.pairs {
            if !left.get_field(l)?.join_eq(right.get_field(r)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub(crate) fn check_buffers(operator: &str, buffers: usize) -> Result<()> {
    if buffers < MIN_JOIN_BUFFERS {
        return errinput!(
            "{operator} needs at least {MIN_JOIN_BUFFERS} buffers, got {buffers}"
        );
    }
    Ok(())
}

/// Streams the whole output of an opened `input` into one new spill file,
/// holding one page at a time. Returns None, and leaves no file behind, if
/// the input is empty.
pub(crate) fn materialize(
    input: &mut dyn Operator,
    arena: &mut SpillArena,
    budget: &mut PageBudget,
    prefix: &str,
) -> Result<Option<SpillId>> {
    let (id, mut writer) = arena.create(prefix)?;
    budget.reserve(1)?;
    let drained = drain_into(input, &mut writer);
    budget.release(1);
    drained?;
    let pages = writer.finish()?;

    log::debug!("materialized {pages} pages into {prefix}");
    if pages == 0 {
        arena.remove(id)?;
        return Ok(None);
    }
    Ok(Some(id))
}

fn drain_into(input: &mut dyn Operator, writer: &mut PageWriter) -> Result<()> {
    while let Some(page) = input.next()? {
        if !page.is_empty() {
            writer.write_page(&page)?;
        }
    }
    Ok(())
}
