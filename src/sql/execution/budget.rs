use crate::common::{Error, Result};

/// Accounts for the pages an operator holds in memory at once.
///
/// Every page an operator keeps resident (an input page, a block page, a
/// partition accumulator, a run head, the output page under construction) is
/// reserved here before it is filled and released once it is dropped. The
/// budget never lets `held` exceed `limit`, and remembers the highest value it
/// reached so tests can check that an operator stayed inside its buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageBudget {
    limit: usize,
    held: usize,
    peak: usize,
}

impl PageBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            held: 0,
            peak: 0,
        }
    }

    /// Reserves `pages` more pages, failing if that would exceed the limit.
    pub fn reserve(&mut self, pages: usize) -> Result<()> {
        let requested = self.held + pages;
        if requested > self.limit {
            return Err(Error::BufferBudgetViolation {
                limit: self.limit,
                requested,
            });
        }
        self.held = requested;
        self.peak = self.peak.max(self.held);
        Ok(())
    }

    /// Returns `pages` pages to the budget.
    pub fn release(&mut self, pages: usize) {
        debug_assert!(pages <= self.held, "releasing pages that were never reserved");
        self.held = self.held.saturating_sub(pages);
    }

    /// Releases everything currently held, e.g. when an operator is closed.
    pub fn release_all(&mut self) {
        self.held = 0;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn held(&self) -> usize {
        self.held
    }

    /// Number of pages still available.
    pub fn available(&self) -> usize {
        self.limit - self.held
    }

    /// The most pages held at any one time since construction.
    pub fn peak(&self) -> usize {
        self.peak
    }
}
