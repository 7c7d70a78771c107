//! Gas counter for a single run.
//!
//! Instrumented programs report each metered block's summed cost before
//! the block starts. The meter admits the block only when the whole cost
//! fits in what is left of the budget.

use crate::error::HostError;

/// Budget and running total of one run.
///
/// A refused charge leaves the meter as it was, so the consumed figure
/// reported after out-of-gas counts only blocks that actually ran.
#[derive(Debug, Clone)]
pub struct HostGasMeter {
    limit: u64,
    consumed: u64,
}

impl HostGasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }

    /// Admit a block costing `block_cost`, or refuse it with out-of-gas.
    pub fn charge(&mut self, block_cost: u64) -> Result<(), HostError> {
        match self.consumed.checked_add(block_cost) {
            Some(total) if total <= self.limit => {
                self.consumed = total;
                Ok(())
            }
            _ => Err(HostError::out_of_gas()),
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Gas still available to later blocks.
    pub fn remaining(&self) -> u64 {
        self.limit - self.consumed
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}
