use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Capacity bookkeeping for one execution context.
///
/// `granted` is everything requested minus everything released, `used` is
/// the sum of all file lengths. Unused capacity is `granted - used` and
/// never goes below zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityLedger {
    granted: u64,
    used: u64,
    limit: Option<u64>,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    /// Capacity currently held by the context
    pub granted: u64,
    /// Capacity backing file lengths
    pub used: u64,
    /// Capacity available for growth or release
    pub remaining: u64,
    /// Most capacity the context may hold at once
    pub limit: Option<u64>,
}

impl CapacityLedger {
    /// Create an empty ledger
    pub fn new(limit: Option<u64>) -> Self {
        CapacityLedger {
            granted: 0,
            used: 0,
            limit,
        }
    }

    /// Unused capacity in bytes
    pub fn remaining(&self) -> u64 {
        self.granted - self.used
    }

    pub fn granted(&self) -> u64 {
        self.granted
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Grant up to `amount` more bytes, capped by the limit if one is set.
    /// Returns the number of bytes actually granted.
    pub fn grant(&mut self, amount: u64) -> Result<u64> {
        let amount = match self.limit {
            Some(limit) => amount.min(limit.saturating_sub(self.granted)),
            None => amount,
        };
        self.granted = self
            .granted
            .checked_add(amount)
            .ok_or_else(|| StoreError::invalid_argument("capacity overflow"))?;
        Ok(amount)
    }

    /// Give back unused capacity
    pub fn release(&mut self, amount: u64) -> Result<()> {
        let remaining = self.remaining();
        if amount > remaining {
            return Err(StoreError::OverRelease {
                requested: amount,
                remaining,
            });
        }
        self.granted -= amount;
        Ok(())
    }

    /// Check that `bytes` of growth could be backed, without charging it
    pub fn check(&self, bytes: u64) -> Result<()> {
        let remaining = self.remaining();
        if bytes > remaining {
            return Err(StoreError::InsufficientCapacity {
                requested: bytes,
                remaining,
            });
        }
        Ok(())
    }

    /// Back `bytes` of file growth with unused capacity
    pub fn consume(&mut self, bytes: u64) -> Result<()> {
        self.check(bytes)?;
        self.used += bytes;
        Ok(())
    }

    /// Return capacity freed by shrinking or deleting a file
    pub fn reclaim(&mut self, bytes: u64) {
        debug_assert!(bytes <= self.used, "reclaiming more than is used");
        self.used = self.used.saturating_sub(bytes);
    }

    /// Apply a length change from `old_len` to `new_len`
    pub fn adjust(&mut self, old_len: u64, new_len: u64) -> Result<()> {
        if new_len > old_len {
            self.consume(new_len - old_len)
        } else {
            self.reclaim(old_len - new_len);
            Ok(())
        }
    }

    pub fn snapshot(&self) -> CapacitySnapshot {
        CapacitySnapshot {
            granted: self.granted,
            used: self.used,
            remaining: self.remaining(),
            limit: self.limit,
        }
    }
}
