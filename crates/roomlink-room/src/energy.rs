//! Energy collaborator boundary.
//!
//! Creating, joining, and starting may cost the player a game resource.
//! The balance arithmetic lives in the embedding app; the room layer only
//! asks whether a cost is affordable before sending a request and
//! consumes it once the server accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// The energy/resource collaborator.
pub trait EnergyLedger: Send + Sync + 'static {
    fn can_afford(&self, cost: u32) -> bool;

    /// Deduct `cost`. Returns `false` (and deducts nothing) when the
    /// balance is too low.
    fn consume(&self, cost: u32) -> bool;
}

/// A ledger that never runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedEnergy;

impl EnergyLedger for UnlimitedEnergy {
    fn can_afford(&self, _cost: u32) -> bool {
        true
    }

    fn consume(&self, _cost: u32) -> bool {
        true
    }
}

/// A simple counted balance. Clones share it.
#[derive(Debug, Clone, Default)]
pub struct EnergyPool {
    balance: Arc<AtomicU32>,
}

impl EnergyPool {
    pub fn new(balance: u32) -> Self {
        Self {
            balance: Arc::new(AtomicU32::new(balance)),
        }
    }

    pub fn balance(&self) -> u32 {
        self.balance.load(Ordering::SeqCst)
    }

    pub fn refill(&self, amount: u32) {
        self.balance.fetch_add(amount, Ordering::SeqCst);
    }
}

impl EnergyLedger for EnergyPool {
    fn can_afford(&self, cost: u32) -> bool {
        self.balance() >= cost
    }

    fn consume(&self, cost: u32) -> bool {
        self.balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(cost))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_pool_consume_stops_at_zero() {
        let pool = EnergyPool::new(2);
        assert!(pool.consume(1));
        assert!(pool.consume(1));
        assert!(!pool.can_afford(1));
        assert!(!pool.consume(1));
        assert_eq!(pool.balance(), 0);
    }

    #[test]
    fn test_unlimited_energy_always_affords() {
        assert!(UnlimitedEnergy.can_afford(u32::MAX));
        assert!(UnlimitedEnergy.consume(u32::MAX));
    }
}
