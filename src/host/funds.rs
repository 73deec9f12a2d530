//! The funds accumulator.
//!
//! `FundsLock`/`FundsUnlock` adjust a per-asset signed scalar rather than a
//! plain integer because the final value is committed as an elliptic-curve
//! point: the commitment `Σ sₐ · Hₐ` feeds the enclosing transaction's
//! balance proof. A lock/unlock round trip for the same asset and amount
//! cancels exactly, leaving the neutral point.

use crate::crypto::secp::{self, PubKey};
use crate::types::ids::{Amount, AssetId};
use k256::{ProjectivePoint, Scalar};
use std::collections::BTreeMap;

/// Per-asset signed scalars accumulated over one invocation.
#[derive(Default)]
pub struct FundsAccumulator {
    map: BTreeMap<AssetId, Scalar>,
}

impl FundsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records locked funds: adds to the asset's scalar.
    pub fn lock(&mut self, aid: AssetId, amount: Amount) {
        self.apply(aid, amount, false);
    }

    /// Records unlocked funds: subtracts from the asset's scalar.
    pub fn unlock(&mut self, aid: AssetId, amount: Amount) {
        self.apply(aid, amount, true);
    }

    fn apply(&mut self, aid: AssetId, amount: Amount, negate: bool) {
        let mut delta = Scalar::from(amount);
        if negate {
            delta = -delta;
        }
        let entry = self.map.entry(aid).or_insert(Scalar::ZERO);
        *entry += delta;
        if *entry == Scalar::ZERO {
            self.map.remove(&aid);
        }
    }

    /// Materializes the accumulator into its commitment point.
    pub fn commitment(&self) -> FundsCommitment {
        let mut point = ProjectivePoint::IDENTITY;
        for (&aid, scalar) in &self.map {
            point += secp::asset_generator(aid) * scalar;
        }
        FundsCommitment { point }
    }
}

/// The committed funds balance of one invocation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FundsCommitment {
    point: ProjectivePoint,
}

impl FundsCommitment {
    /// True when the accumulated funds cancel out completely.
    pub fn is_neutral(&self) -> bool {
        self.point == ProjectivePoint::IDENTITY
    }

    /// Serialized form for the enclosing transaction.
    pub fn to_pubkey(&self) -> PubKey {
        secp::pubkey_from_point(&self.point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_is_neutral() {
        assert!(FundsAccumulator::new().commitment().is_neutral());
    }

    #[test]
    fn lock_unlock_round_trip_is_neutral() {
        let mut funds = FundsAccumulator::new();
        funds.lock(0, 1_000_000);
        funds.unlock(0, 1_000_000);
        assert!(funds.commitment().is_neutral());
    }

    #[test]
    fn unlock_before_lock_also_cancels() {
        let mut funds = FundsAccumulator::new();
        funds.unlock(7, 500);
        funds.lock(7, 500);
        assert!(funds.commitment().is_neutral());
    }

    #[test]
    fn net_lock_is_not_neutral() {
        let mut funds = FundsAccumulator::new();
        funds.lock(0, 10);
        assert!(!funds.commitment().is_neutral());
    }

    #[test]
    fn split_locks_equal_one_big_lock() {
        let mut a = FundsAccumulator::new();
        a.lock(3, 100);
        a.lock(3, 50);
        let mut b = FundsAccumulator::new();
        b.lock(3, 150);
        assert_eq!(a.commitment(), b.commitment());
    }

    #[test]
    fn different_assets_use_different_generators() {
        let mut a = FundsAccumulator::new();
        a.lock(1, 100);
        let mut b = FundsAccumulator::new();
        b.lock(2, 100);
        assert_ne!(a.commitment(), b.commitment());
    }

    #[test]
    fn cross_asset_amounts_do_not_cancel() {
        let mut funds = FundsAccumulator::new();
        funds.lock(1, 100);
        funds.unlock(2, 100);
        assert!(!funds.commitment().is_neutral());
    }
}
