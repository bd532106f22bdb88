//! Fee fields for a bundle transaction that must stay valid until its
//! target block.

use crate::utils::constants::GWEI;

/// Base fee growth numerator per block (+12.5%)
const BASE_FEE_GROWTH_NUMERATOR: u128 = 1125;
/// Base fee growth denominator
const BASE_FEE_GROWTH_DENOMINATOR: u128 = 1000;

/// Default gas limit for an executor call
pub const DEFAULT_GAS_LIMIT: u64 = 6_000_000;

/// Highest base fee the chain can reach `blocks_ahead` blocks after a block
/// with `base_fee`: the base fee rises by at most 12.5% per block.
///
/// Each step computes `fee * 1125 / 1000 + 1` with integer truncation, so
/// the bound is never below the exact maximum.
#[must_use]
pub fn max_base_fee_in_future_block(base_fee: u128, blocks_ahead: u64) -> u128 {
    (0..blocks_ahead).fold(base_fee, |fee, _| {
        fee.saturating_mul(BASE_FEE_GROWTH_NUMERATOR) / BASE_FEE_GROWTH_DENOMINATOR + 1
    })
}

/// Fixed fee settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    /// Tip per gas paid to the block builder
    pub priority_fee: u128,
    /// Gas limit of every bundle transaction
    pub gas_limit: u64,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            priority_fee: GWEI,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// EIP-1559 fee fields of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFees {
    /// `max_base_fee + priority_fee`
    pub max_fee_per_gas: u128,
    /// Tip per gas
    pub max_priority_fee_per_gas: u128,
    /// Gas limit
    pub gas_limit: u64,
}

/// Derives transaction fees from the latest block's base fee.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeEstimator {
    params: FeeParams,
}

impl FeeEstimator {
    /// Estimates with `params`
    #[must_use]
    pub const fn new(params: FeeParams) -> Self {
        Self { params }
    }

    /// Fee settings
    #[must_use]
    pub const fn params(&self) -> FeeParams {
        self.params
    }

    /// Fees valid for a block `blocks_ahead` after the block with
    /// `base_fee`. A block without a base fee counts as zero.
    #[must_use]
    pub fn estimate(&self, base_fee: Option<u128>, blocks_ahead: u64) -> TxFees {
        let max_base_fee = max_base_fee_in_future_block(base_fee.unwrap_or_default(), blocks_ahead);
        TxFees {
            max_fee_per_gas: max_base_fee.saturating_add(self.params.priority_fee),
            max_priority_fee_per_gas: self.params.priority_fee,
            gas_limit: self.params.gas_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_base_fee_in_future_block() {
        for (base_fee, blocks_ahead, expected) in [
            (100, 1, 113),
            (100, 2, 128),
            (100, 0, 100),
            (0, 1, 1),
            (1_000_000_000, 1, 1_125_000_001),
        ] {
            assert_eq!(max_base_fee_in_future_block(base_fee, blocks_ahead), expected);
        }
    }

    #[test]
    fn test_max_base_fee_saturates() {
        assert_eq!(
            max_base_fee_in_future_block(u128::MAX, 1),
            u128::MAX / 1000 + 1
        );
    }

    #[test]
    fn test_estimate() {
        let estimator = FeeEstimator::new(FeeParams {
            priority_fee: 7,
            gas_limit: 21_000,
        });

        let fees = estimator.estimate(Some(100), 1);
        assert_eq!(fees.max_fee_per_gas, 120);
        assert_eq!(fees.max_priority_fee_per_gas, 7);
        assert_eq!(fees.gas_limit, 21_000);

        // Missing base fee
        assert_eq!(estimator.estimate(None, 1).max_fee_per_gas, 8);
    }

    #[test]
    fn test_default_params() {
        let params = FeeEstimator::default().params();
        assert_eq!(params.priority_fee, 1_000_000_000);
        assert_eq!(params.gas_limit, 6_000_000);
    }
}
