//! Turns a crossed opportunity into one executor call.
//!
//! The buy venue's swap forwards its output straight to the sell venue, and
//! the sell venue pays the base asset back to the executor, so the whole
//! round trip is a single atomic multi-call.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use eyre::{bail, Result};
use log::debug;

use super::fees::TxFees;
use crate::arb::market::Market;
use crate::arb::opportunity::CrossedOpportunity;

sol! {
    interface IBundleExecutor {
        function uniswapWeth(uint256 _wethAmountToFirstMarket, address[] memory _targets, bytes[] memory _payloads) external payable;
    }
}

/// An unsigned EIP-1559 call to the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbTransaction {
    /// Chain id the transaction is valid on
    pub chain_id: u64,
    /// The executor contract
    pub to: Address,
    /// Always zero; the executor funds the first leg itself
    pub value: U256,
    /// `uniswapWeth` calldata
    pub data: Bytes,
    /// Fee fields
    pub fees: TxFees,
}

/// Builds executor calls for crossed opportunities.
#[derive(Debug, Clone, Copy)]
pub struct BundleBuilder {
    /// Executor contract address
    executor: Address,
    /// Chain id stamped on every transaction
    chain_id: u64,
}

impl BundleBuilder {
    /// Builds calls to `executor` on `chain_id`
    #[must_use]
    pub const fn new(executor: Address, chain_id: u64) -> Self {
        Self { executor, chain_id }
    }

    /// Executor contract address
    #[must_use]
    pub const fn executor(&self) -> Address {
        self.executor
    }

    /// Ordered `(targets, payloads)` legs of the round trip.
    ///
    /// # Errors
    /// * If either venue cannot build its swap
    /// * If the forwarding legs have mismatched targets and payloads
    pub fn legs<M: Market>(
        &self,
        base_token: Address,
        opportunity: &CrossedOpportunity<M>,
    ) -> Result<(Vec<Address>, Vec<Bytes>)> {
        let buy_calls = opportunity.buy_market.build_forwarding_swap(
            base_token,
            opportunity.volume,
            opportunity.sell_market.address(),
        )?;
        let tokens_in = opportunity.tokens_bought(base_token)?;
        let terminal = opportunity.sell_market.build_terminal_swap(
            opportunity.token,
            tokens_in,
            self.executor,
        )?;

        let mut targets = buy_calls.targets;
        let mut payloads = buy_calls.payloads;
        if targets.len() != payloads.len() {
            bail!(
                "Forwarding swap on {} has {} targets but {} payloads",
                opportunity.buy_market.address(),
                targets.len(),
                payloads.len()
            );
        }
        targets.push(opportunity.sell_market.address());
        payloads.push(terminal);

        Ok((targets, payloads))
    }

    /// The executor transaction for `opportunity`.
    ///
    /// # Errors
    /// * If the legs cannot be built
    pub fn build<M: Market>(
        &self,
        base_token: Address,
        opportunity: &CrossedOpportunity<M>,
        fees: TxFees,
    ) -> Result<ArbTransaction> {
        let (targets, payloads) = self.legs(base_token, opportunity)?;
        debug!(
            "bundle: {} legs, volume {}, targets {targets:?}",
            targets.len(),
            opportunity.volume
        );

        let call = IBundleExecutor::uniswapWethCall {
            _wethAmountToFirstMarket: opportunity.volume,
            _targets: targets,
            _payloads: payloads,
        };

        Ok(ArbTransaction {
            chain_id: self.chain_id,
            to: self.executor,
            value: U256::ZERO,
            data: call.abi_encode().into(),
            fees,
        })
    }
}
