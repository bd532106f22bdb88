//! The venue capability the searcher consumes: identity, exact quoting, and
//! calldata for the two kinds of swap a bundle needs.

use std::fmt::Debug;

use alloy::primitives::{Address, Bytes, U256};
use eyre::Result;

/// Calls produced by a forwarding swap: parallel arrays of targets and payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapCalls {
    /// Contracts to call, in execution order
    pub targets: Vec<Address>,
    /// ABI-encoded calldata, one per target
    pub payloads: Vec<Bytes>,
}

impl SwapCalls {
    /// A single call
    #[must_use]
    pub fn single(target: Address, payload: Bytes) -> Self {
        Self {
            targets: vec![target],
            payloads: vec![payload],
        }
    }

    /// Number of legs
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether there are no legs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// An automated market maker venue.
///
/// Implementations are snapshots: quoting is a pure function of the state
/// captured when the snapshot was built, so the same inputs always produce
/// the same output within one block cycle.
pub trait Market: Debug + Send + Sync {
    /// On-chain address of the venue
    fn address(&self) -> Address;

    /// Protocol tag, e.g. `UniswapV2`
    fn protocol(&self) -> &str;

    /// The venue's ordered token pair
    fn tokens(&self) -> [Address; 2];

    /// Exact output for swapping `amount_in` of `token_in` into `token_out`.
    ///
    /// Quoting zero must return zero.
    ///
    /// # Errors
    /// * If the venue does not trade this pair or cannot quote the amount
    fn quote(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256>;

    /// Calls that swap `amount_in` of `token_in` and send the output directly
    /// to `next_market` instead of back to the caller.
    ///
    /// # Errors
    /// * If the swap cannot be quoted
    fn build_forwarding_swap(
        &self,
        token_in: Address,
        amount_in: U256,
        next_market: Address,
    ) -> Result<SwapCalls>;

    /// Calldata for a swap of `amount_in` of `token_in`, sending proceeds to
    /// `recipient`. The call target is the venue itself.
    ///
    /// # Errors
    /// * If the swap cannot be quoted
    fn build_terminal_swap(
        &self,
        token_in: Address,
        amount_in: U256,
        recipient: Address,
    ) -> Result<Bytes>;

    /// Whether the venue trades `token`
    fn has_token(&self, token: Address) -> bool {
        self.tokens().contains(&token)
    }
}
