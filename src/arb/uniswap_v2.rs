//! Constant-product (Uniswap V2 style) venue with the 0.3% swap fee.
//! Quotes use the pair contract's own integer `getAmountOut` formula, so a
//! quote is exactly what the pair pays out on-chain for the same reserves.

use std::fmt::{self, Display};

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use eyre::{bail, eyre, Result};
use serde::Deserialize;

use super::catalog::Reserves;
use super::market::{Market, SwapCalls};

sol! {
    interface IUniswapV2Pair {
        function swap(uint256 amount0Out, uint256 amount1Out, address to, bytes calldata data) external;
    }
}

/// Protocol tag used when the catalog entry does not name one
pub const UNISWAP_V2: &str = "UniswapV2";

/// Fee numerator (0.3% fee)
const FEE_NUMERATOR: u64 = 997;
/// Fee denominator
const FEE_DENOMINATOR: u64 = 1000;

/// A Uniswap V2 pair, its identity and (optionally) the reserves it had at
/// the last refresh.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct UniswapV2Market {
    /// Pair contract address
    address: Address,
    /// Protocol tag, e.g. `UniswapV2` or `Sushiswap`
    #[serde(default = "default_protocol")]
    protocol: String,
    /// Lower token of the pair
    token0: Address,
    /// Higher token of the pair
    token1: Address,
    /// `(reserve0, reserve1)` at the last refresh
    #[serde(skip)]
    reserves: Option<(U256, U256)>,
}

/// Serde default for the protocol tag
fn default_protocol() -> String {
    UNISWAP_V2.to_string()
}

impl fmt::Debug for UniswapV2Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reserves {
            Some((reserve0, reserve1)) => write!(
                f,
                "{}({}, {reserve0} {} / {reserve1} {})",
                self.protocol, self.address, self.token0, self.token1
            ),
            None => write!(
                f,
                "{}({}, {} / {}, no reserves)",
                self.protocol, self.address, self.token0, self.token1
            ),
        }
    }
}

impl Display for UniswapV2Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.protocol, self.address)
    }
}

impl UniswapV2Market {
    /// Creates a pair without reserves.
    ///
    /// # Errors
    /// * If both tokens are the same
    pub fn new(
        address: Address,
        protocol: impl Into<String>,
        token0: Address,
        token1: Address,
    ) -> Result<Self> {
        if token0 == token1 {
            bail!("Pair {address} token0 and token1 must be different");
        }
        Ok(Self {
            address,
            protocol: protocol.into(),
            token0,
            token1,
            reserves: None,
        })
    }

    /// A copy of this pair holding the given reserves
    #[must_use]
    pub fn with_reserves(&self, reserves: &Reserves) -> Self {
        Self {
            reserves: Some((reserves.reserve0, reserves.reserve1)),
            ..self.clone()
        }
    }

    /// `(reserve0, reserve1)` if the pair has been refreshed
    #[must_use]
    pub const fn reserves(&self) -> Option<(U256, U256)> {
        self.reserves
    }

    /// Reserves ordered as `(reserve_in, reserve_out)` for a swap direction
    fn reserves_for(&self, token_in: Address, token_out: Address) -> Result<(U256, U256)> {
        let (reserve0, reserve1) = self
            .reserves
            .ok_or_else(|| eyre!("Pair {} has no reserves", self.address))?;
        if token_in == self.token0 && token_out == self.token1 {
            Ok((reserve0, reserve1))
        } else if token_in == self.token1 && token_out == self.token0 {
            Ok((reserve1, reserve0))
        } else {
            bail!(
                "Pair {} does not trade {token_in} for {token_out}",
                self.address
            )
        }
    }

    /// Encodes `swap(amount0Out, amount1Out, to, "")` for `amount_in` of `token_in`
    fn swap_calldata(&self, token_in: Address, amount_in: U256, to: Address) -> Result<Bytes> {
        let token_out = if token_in == self.token0 {
            self.token1
        } else {
            self.token0
        };
        let amount_out = self.quote(token_in, token_out, amount_in)?;
        let (amount0_out, amount1_out) = if token_in == self.token0 {
            (U256::ZERO, amount_out)
        } else {
            (amount_out, U256::ZERO)
        };
        let call = IUniswapV2Pair::swapCall {
            amount0Out: amount0_out,
            amount1Out: amount1_out,
            to,
            data: Bytes::new(),
        };
        Ok(call.abi_encode().into())
    }
}

impl Market for UniswapV2Market {
    fn address(&self) -> Address {
        self.address
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn tokens(&self) -> [Address; 2] {
        [self.token0, self.token1]
    }

    fn quote(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256> {
        let (reserve_in, reserve_out) = self.reserves_for(token_in, token_out)?;
        if amount_in.is_zero() {
            return Ok(U256::ZERO);
        }
        if reserve_in.is_zero() || reserve_out.is_zero() {
            bail!("Pair {} has no liquidity", self.address);
        }

        let amount_in_with_fee = amount_in
            .checked_mul(U256::from(FEE_NUMERATOR))
            .ok_or_else(|| eyre!("Amount in overflows: {amount_in}"))?;
        let numerator = amount_in_with_fee
            .checked_mul(reserve_out)
            .ok_or_else(|| eyre!("Quote numerator overflows for {amount_in}"))?;
        let denominator = reserve_in
            .checked_mul(U256::from(FEE_DENOMINATOR))
            .and_then(|scaled| scaled.checked_add(amount_in_with_fee))
            .ok_or_else(|| eyre!("Quote denominator overflows for {amount_in}"))?;

        Ok(numerator / denominator)
    }

    fn build_forwarding_swap(
        &self,
        token_in: Address,
        amount_in: U256,
        next_market: Address,
    ) -> Result<SwapCalls> {
        let payload = self.swap_calldata(token_in, amount_in, next_market)?;
        Ok(SwapCalls::single(self.address, payload))
    }

    fn build_terminal_swap(
        &self,
        token_in: Address,
        amount_in: U256,
        recipient: Address,
    ) -> Result<Bytes> {
        self.swap_calldata(token_in, amount_in, recipient)
    }
}
