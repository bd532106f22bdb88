use std::sync::Arc;

use alloy::primitives::{Address, U256};
use eyre::Result;

use super::catalog::{MarketsByToken, ReserveSource, Reserves};
use super::uniswap_v2::{UniswapV2Market, UNISWAP_V2};

/// One ether in wei, for building reserves
#[allow(dead_code)]
pub const ETHER_U128: u128 = 1_000_000_000_000_000_000;

/// A deterministic address from a short label
#[allow(dead_code)]
pub fn address_from_str(label: &str) -> Address {
    Address::left_padding_from(label.as_bytes())
}

/// A pair without reserves
#[allow(dead_code)]
pub fn v2_pair(id: &str, token0: &str, token1: &str) -> UniswapV2Market {
    UniswapV2Market::new(
        address_from_str(id),
        UNISWAP_V2,
        address_from_str(token0),
        address_from_str(token1),
    )
    .unwrap()
}

/// A pair holding `(reserve0, reserve1)`
#[allow(dead_code)]
pub fn v2_market(id: &str, token0: &str, token1: &str, reserve0: u128, reserve1: u128) -> UniswapV2Market {
    v2_pair(id, token0, token1).with_reserves(&reserves(reserve0, reserve1))
}

#[allow(dead_code)]
pub fn reserves(reserve0: u128, reserve1: u128) -> Reserves {
    Reserves {
        reserve0: U256::from(reserve0),
        reserve1: U256::from(reserve1),
        block_timestamp_last: U256::ZERO,
    }
}

/// A snapshot from `(token, venues)` groups
#[allow(dead_code)]
pub fn markets_by_token(groups: &[(&str, Vec<UniswapV2Market>)]) -> MarketsByToken<UniswapV2Market> {
    groups
        .iter()
        .map(|(token, markets)| {
            (
                address_from_str(token),
                markets.iter().cloned().map(Arc::new).collect(),
            )
        })
        .collect()
}

/// Reserve source returning a fixed list regardless of the pairs asked for
#[derive(Debug, Clone)]
pub struct StaticReserves {
    reserves: Vec<Reserves>,
}

impl StaticReserves {
    #[allow(dead_code)]
    pub fn new(reserves: &[(u128, u128)]) -> Self {
        Self {
            reserves: reserves.iter().map(|(r0, r1)| self::reserves(*r0, *r1)).collect(),
        }
    }
}

impl ReserveSource for StaticReserves {
    async fn fetch_reserves(&self, _pairs: &[Address]) -> Result<Vec<Reserves>> {
        Ok(self.reserves.clone())
    }
}
