use std::fmt::{self, Display};
use std::sync::Arc;

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, I256, U256};
use eyre::Result;

use super::market::Market;

/// A crossed venue pair for one token and the best trade size found for it.
///
/// Built during one block's search and dropped after the submission attempt.
#[derive(Debug)]
pub struct CrossedOpportunity<M> {
    /// The token bought on `buy_market` and sold on `sell_market`
    pub token: Address,
    /// Venue where the base asset buys the token
    pub buy_market: Arc<M>,
    /// Venue where the token is sold back for the base asset
    pub sell_market: Arc<M>,
    /// Base asset sent to `buy_market`
    pub volume: U256,
    /// Base asset received minus `volume`
    pub profit: I256,
}

// Derived Clone would require M: Clone
impl<M> Clone for CrossedOpportunity<M> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            buy_market: Arc::clone(&self.buy_market),
            sell_market: Arc::clone(&self.sell_market),
            volume: self.volume,
            profit: self.profit,
        }
    }
}

impl<M: Market> CrossedOpportunity<M> {
    /// Profit of a round trip of `volume`: buy `token` with the base asset on
    /// `buy_market`, sell it on `sell_market`.
    ///
    /// # Errors
    /// * If either venue cannot quote the leg
    pub fn round_trip_profit(
        base_token: Address,
        token: Address,
        buy_market: &M,
        sell_market: &M,
        volume: U256,
    ) -> Result<I256> {
        let tokens_out = buy_market.quote(base_token, token, volume)?;
        let proceeds = sell_market.quote(token, base_token, tokens_out)?;
        Ok(I256::from_raw(proceeds).saturating_sub(I256::from_raw(volume)))
    }

    /// Tokens that `volume` buys on `buy_market`
    ///
    /// # Errors
    /// * If the buy venue cannot quote
    pub fn tokens_bought(&self, base_token: Address) -> Result<U256> {
        self.buy_market.quote(base_token, self.token, self.volume)
    }

    /// Recomputes the profit from the venues' current quotes
    ///
    /// # Errors
    /// * If either venue cannot quote the leg
    pub fn recompute_profit(&self, base_token: Address) -> Result<I256> {
        Self::round_trip_profit(
            base_token,
            self.token,
            &self.buy_market,
            &self.sell_market,
            self.volume,
        )
    }
}

impl<M: Market> Display for CrossedOpportunity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [buy0, buy1] = self.buy_market.tokens();
        let [sell0, sell1] = self.sell_market.tokens();
        write!(
            f,
            "Profit: {} Volume: {} | {} ({}) {buy0} => {buy1} | {} ({}) {sell0} => {sell1}",
            format_ether(self.profit),
            format_ether(I256::from_raw(self.volume)),
            self.buy_market.protocol(),
            self.buy_market.address(),
            self.sell_market.protocol(),
            self.sell_market.address(),
        )
    }
}

/// Formats an 18-decimals amount with four decimal places, truncating
#[must_use]
pub fn format_ether(amount: I256) -> String {
    let formatted = format_units(amount, 18).unwrap_or_else(|_| amount.to_string());
    match formatted.split_once('.') {
        Some((whole, fraction)) => format!("{whole}.{}", &fraction[..fraction.len().min(4)]),
        None => formatted,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::utils::constants::ETHER;

    #[test]
    fn test_format_ether() {
        for (amount, expected) in [
            (I256::from_raw(ETHER), "1.0000"),
            (I256::from_raw(ETHER / U256::from(100)), "0.0100"),
            (I256::from_raw(ETHER * U256::from(12) + ETHER / U256::from(8)), "12.1250"),
            (-I256::from_raw(ETHER / U256::from(2)), "-0.5000"),
            (I256::ZERO, "0.0000"),
        ] {
            assert_eq!(format_ether(amount), expected);
        }
    }
}
